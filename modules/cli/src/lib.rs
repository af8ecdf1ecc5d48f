//! Shared plumbing for the `bake-mkpool`/`bake-copy-to`/`bake-latency-bench`
//! binaries: logging setup in the same style as `tx_submitter/cli/src/main.rs`
//! (`EnvFilter` + an events-only layer) and a local, in-process
//! [`BakeProvider`] builder. None of these tools talk to a real transport
//! (§1 lists the RPC/RDMA framework as an external collaborator); they
//! operate directly against a provider in the same
//! process, exactly as the loopback transport already stands in for it in
//! tests.

use anyhow::{bail, Result};
use bake_common::config::ProviderConfig;
use bake_module_provider::{BakeProvider, InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
use bake_module_transport::LoopbackTransport;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, fmt, EnvFilter, Registry};

/// Installs the same `RUST_LOG`-driven, events-only logging layer every
/// other BAKE binary uses.
pub fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .with_filter(filter::filter_fn(|meta| meta.is_event()));
    let _ = Registry::default().with(fmt_layer).try_init();
}

/// Builds a standalone provider with default configuration and in-process
/// migration/transport stand-ins — enough for a CLI tool driving one
/// provider directly.
pub fn local_provider() -> Result<Arc<BakeProvider>> {
    let directory = Arc::new(ProviderDirectory::new());
    Ok(BakeProvider::new(
        1,
        "local".to_string(),
        ProviderConfig::default(),
        Arc::new(LoopbackTransport::new()),
        Arc::new(LocalFileSetShipper),
        Arc::new(InProcessMigrationClient::new(directory)),
    )?)
}

/// Which backend a `pmem:`/`file:`-prefixed CLI path names, per the `mkpool`
/// surface in spec.md §6 ("`path` may be prefixed `pmem:` or `file:`...
/// default `pmem:`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathBackend {
    Pmem,
    File,
}

/// Splits a `[pmem:|file:]<path>` CLI argument into its backend selector and
/// bare filesystem path.
pub fn parse_backend_path(arg: &str) -> (PathBackend, &str) {
    if let Some(rest) = arg.strip_prefix("pmem:") {
        (PathBackend::Pmem, rest)
    } else if let Some(rest) = arg.strip_prefix("file:") {
        (PathBackend::File, rest)
    } else {
        (PathBackend::Pmem, arg)
    }
}

/// Parses a `mkpool`-style size argument: a decimal number followed by an
/// optional `K`/`M`/`G`/`T`/`P` suffix (powers of 1024), e.g. `64M`.
pub fn parse_size(arg: &str) -> Result<u64> {
    let arg = arg.trim();
    let (digits, suffix) = match arg.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&arg[..arg.len() - 1], Some(c.to_ascii_uppercase())),
        _ => (arg, None),
    };
    let base: u64 = digits.parse().map_err(|_| anyhow::anyhow!("invalid size {arg:?}"))?;
    let multiplier = match suffix {
        None => 1u64,
        Some('K') => 1024,
        Some('M') => 1024 * 1024,
        Some('G') => 1024 * 1024 * 1024,
        Some('T') => 1024u64.pow(4),
        Some('P') => 1024u64.pow(5),
        Some(c) => bail!("unknown size suffix {c:?}"),
    };
    Ok(base * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_sizes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("64M").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("2g").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn splits_backend_prefix() {
        assert_eq!(parse_backend_path("file:/tmp/t0"), (PathBackend::File, "/tmp/t0"));
        assert_eq!(parse_backend_path("pmem:/tmp/t1"), (PathBackend::Pmem, "/tmp/t1"));
        assert_eq!(parse_backend_path("/tmp/t2"), (PathBackend::Pmem, "/tmp/t2"));
    }
}
