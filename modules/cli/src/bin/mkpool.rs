//! `bake-mkpool`: creates (or reattaches) a single target at a path,
//! matching the wire-level CLI surface in spec.md §6:
//! `mkpool [-s SIZE[K|M|G|T|P]] <path>`, where `path` may be prefixed
//! `pmem:` or `file:` to pick the backend (default `pmem:`). Exits 0 on
//! success, non-zero on any backend error.

use anyhow::Result;
use bake_common::config::ProviderConfig;
use bake_module_cli::{init_tracing, parse_backend_path, parse_size, PathBackend};
use bake_module_provider::{BakeProvider, InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
use bake_module_transport::LoopbackTransport;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_POOL_SIZE: &str = "64M";

#[derive(Debug, Parser)]
#[command(name = "mkpool")]
struct Args {
    /// Pool/target size, e.g. `64M`, `2G`. Only meaningful for `pmem:` targets.
    #[arg(short = 's', long = "size", default_value = DEFAULT_POOL_SIZE)]
    size: String,

    /// `[pmem:|file:]<path>`, default backend `pmem:`.
    path: String,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();
    match run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("mkpool failed: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let size = parse_size(&args.size)?;
    let (backend, path) = parse_backend_path(&args.path);

    let directory = Arc::new(ProviderDirectory::new());
    let mut config = ProviderConfig::default();

    let target_id = match backend {
        PathBackend::Pmem => {
            config.pmem_backend.default_initial_target_size = size;
            let provider = BakeProvider::new(
                1,
                "local".to_string(),
                config,
                Arc::new(LoopbackTransport::new()),
                Arc::new(LocalFileSetShipper),
                Arc::new(InProcessMigrationClient::new(directory)),
            )?;
            provider.attach_mem_target(path).await?
        }
        PathBackend::File => {
            tracing::warn!("-s/--size is ignored for file: targets; log files grow on demand");
            let provider = BakeProvider::new(
                1,
                "local".to_string(),
                config,
                Arc::new(LoopbackTransport::new()),
                Arc::new(LocalFileSetShipper),
                Arc::new(InProcessMigrationClient::new(directory)),
            )?;
            provider.attach_file_target(path).await?
        }
    };

    info!(%target_id, path, "pool created");
    println!("{target_id}");
    Ok(())
}
