//! `main` for the BAKE provider daemon process.
//!
//! Grounded on `processes/omnibus/src/main.rs`: same `clap` argument, same
//! `Config::builder().add_source(File::with_name(...)).add_source(Environment::with_prefix(...))`
//! construction, same `tracing_subscriber::Registry` + `EnvFilter` + events-only
//! filter. OpenTelemetry export is dropped (Acropolis-specific, not a BAKE
//! requirement; §B of the expanded spec) and there is no jemalloc override —
//! a single long-running provider process has none of the omnibus's
//! allocator pressure.

use anyhow::Result;
use bake_common::messages::Message;
use bake_module_provider::BakeProviderModule;
use caryatid_process::Process;
use config::{Config, Environment, File};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, fmt, EnvFilter, Registry};

#[derive(Debug, clap::Parser)]
#[command(name = "bake_provider_daemon")]
struct Args {
    #[arg(long, value_name = "PATH", default_value_t = option_env!("BAKE_DAEMON_DEFAULT_CONFIG").unwrap_or("bake.toml").to_string())]
    config: String,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let args = <self::Args as clap::Parser>::parse();

    let fmt_layer = fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .with_filter(filter::filter_fn(|meta| meta.is_event()));
    Registry::default().with(fmt_layer).init();

    info!("BAKE provider daemon");

    let config = Arc::new(
        Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(Environment::with_prefix("BAKE"))
            .build()?,
    );

    let mut process = Process::<Message>::create(config.clone()).await;
    BakeProviderModule::register(&mut process);
    process.run().await?;

    info!("Exiting");
    Ok(())
}
