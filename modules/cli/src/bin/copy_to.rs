//! `bake-copy-to`: reads a local file and lands its bytes in a freshly
//! created region on a target, exercising the same `create_write_persist`
//! path a real client drives over the wire (§6), using the loopback
//! transport in place of the external RDMA fabric (§1).

use anyhow::Result;
use bake_common::config::ProviderConfig;
use bake_common::messages::{CreateWritePersistRequest, Message};
use bake_module_cli::{init_tracing, parse_backend_path, PathBackend};
use bake_module_provider::{dispatch, BakeProvider, InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
use bake_module_transport::LoopbackTransport;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "copy-to")]
struct Args {
    /// Local file whose bytes become the new region's contents.
    local_file: String,

    /// `[pmem:|file:]<path>` of the target to write into (attached/created
    /// if it doesn't already exist).
    target_path: String,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();
    match run(args).await {
        Ok(rid) => {
            println!("{rid}");
            std::process::exit(0);
        }
        Err(e) => {
            error!("copy-to failed: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<String> {
    let data = std::fs::read(&args.local_file)?;
    let (backend, path) = parse_backend_path(&args.target_path);

    let transport = Arc::new(LoopbackTransport::new());
    let directory = Arc::new(ProviderDirectory::new());
    let provider = BakeProvider::new(
        1,
        "local".to_string(),
        ProviderConfig::default(),
        transport.clone(),
        Arc::new(LocalFileSetShipper),
        Arc::new(InProcessMigrationClient::new(directory)),
    )?;

    let target_id = match backend {
        PathBackend::Pmem => provider.attach_mem_target(path).await?,
        PathBackend::File => provider.attach_file_target(path).await?,
    };

    let bulk_handle = transport.register(data.clone()).await;
    let request = Message::CreateWritePersist(CreateWritePersistRequest {
        target_id,
        region_size: data.len() as u64,
        region_offset: 0,
        bulk_handle,
        bulk_offset: 0,
        bulk_size: data.len() as u64,
        remote_addr: None,
    });

    let response = dispatch(&provider, request).await;
    let Message::CreateWritePersistResponse(response) = response else {
        anyhow::bail!("dispatch returned an unexpected response variant");
    };
    let rid = response
        .rid
        .ok_or_else(|| anyhow::anyhow!("create_write_persist failed with ret={}", response.ret))?;
    info!(%target_id, bytes = data.len(), "copied file into new region");
    Ok(rid.to_string())
}
