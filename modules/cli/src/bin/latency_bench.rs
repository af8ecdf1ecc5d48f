//! `bake-latency-bench`: the latency microbenchmark named in spec.md §1/§6.
//! Repeatedly issues `noop` (§6: "No-op simply acknowledges and is used for
//! latency measurement") or a full create/write/persist/read/remove cycle
//! against a freshly attached target, reporting mean per-call latency.

use anyhow::Result;
use bake_common::config::ProviderConfig;
use bake_common::messages::{CreateRequest, EagerReadRequest, EagerWriteRequest, Message, NoopRequest, PersistRequest, RemoveRequest};
use bake_module_cli::{init_tracing, local_provider, parse_backend_path, parse_size, PathBackend};
use bake_module_provider::{dispatch, BakeProvider};
use clap::{Parser, ValueEnum};
use std::time::Instant;
use tracing::error;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Op {
    Noop,
    Roundtrip,
}

#[derive(Debug, Parser)]
#[command(name = "latency-bench")]
struct Args {
    /// `[pmem:|file:]<path>` of the target to benchmark against.
    path: String,

    /// Which operation to time.
    #[arg(long, value_enum, default_value_t = Op::Noop)]
    op: Op,

    /// Number of calls to time.
    #[arg(long, default_value_t = 1000)]
    iterations: u32,

    /// Region size for `--op roundtrip` (e.g. `4K`).
    #[arg(long, default_value = "4096")]
    size: String,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();
    match run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("latency-bench failed: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let (backend, path) = parse_backend_path(&args.path);
    let provider = local_provider()?;
    let target_id = match backend {
        PathBackend::Pmem => provider.attach_mem_target(path).await?,
        PathBackend::File => provider.attach_file_target(path).await?,
    };

    let size = parse_size(&args.size)?;
    let start = Instant::now();
    for _ in 0..args.iterations {
        match args.op {
            Op::Noop => {
                dispatch(&provider, Message::Noop(NoopRequest)).await;
            }
            Op::Roundtrip => roundtrip_once(&provider, target_id, size).await?,
        }
    }
    let elapsed = start.elapsed();
    let per_call = elapsed / args.iterations.max(1);
    println!(
        "{} iterations of {:?} against {}: {:.3?} total, {:.3?} mean",
        args.iterations, args.op, args.path, elapsed, per_call
    );
    Ok(())
}

async fn roundtrip_once(provider: &BakeProvider, target_id: bake_common::ids::TargetId, size: u64) -> Result<()> {
    let created = dispatch(provider, Message::Create(CreateRequest { target_id, region_size: size })).await;
    let Message::CreateResponse(created) = created else {
        anyhow::bail!("unexpected response to create");
    };
    let rid = created.rid.ok_or_else(|| anyhow::anyhow!("create failed with ret={}", created.ret))?;

    let buffer = vec![0x5A; size as usize];
    dispatch(
        provider,
        Message::EagerWrite(EagerWriteRequest { rid, region_offset: 0, size: size as u32, buffer }),
    )
    .await;
    dispatch(provider, Message::Persist(PersistRequest { rid, offset: 0, size })).await;
    dispatch(provider, Message::EagerRead(EagerReadRequest { rid, region_offset: 0, size: size as u32 })).await;
    dispatch(provider, Message::Remove(RemoveRequest { rid })).await;
    Ok(())
}
