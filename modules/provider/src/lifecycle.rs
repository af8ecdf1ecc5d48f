//! Configuration loading and lifecycle driving (L10, §4.7).
//!
//! Grounded on the `Config::builder().add_source(File::with_name(...))
//! .add_source(Environment::with_prefix(...))` construction used by the
//! daemon process, with a `BAKE_` environment prefix.

use crate::provider::BakeProvider;
use bake_common::config::ProviderConfig;
use config::{Config, Environment, File};

/// Loads and merges the provider configuration tree from `path` (if given)
/// and `BAKE_*` environment variables, filling every default spec.md §4.7
/// names for keys the tree omits.
pub fn load_config(path: Option<&str>) -> anyhow::Result<ProviderConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    let raw = builder.add_source(Environment::with_prefix("BAKE")).build()?;
    ProviderConfig::from_config(&raw)
}

/// Auto-attaches (and, for missing paths, auto-creates) every target
/// listed in `file_backend.targets`/`pmem_backend.targets` (§4.7). Run once
/// at provider startup, after `BakeProvider::new`.
pub async fn attach_configured_targets(provider: &BakeProvider) -> anyhow::Result<()> {
    let (file_targets, mem_targets) = {
        let config = provider.config.read().await;
        (config.file_backend.targets.clone(), config.pmem_backend.targets.clone())
    };
    for path in file_targets {
        let target_id = provider.attach_file_target(&path).await?;
        tracing::info!(path, %target_id, "attached file-backend target");
    }
    for path in mem_targets {
        let target_id = provider.attach_mem_target(&path).await?;
        tracing::info!(path, %target_id, "attached memory-backend target");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{InProcessMigrationClient, LocalFileSetShipper, ProviderDirectory};
    use bake_module_transport::LoopbackTransport;
    use std::sync::Arc;

    #[tokio::test]
    async fn auto_creates_targets_listed_in_config() {
        let dir = tempfile::tempdir().unwrap();
        let target_path = dir.path().join("t0");

        let mut cfg = ProviderConfig::default();
        cfg.file_backend.targets = vec![target_path.to_str().unwrap().to_string()];

        let directory = Arc::new(ProviderDirectory::new());
        let provider = BakeProvider::new(
            1,
            "self".to_string(),
            cfg,
            Arc::new(LoopbackTransport::new()),
            Arc::new(LocalFileSetShipper),
            Arc::new(InProcessMigrationClient::new(directory)),
        )
        .unwrap();

        attach_configured_targets(&provider).await.unwrap();
        assert_eq!(provider.registry.len().await, 1);
        assert!(target_path.join("bake-file-root").exists());
    }
}
