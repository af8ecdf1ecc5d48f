//! `BakeProvider`: the top-level, explicit handle that replaces the
//! source's process-wide global (§D "Global mutable state" redesign flag).
//! Owns the registry, the shared staging poolset, the live configuration
//! tree and the migration collaborators; every dispatch call borrows it
//! rather than reaching into ambient state.

use crate::migration::{FileSetShipper, MigrationClient};
use crate::registry::{AttachedTarget, BackendKind, Registry};
use bake_common::config::ProviderConfig;
use bake_common::error::{BakeError, BakeResult};
use bake_common::ids::TargetId;
use bake_module_file_backend::FileBackend;
use bake_module_mem_backend::MemBackend;
use bake_module_target_engine::StagingPoolset;
use bake_module_transport::BulkTransport;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct BakeProvider {
    pub provider_id: u16,
    pub self_addr: String,
    pub registry: Registry,
    pub poolset: Arc<StagingPoolset>,
    pub transport: Arc<dyn BulkTransport>,
    pub fileset_shipper: Arc<dyn FileSetShipper>,
    pub migration_client: Arc<dyn MigrationClient>,
    pub config: RwLock<ProviderConfig>,
}

impl BakeProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider_id: u16,
        self_addr: String,
        config: ProviderConfig,
        transport: Arc<dyn BulkTransport>,
        fileset_shipper: Arc<dyn FileSetShipper>,
        migration_client: Arc<dyn MigrationClient>,
    ) -> BakeResult<Arc<Self>> {
        config.validate()?;
        let poolset = Arc::new(StagingPoolset::new(
            config.pipeline.npools,
            config.pipeline.nbuffers_per_pool,
            config.pipeline.first_buffer_size,
            config.pipeline.multiplier,
            config.file_backend.alignment,
        )?);
        Ok(Arc::new(BakeProvider {
            provider_id,
            self_addr,
            registry: Registry::new(),
            poolset,
            transport,
            fileset_shipper,
            migration_client,
            config: RwLock::new(config),
        }))
    }

    /// Attaches (creating on-disk state if absent) a file-backend target at
    /// `path` and adds it to the registry (§4.6 "registered + N targets
    /// attached").
    pub async fn attach_file_target(&self, path: &str) -> BakeResult<TargetId> {
        let config = self.config.read().await;
        if !config.pipeline.enable {
            return Err(BakeError::InvalidArg(
                "the file backend requires pipelining (pipeline.enable)".into(),
            ));
        }
        let cfg = config.file_backend.clone();
        drop(config);
        cfg.validate()?;
        let backend = FileBackend::attach_or_create(std::path::Path::new(path), &cfg, self.poolset.clone()).await?;
        if !backend.directio_active && cfg.directio {
            tracing::warn!(path, "directio downgraded to buffered I/O for this target");
            self.config.write().await.file_backend.directio = false;
        }
        let target_id = backend.target_id().await;
        self.registry
            .attach(AttachedTarget {
                target_id,
                backend: Arc::new(backend),
                kind: BackendKind::File,
            })
            .await;
        self.note_attached_path(path, BackendKind::File).await;
        Ok(target_id)
    }

    /// Attaches (creating if absent, sized to `default_initial_target_size`
    /// when created) a memory-backend target at `path`.
    pub async fn attach_mem_target(&self, path: &str) -> BakeResult<TargetId> {
        let size = self.config.read().await.pmem_backend.default_initial_target_size;
        let target_id = TargetId::new();
        let backend = MemBackend::attach_or_create(std::path::Path::new(path), &target_id, size)?;
        self.registry
            .attach(AttachedTarget {
                target_id,
                backend: Arc::new(backend),
                kind: BackendKind::Mem,
            })
            .await;
        self.note_attached_path(path, BackendKind::Mem).await;
        Ok(target_id)
    }

    async fn note_attached_path(&self, path: &str, kind: BackendKind) {
        let mut config = self.config.write().await;
        let list = match kind {
            BackendKind::File => &mut config.file_backend.targets,
            BackendKind::Mem => &mut config.pmem_backend.targets,
        };
        if !list.iter().any(|p| p == path) {
            list.push(path.to_string());
        }
    }

    pub async fn detach_target(&self, target_id: &TargetId) -> BakeResult<()> {
        let Some(target) = self.registry.detach(target_id).await else {
            return Err(BakeError::UnknownTarget);
        };
        target.backend.finalize().await
    }

    /// Deregisters the provider: detaches and finalizes every target (§4.6
    /// "Provider lifecycle", deregister is idempotent w.r.t. already
    /// detached targets).
    pub async fn finalize(&self) -> BakeResult<()> {
        for target in self.registry.drain().await {
            target.backend.finalize().await?;
        }
        Ok(())
    }
}
