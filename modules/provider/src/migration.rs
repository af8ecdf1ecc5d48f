//! Migration hooks (L11, §4.4 `migrate_region`/`migrate_target`).
//!
//! The destination provider (for region migration) and the REMI file-set
//! shipping service (for target migration) are both external collaborators
//! per spec.md §1. They are expressed here as traits with the required
//! error behavior, plus in-process default implementations sufficient for
//! the single-process scenarios in spec.md §8 (§C.7).

use async_trait::async_trait;
use bake_common::error::{BakeError, BakeResult};
use bake_common::ids::{RegionId, TargetId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stands in for a remote `bake` provider: `migrate_region` is implemented
/// as a client-style `create_write_persist` against the destination,
/// followed by an optional source `remove` (§4.4).
#[async_trait]
pub trait MigrationClient: Send + Sync {
    async fn create_write_persist(
        &self,
        dest_addr: &str,
        dest_provider_id: u16,
        dest_target_id: TargetId,
        data: Vec<u8>,
    ) -> BakeResult<RegionId>;
}

/// Stands in for the external REMI file-set shipping service:
/// `migrate_target` enumerates a file backend's files and hands them to
/// this trait (§4.4).
#[async_trait]
pub trait FileSetShipper: Send + Sync {
    async fn ship(
        &self,
        files: &[PathBuf],
        dest_remi_addr: &str,
        dest_remi_provider_id: u16,
        dest_root: &str,
    ) -> BakeResult<()>;
}

/// An in-process directory of providers, keyed by `(addr, provider_id)`,
/// used by [`InProcessMigrationClient`] to route `migrate_region` calls
/// without a real transport. Test and CLI code registers each provider it
/// creates here under the address/id it wants other providers to reach it
/// by.
#[derive(Default)]
pub struct ProviderDirectory {
    providers: RwLock<HashMap<(String, u16), Arc<dyn DirectoryTarget>>>,
}

/// The subset of provider behavior `migrate_region` needs from a
/// destination: create a region and write+persist data into it in one call.
#[async_trait]
pub trait DirectoryTarget: Send + Sync {
    async fn create_write_persist_raw(&self, target_id: TargetId, data: Vec<u8>) -> BakeResult<RegionId>;
}

impl ProviderDirectory {
    pub fn new() -> Self {
        ProviderDirectory::default()
    }

    pub async fn register(&self, addr: &str, provider_id: u16, target: Arc<dyn DirectoryTarget>) {
        self.providers.write().await.insert((addr.to_string(), provider_id), target);
    }
}

/// [`MigrationClient`] routed through an in-process [`ProviderDirectory`]
/// (§C.7: "an in-process default implementation sufficient for the
/// single-process tests").
pub struct InProcessMigrationClient {
    directory: Arc<ProviderDirectory>,
}

impl InProcessMigrationClient {
    pub fn new(directory: Arc<ProviderDirectory>) -> Self {
        InProcessMigrationClient { directory }
    }
}

#[async_trait]
impl MigrationClient for InProcessMigrationClient {
    async fn create_write_persist(
        &self,
        dest_addr: &str,
        dest_provider_id: u16,
        dest_target_id: TargetId,
        data: Vec<u8>,
    ) -> BakeResult<RegionId> {
        let target = self
            .directory
            .providers
            .read()
            .await
            .get(&(dest_addr.to_string(), dest_provider_id))
            .cloned()
            .ok_or_else(|| BakeError::Remi(format!("no provider registered at {dest_addr}:{dest_provider_id}")))?;
        target.create_write_persist_raw(dest_target_id, data).await
    }
}

/// [`FileSetShipper`] that copies files into a local destination directory
/// — adequate for the single-process migration scenarios; a real
/// deployment wires in the REMI client instead.
pub struct LocalFileSetShipper;

#[async_trait]
impl FileSetShipper for LocalFileSetShipper {
    async fn ship(
        &self,
        files: &[PathBuf],
        _dest_remi_addr: &str,
        _dest_remi_provider_id: u16,
        dest_root: &str,
    ) -> BakeResult<()> {
        let dest_root = Path::new(dest_root);
        std::fs::create_dir_all(dest_root)
            .map_err(|e| BakeError::Remi(format!("mkdir {}: {e}", dest_root.display())))?;
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            std::fs::copy(file, dest_root.join(name))
                .map_err(|e| BakeError::Remi(format!("copy {}: {e}", file.display())))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_fileset_shipper_copies_files() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let f = src_dir.path().join("log.0");
        std::fs::write(&f, b"hello").unwrap();

        let shipper = LocalFileSetShipper;
        shipper.ship(&[f], "localhost", 1, dst_dir.path().to_str().unwrap()).await.unwrap();
        let copied = std::fs::read(dst_dir.path().join("log.0")).unwrap();
        assert_eq!(copied, b"hello");
    }

    #[tokio::test]
    async fn migration_client_fails_for_unregistered_destination() {
        let directory = Arc::new(ProviderDirectory::new());
        let client = InProcessMigrationClient::new(directory);
        let err = client
            .create_write_persist("nohost", 99, TargetId::new(), vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, BakeError::Remi(_)));
    }
}
