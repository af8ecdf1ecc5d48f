//! The `Backend` trait (§4.4/§4.5, §9 "Polymorphism across backends").
//!
//! Replaces the original's tagged `bake_backend` struct of function
//! pointers with a trait object, `Arc<dyn Backend>`. Optional methods
//! (`create_write_persist_*`) return `Option` and default to `None`; the
//! dispatch layer in `bake_module_provider` falls back to the three-call
//! composition when a backend doesn't specialize them, exactly as
//! `g_bake_file_backend._create_write_persist_raw = NULL` falls back in the
//! original.

use async_trait::async_trait;
use bake_common::error::BakeResult;
use bake_common::ids::RegionId;
use bake_module_transport::BulkTransport;
use std::sync::Arc;

/// One target's attached backend context. Implemented by the file backend
/// (L6) and the memory backend (L7); held behind `Arc<dyn Backend>` in the
/// target registry (L8) so the provider dispatch layer (L9) need not know
/// which backend a target uses.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `create(size) -> rid` (§4.4/§4.5).
    async fn create(&self, size: u64) -> BakeResult<RegionId>;

    /// Eager-mode write: copies `data` into the region at `offset` (§4.4).
    async fn write_raw(&self, rid: RegionId, offset: u64, data: &[u8]) -> BakeResult<()>;

    /// Bulk-mode write: pulls `size` bytes from the remote bulk endpoint
    /// into the region at `region_offset` (§4.3/§4.4).
    #[allow(clippy::too_many_arguments)]
    async fn write_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        transport: Arc<dyn BulkTransport>,
        remote_addr: &str,
        remote_bulk: &str,
        remote_bulk_offset: u64,
    ) -> BakeResult<()>;

    /// Eager-mode read: returns up to `size` bytes starting at `offset`.
    async fn read_raw(&self, rid: RegionId, offset: u64, size: u64) -> BakeResult<Vec<u8>>;

    /// Bulk-mode read: pushes `size` bytes from the region at
    /// `region_offset` to the remote bulk endpoint. Returns the number of
    /// bytes actually transferred.
    #[allow(clippy::too_many_arguments)]
    async fn read_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        transport: Arc<dyn BulkTransport>,
        remote_addr: &str,
        remote_bulk: &str,
        remote_bulk_offset: u64,
    ) -> BakeResult<u64>;

    /// Durability barrier (§4.4/§4.5, §5 "eventual durability up to its
    /// return").
    async fn persist(&self, rid: RegionId, offset: u64, size: u64) -> BakeResult<()>;

    /// Specialized `create` + eager `write` + `persist` in one call.
    /// `None` tells the dispatch layer to fall back to the three-call
    /// composition.
    async fn create_write_persist_raw(
        &self,
        _size: u64,
        _data: &[u8],
    ) -> Option<BakeResult<RegionId>> {
        None
    }

    /// Specialized `create` + bulk `write` + `persist` in one call.
    #[allow(clippy::too_many_arguments)]
    async fn create_write_persist_bulk(
        &self,
        _size: u64,
        _transport: Arc<dyn BulkTransport>,
        _remote_addr: &str,
        _remote_bulk: &str,
        _remote_bulk_offset: u64,
        _bulk_size: u64,
    ) -> Option<BakeResult<RegionId>> {
        None
    }

    /// Returns the region's logical size, or `OP_UNSUPPORTED` if the
    /// backend has no way to recover it (§4.5: file regions carry their
    /// size in the region id already; memory regions only if a
    /// size-carrying header was compiled in).
    async fn get_region_size(&self, rid: RegionId) -> BakeResult<u64>;

    /// Server-local-only: a raw pointer to the region's bytes, valid only
    /// within this process (§6 `get_data`). `OP_UNSUPPORTED` for backends
    /// that keep data behind file descriptors rather than mapped memory.
    async fn get_region_data(&self, rid: RegionId) -> BakeResult<u64>;

    /// Deallocates the region's extent (hole-punch for the file backend,
    /// object free for the memory backend). Idempotent re-use of `rid`
    /// after this call must fail with `UNKNOWN_REGION`/bounds/IO errors,
    /// never silently succeed.
    async fn remove(&self, rid: RegionId) -> BakeResult<()>;

    /// Releases the backend's resources (file descriptors, mappings).
    /// Called once per target on provider deregistration (§4.6 "Provider
    /// lifecycle").
    async fn finalize(&self) -> BakeResult<()>;

    /// Enumerates the files backing this target, for `migrate_target`
    /// (§4.4, L11). `None` for backends with no file-set to ship (the
    /// memory backend keeps everything in one pool file and migrates
    /// through the migration client instead).
    async fn create_fileset(&self) -> Option<BakeResult<Vec<std::path::PathBuf>>> {
        None
    }

    /// Reports whether `rid` was minted by this target, so the registry can
    /// resolve a bare region id to its owning target (§5, §C.8 of the
    /// expanded spec). The default just probes `get_region_size`; backends
    /// whose decode step is cheaper than a full size lookup can override
    /// this.
    async fn owns_region(&self, rid: RegionId) -> bool {
        self.get_region_size(rid).await.is_ok()
    }
}
