//! `BulkTransport`: the contract the transfer engine (L5) needs from the
//! external RPC/RDMA framework (spec.md §1 "deliberately out of scope").
//! Every real deployment wires in a margo/mercury-equivalent; this crate
//! only ships [`LoopbackTransport`], an in-process stand-in used by the CLI
//! tools and the integration tests, where "remote" bulk handles are just
//! shared buffers registered by the caller.

use async_trait::async_trait;
use bake_common::error::{BakeError, BakeResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A bulk transfer endpoint: a remote buffer the transfer engine can pull
/// from (write path) or push into (read path), addressed by an opaque
/// `bulk_handle` string plus an address string identifying the host (§6).
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// RDMA-pull `local.len()` bytes from `remote_bulk` at `remote_offset`
    /// on `remote_addr` into `local`.
    async fn pull(
        &self,
        remote_addr: &str,
        remote_bulk: &str,
        remote_offset: u64,
        local: &mut [u8],
    ) -> BakeResult<()>;

    /// RDMA-push `local` into `remote_bulk` at `remote_offset` on
    /// `remote_addr`.
    async fn push(
        &self,
        remote_addr: &str,
        remote_bulk: &str,
        remote_offset: u64,
        local: &[u8],
    ) -> BakeResult<()>;
}

/// An in-process bulk transport: "remote" regions are plain `Vec<u8>`
/// buffers registered under a generated handle. `remote_addr` is ignored
/// (there is only one process). Used by the CLI tools and by the
/// integration tests in place of a real RDMA fabric.
#[derive(Default)]
pub struct LoopbackTransport {
    regions: Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>,
    next_id: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        LoopbackTransport {
            regions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a buffer as a bulk transfer endpoint and returns its
    /// handle. Callers doing a pull (write) pre-fill the buffer with the
    /// bytes to send; callers doing a push (read) pass a zeroed buffer of
    /// the expected size and inspect it with [`Self::contents`] afterwards.
    pub async fn register(&self, data: Vec<u8>) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = format!("loopback-{id}");
        self.regions.lock().await.insert(handle.clone(), Arc::new(Mutex::new(data)));
        handle
    }

    pub async fn contents(&self, handle: &str) -> BakeResult<Vec<u8>> {
        let region = self.region(handle).await?;
        Ok(region.lock().await.clone())
    }

    async fn region(&self, handle: &str) -> BakeResult<Arc<Mutex<Vec<u8>>>> {
        self.regions
            .lock()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| BakeError::Mercury(format!("unknown bulk handle {handle:?}")))
    }
}

#[async_trait]
impl BulkTransport for LoopbackTransport {
    async fn pull(
        &self,
        _remote_addr: &str,
        remote_bulk: &str,
        remote_offset: u64,
        local: &mut [u8],
    ) -> BakeResult<()> {
        let region = self.region(remote_bulk).await?;
        let guard = region.lock().await;
        let start = remote_offset as usize;
        let end = start + local.len();
        if end > guard.len() {
            return Err(BakeError::OutOfBounds);
        }
        local.copy_from_slice(&guard[start..end]);
        Ok(())
    }

    async fn push(
        &self,
        _remote_addr: &str,
        remote_bulk: &str,
        remote_offset: u64,
        local: &[u8],
    ) -> BakeResult<()> {
        let region = self.region(remote_bulk).await?;
        let mut guard = region.lock().await;
        let start = remote_offset as usize;
        let end = start + local.len();
        if end > guard.len() {
            guard.resize(end, 0);
        }
        guard[start..end].copy_from_slice(local);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pull_reads_registered_bytes() {
        let t = LoopbackTransport::new();
        let handle = t.register(vec![0xAA; 16]).await;
        let mut local = vec![0u8; 8];
        t.pull("anyaddr", &handle, 4, &mut local).await.unwrap();
        assert_eq!(local, vec![0xAA; 8]);
    }

    #[tokio::test]
    async fn push_writes_into_registered_buffer() {
        let t = LoopbackTransport::new();
        let handle = t.register(vec![0u8; 16]).await;
        t.push("anyaddr", &handle, 0, &[0xBBu8; 4]).await.unwrap();
        let contents = t.contents(&handle).await.unwrap();
        assert_eq!(&contents[0..4], &[0xBBu8; 4]);
    }

    #[tokio::test]
    async fn unknown_handle_is_an_error() {
        let t = LoopbackTransport::new();
        let mut local = vec![0u8; 4];
        assert!(t.pull("a", "nope", 0, &mut local).await.is_err());
    }
}
