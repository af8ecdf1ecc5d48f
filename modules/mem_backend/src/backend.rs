//! The memory backend (L7, §4.5): the same operation contract as the file
//! backend, implemented over a single memory-mapped pool file instead of a
//! log-structured set of direct-I/O files. No staging poolset or transfer
//! engine is used — bulk transfers move through one buffer and one RDMA
//! call (§4.5 "The backend has no pipelining engine").

use crate::pool::MemPool;
use async_trait::async_trait;
use bake_common::error::{BakeError, BakeResult};
use bake_common::ids::{MemRegionPayload, RegionId, RegionPayload, TargetId};
use bake_module_target_engine::Backend;
use bake_module_transport::BulkTransport;
use std::path::Path;
use std::sync::Arc;

pub struct MemBackend {
    pool: MemPool,
    pool_uuid_lo: u64,
    target_id: TargetId,
}

fn target_uuid_lo(target_id: &TargetId) -> u64 {
    let bytes = target_id.as_uuid().as_bytes();
    u64::from_le_bytes(bytes[8..16].try_into().unwrap())
}

impl MemBackend {
    pub fn attach_or_create(path: &Path, target_id: &TargetId, initial_size: u64) -> BakeResult<Self> {
        let pool = MemPool::attach_or_create(path, initial_size)?;
        Ok(MemBackend {
            pool,
            pool_uuid_lo: target_uuid_lo(target_id),
            target_id: *target_id,
        })
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    fn decode(&self, rid: RegionId) -> BakeResult<MemRegionPayload> {
        match rid.payload()? {
            RegionPayload::Mem(p) => {
                if p.pool_uuid_lo != self.pool_uuid_lo {
                    return Err(BakeError::UnknownRegion);
                }
                Ok(p)
            }
            RegionPayload::File(_) => Err(BakeError::BackendType),
        }
    }
}

#[async_trait]
impl Backend for MemBackend {
    async fn create(&self, size: u64) -> BakeResult<RegionId> {
        let offset = self.pool.object_alloc(size).await?;
        Ok(RegionId::from_mem_payload(MemRegionPayload {
            pool_uuid_lo: self.pool_uuid_lo,
            offset,
        }))
    }

    async fn write_raw(&self, rid: RegionId, offset: u64, data: &[u8]) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        self.pool.write(payload.offset, offset, data).await
    }

    async fn write_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        transport: Arc<dyn BulkTransport>,
        remote_addr: &str,
        remote_bulk: &str,
        remote_bulk_offset: u64,
    ) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        let obj_size = self.pool.object_size(payload.offset).await?;
        if region_offset + size > obj_size {
            return Err(BakeError::OutOfBounds);
        }
        let mut buf = vec![0u8; size as usize];
        transport.pull(remote_addr, remote_bulk, remote_bulk_offset, &mut buf).await?;
        self.pool.write(payload.offset, region_offset, &buf).await
    }

    async fn read_raw(&self, rid: RegionId, offset: u64, size: u64) -> BakeResult<Vec<u8>> {
        let payload = self.decode(rid)?;
        self.pool.read(payload.offset, offset, size).await
    }

    async fn read_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        transport: Arc<dyn BulkTransport>,
        remote_addr: &str,
        remote_bulk: &str,
        remote_bulk_offset: u64,
    ) -> BakeResult<u64> {
        let payload = self.decode(rid)?;
        let data = self.pool.read(payload.offset, region_offset, size).await?;
        transport.push(remote_addr, remote_bulk, remote_bulk_offset, &data).await?;
        Ok(data.len() as u64)
    }

    async fn persist(&self, rid: RegionId, offset: u64, size: u64) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        self.pool.persist(payload.offset, offset, size).await
    }

    async fn get_region_size(&self, rid: RegionId) -> BakeResult<u64> {
        let payload = self.decode(rid)?;
        self.pool.object_size(payload.offset).await
    }

    async fn get_region_data(&self, rid: RegionId) -> BakeResult<u64> {
        let payload = self.decode(rid)?;
        self.pool.data_ptr(payload.offset).await
    }

    async fn remove(&self, rid: RegionId) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        self.pool.object_free(payload.offset).await
    }

    async fn finalize(&self) -> BakeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_write_persist_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let target_id = TargetId::new();
        let backend = MemBackend::attach_or_create(&dir.path().join("pool"), &target_id, 1 << 20).unwrap();
        let rid = backend.create(256).await.unwrap();
        backend.write_raw(rid, 0, &[0x7E; 256]).await.unwrap();
        backend.persist(rid, 0, 256).await.unwrap();
        let out = backend.read_raw(rid, 0, 256).await.unwrap();
        assert_eq!(out, vec![0x7E; 256]);
    }

    #[tokio::test]
    async fn unknown_region_from_a_different_pool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target_id = TargetId::new();
        let backend = MemBackend::attach_or_create(&dir.path().join("pool"), &target_id, 1 << 20).unwrap();
        let foreign = RegionId::from_mem_payload(MemRegionPayload {
            pool_uuid_lo: 0xFFFF_FFFF,
            offset: 0,
        });
        assert_eq!(backend.get_region_size(foreign).await.unwrap_err(), BakeError::UnknownRegion);
    }

    #[tokio::test]
    async fn remove_then_reuse_is_addressable_again() {
        let dir = tempfile::tempdir().unwrap();
        let target_id = TargetId::new();
        let backend = MemBackend::attach_or_create(&dir.path().join("pool"), &target_id, 1 << 20).unwrap();
        let rid = backend.create(64).await.unwrap();
        backend.remove(rid).await.unwrap();
        let rid2 = backend.create(64).await.unwrap();
        backend.write_raw(rid2, 0, &[1u8; 64]).await.unwrap();
    }
}
