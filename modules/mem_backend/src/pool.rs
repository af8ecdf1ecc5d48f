//! A single memory-mapped pool file and the object allocator over it (§4.5:
//! "Allocation is `object_alloc(pool, size_plus_optional_header)`").
//!
//! There is no PMDK here — the corpus has no Rust PMDK binding — so the
//! "persistent memory object allocator" (§1, an external collaborator) is
//! stood in for by a plain `memmap2::MmapMut` over a regular file plus a
//! first-fit free-list allocator. `persist` becomes `MmapMut::flush_range`,
//! the nearest portable equivalent to `pmem_persist` this corpus offers.
//!
//! §4.5 describes the size header as optional ("when absent, `get_size`...
//! return unsupported"); BAKE always includes it — a resolved Open Question
//! (see DESIGN.md) since there is no reason to forgo a feature that is
//! merely made conditional rather than forbidden.

use bake_common::error::{BakeError, BakeResult};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use tokio::sync::RwLock;

/// Size, in bytes, of the header prepended to every allocated object: the
/// object's logical data size, little-endian (§4.5 "optional compile-time
/// header stores the region size").
pub const HEADER_BYTES: u64 = 8;

struct FreeBlock {
    offset: u64,
    len: u64,
}

struct AllocatorState {
    /// Next never-used byte; objects are bump-allocated from here until
    /// the pool is exhausted, at which point only freed blocks are reused.
    bump: u64,
    capacity: u64,
    free: Vec<FreeBlock>,
}

impl AllocatorState {
    fn alloc(&mut self, data_len: u64) -> BakeResult<u64> {
        let total = HEADER_BYTES + data_len;
        if let Some(idx) = self.free.iter().position(|b| b.len >= total) {
            let block = self.free.remove(idx);
            if block.len > total {
                self.free.push(FreeBlock {
                    offset: block.offset + total,
                    len: block.len - total,
                });
            }
            return Ok(block.offset);
        }
        if self.bump + total > self.capacity {
            return Err(BakeError::Allocation(format!(
                "pool exhausted: need {total} bytes, {} remain",
                self.capacity.saturating_sub(self.bump)
            )));
        }
        let offset = self.bump;
        self.bump += total;
        Ok(offset)
    }

    fn free(&mut self, offset: u64, data_len: u64) {
        self.free.push(FreeBlock {
            offset,
            len: HEADER_BYTES + data_len,
        });
    }
}

/// One attached memory-backend target: a single pool file, entirely
/// memory-mapped.
pub struct MemPool {
    mmap: RwLock<MmapMut>,
    alloc: RwLock<AllocatorState>,
}

impl MemPool {
    /// Opens (creating and zero-extending if necessary) the pool file at
    /// `path`, sized to at least `initial_size` bytes (§4.7
    /// `pmem_backend.default_initial_target_size`).
    pub fn attach_or_create(path: &Path, initial_size: u64) -> BakeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| BakeError::Io(format!("open {}: {e}", path.display())))?;
        let meta = file.metadata().map_err(|e| BakeError::Io(e.to_string()))?;
        let capacity = meta.len().max(initial_size);
        if meta.len() < capacity {
            file.set_len(capacity).map_err(|e| BakeError::Io(e.to_string()))?;
        }
        // SAFETY: `file` is kept open for at least as long as the mapping
        // lives (it is consumed into the mmap, which holds its own fd);
        // no other process is assumed to map this file concurrently.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| BakeError::Io(format!("mmap {}: {e}", path.display())))?;
        Ok(MemPool {
            mmap: RwLock::new(mmap),
            alloc: RwLock::new(AllocatorState {
                bump: 0,
                capacity,
                free: Vec::new(),
            }),
        })
    }

    pub async fn object_alloc(&self, data_len: u64) -> BakeResult<u64> {
        let offset = {
            let mut alloc = self.alloc.write().await;
            alloc.alloc(data_len)?
        };
        let mut mmap = self.mmap.write().await;
        let header_at = offset as usize;
        mmap[header_at..header_at + HEADER_BYTES as usize].copy_from_slice(&data_len.to_le_bytes());
        Ok(offset)
    }

    pub async fn object_free(&self, offset: u64) -> BakeResult<()> {
        let data_len = self.object_size(offset).await?;
        self.alloc.write().await.free(offset, data_len);
        Ok(())
    }

    pub async fn object_size(&self, offset: u64) -> BakeResult<u64> {
        let mmap = self.mmap.read().await;
        let header_at = offset as usize;
        if header_at + HEADER_BYTES as usize > mmap.len() {
            return Err(BakeError::OutOfBounds);
        }
        let bytes: [u8; 8] = mmap[header_at..header_at + HEADER_BYTES as usize].try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    pub async fn write(&self, offset: u64, at: u64, data: &[u8]) -> BakeResult<()> {
        let size = self.object_size(offset).await?;
        if at + data.len() as u64 > size {
            return Err(BakeError::OutOfBounds);
        }
        let mut mmap = self.mmap.write().await;
        let start = offset as usize + HEADER_BYTES as usize + at as usize;
        mmap[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub async fn read(&self, offset: u64, at: u64, len: u64) -> BakeResult<Vec<u8>> {
        let size = self.object_size(offset).await?;
        if at + len > size {
            return Err(BakeError::OutOfBounds);
        }
        let mmap = self.mmap.read().await;
        let start = offset as usize + HEADER_BYTES as usize + at as usize;
        Ok(mmap[start..start + len as usize].to_vec())
    }

    /// Raw, process-local pointer to an object's data, for `get_data`
    /// (§6). Valid only as long as the mapping is alive.
    pub async fn data_ptr(&self, offset: u64) -> BakeResult<u64> {
        let _ = self.object_size(offset).await?;
        let mmap = self.mmap.read().await;
        let ptr = mmap.as_ptr() as u64 + offset + HEADER_BYTES;
        Ok(ptr)
    }

    /// `pmem_persist(ptr, size)` (§4.5): flushes the object's dirty pages
    /// to the backing file.
    pub async fn persist(&self, offset: u64, at: u64, len: u64) -> BakeResult<()> {
        let mmap = self.mmap.read().await;
        let start = offset as usize + HEADER_BYTES as usize + at as usize;
        let len = len as usize;
        mmap.flush_range(start, len.max(1))
            .map_err(|e| BakeError::Pmem(format!("flush_range: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alloc_write_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pool = MemPool::attach_or_create(&dir.path().join("pool"), 1 << 20).unwrap();
        let off = pool.object_alloc(128).await.unwrap();
        pool.write(off, 0, &[0x5A; 128]).await.unwrap();
        let out = pool.read(off, 0, 128).await.unwrap();
        assert_eq!(out, vec![0x5A; 128]);
    }

    #[tokio::test]
    async fn write_out_of_bounds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = MemPool::attach_or_create(&dir.path().join("pool"), 1 << 20).unwrap();
        let off = pool.object_alloc(16).await.unwrap();
        assert!(pool.write(off, 8, &[0u8; 16]).await.is_err());
    }

    #[tokio::test]
    async fn free_allows_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let pool = MemPool::attach_or_create(&dir.path().join("pool"), 1 << 20).unwrap();
        let a = pool.object_alloc(64).await.unwrap();
        pool.object_free(a).await.unwrap();
        let b = pool.object_alloc(64).await.unwrap();
        assert_eq!(a, b);
    }
}
