//! The staging poolset (§4.2): pre-allocated, page-aligned RAM buffers
//! bucketed into geometrically-sized pools, standing in for buffers
//! pre-registered with the RPC transport for zero-copy RDMA.
//!
//! `acquire` blocks cooperatively rather than failing when a pool is
//! exhausted (§7 "local recovery": "allocation of a staging buffer blocks
//! rather than fails"). Implemented with a `tokio::sync::Mutex` guarding each
//! pool's free list plus a `tokio::sync::Notify`, the same primitive pair
//! the transfer engine's fan-out/join uses (§REDESIGN FLAGS), rather than a
//! counting semaphore: the free list itself is the resource, so there is
//! nothing a semaphore permit would track that the list doesn't already.

use crate::buffer::AlignedBuffer;
use bake_common::error::BakeError;
use tokio::sync::{Mutex, Notify};

struct Pool {
    buffer_size: u64,
    free: Mutex<Vec<AlignedBuffer>>,
    notify: Notify,
}

pub struct StagingPoolset {
    pools: Vec<Pool>,
}

/// A buffer on loan from the poolset. Must be returned via
/// [`StagingPoolset::release`] or its memory is simply dropped (which is
/// safe, just wasteful — the pool permanently shrinks by one buffer).
pub struct StagingBuffer {
    buf: AlignedBuffer,
    pool_index: usize,
}

impl StagingBuffer {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl StagingPoolset {
    /// `pool_count` pools, each with `buffers_per_pool` buffers; pool `k`'s
    /// buffers are `smallest_buffer_bytes * size_multiplier^k` bytes,
    /// aligned to `alignment` (§4.2).
    pub fn new(
        pool_count: u32,
        buffers_per_pool: u32,
        smallest_buffer_bytes: u64,
        size_multiplier: u32,
        alignment: u64,
    ) -> Result<Self, BakeError> {
        if pool_count == 0 || buffers_per_pool == 0 {
            return Err(BakeError::InvalidArg(
                "pipeline_npools and pipeline_nbuffers_per_pool must be > 0".into(),
            ));
        }
        let mut pools = Vec::with_capacity(pool_count as usize);
        let mut buffer_size = smallest_buffer_bytes;
        for _ in 0..pool_count {
            let mut free = Vec::with_capacity(buffers_per_pool as usize);
            for _ in 0..buffers_per_pool {
                free.push(AlignedBuffer::new(buffer_size as usize, alignment as usize));
            }
            pools.push(Pool {
                buffer_size,
                free: Mutex::new(free),
                notify: Notify::new(),
            });
            buffer_size = buffer_size.saturating_mul(size_multiplier as u64);
        }
        Ok(StagingPoolset { pools })
    }

    /// Largest pool's buffer size; the caller uses this to decide chunk
    /// boundaries for a bulk transfer (§4.3).
    pub fn max_buffer_size(&self) -> u64 {
        self.pools.last().map(|p| p.buffer_size).unwrap_or(0)
    }

    fn pool_for(&self, min_size: u64) -> Result<usize, BakeError> {
        self.pools
            .iter()
            .position(|p| p.buffer_size >= min_size)
            .ok_or_else(|| {
                BakeError::Allocation(format!(
                    "no staging pool holds a buffer of at least {min_size} bytes (max {})",
                    self.max_buffer_size()
                ))
            })
    }

    /// Blocks until a buffer of the smallest pool whose buffer size is
    /// `>= min_size` is available.
    pub async fn acquire(&self, min_size: u64) -> Result<StagingBuffer, BakeError> {
        let pool_index = self.pool_for(min_size)?;
        let pool = &self.pools[pool_index];
        loop {
            {
                let mut free = pool.free.lock().await;
                if let Some(buf) = free.pop() {
                    return Ok(StagingBuffer { buf, pool_index });
                }
            }
            pool.notify.notified().await;
        }
    }

    pub async fn release(&self, buffer: StagingBuffer) {
        let pool = &self.pools[buffer.pool_index];
        pool.free.lock().await.push(buffer.buf);
        pool.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_picks_smallest_fitting_pool() {
        let ps = StagingPoolset::new(3, 2, 1024, 4, 4096).unwrap();
        assert_eq!(ps.max_buffer_size(), 1024 * 16);
        let buf = ps.acquire(2000).await.unwrap();
        assert_eq!(buf.len(), 4096);
        ps.release(buf).await;
    }

    #[tokio::test]
    async fn acquire_blocks_until_release() {
        let ps = std::sync::Arc::new(StagingPoolset::new(1, 1, 4096, 4, 4096).unwrap());
        let first = ps.acquire(1).await.unwrap();

        let ps2 = ps.clone();
        let waiter = tokio::spawn(async move { ps2.acquire(1).await.unwrap() });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        ps.release(first).await;
        let second = waiter.await.unwrap();
        assert_eq!(second.len(), 4096);
    }

    #[tokio::test]
    async fn acquire_rejects_oversized_request() {
        let ps = StagingPoolset::new(2, 1, 1024, 2, 4096).unwrap();
        assert!(ps.acquire(1 << 30).await.is_err());
    }
}
