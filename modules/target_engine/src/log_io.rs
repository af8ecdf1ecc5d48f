//! The narrow async file-I/O seam the transfer engine needs from a backend
//! (§5: "handler tasks submit to the async-I/O pool and suspend until the
//! reply lands; they do not block an OS thread"). A backend's own
//! implementation is expected to hand blocking `pread`/`pwrite` calls off
//! to `tokio::task::spawn_blocking`, the async-I/O-pool equivalent.

use async_trait::async_trait;
use bake_common::error::BakeResult;

#[async_trait]
pub trait LogIo: Send + Sync {
    /// Reads exactly `buf.len()` bytes from log shard `log_index` at
    /// `offset` into `buf`.
    async fn read_at(&self, log_index: u32, offset: u64, buf: &mut [u8]) -> BakeResult<()>;

    /// Writes exactly `buf` to log shard `log_index` at `offset`.
    async fn write_at(&self, log_index: u32, offset: u64, buf: &[u8]) -> BakeResult<()>;
}
