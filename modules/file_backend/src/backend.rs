//! The file backend (L6, §4.4): a log-structured, block-aligned,
//! direct-I/O-file target, built on the target engine's superblock,
//! allocator, staging poolset and transfer engine.

use crate::logio::FileLogIo;
use crate::open::open_rw;
use async_trait::async_trait;
use bake_common::config::FileBackendConfig;
use bake_common::error::{BakeError, BakeResult};
use bake_common::ids::{FileRegionPayload, RegionId, RegionPayload};
use bake_module_target_engine::buffer::AlignedBuffer;
use bake_module_target_engine::superblock::Superblock;
use bake_module_target_engine::transfer::{transfer_data, Direction, TransferRequest};
use bake_module_target_engine::{Backend, LogAllocator, LogIo, StagingPoolset};
use bake_module_transport::BulkTransport;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

fn align_down(x: u64, alignment: u64) -> u64 {
    x & !(alignment - 1)
}

fn align_up(x: u64, alignment: u64) -> u64 {
    (x + alignment - 1) & !(alignment - 1)
}

struct State {
    allocator: LogAllocator,
}

/// One attached file-backend target (§3 "File-backend context").
pub struct FileBackend {
    path: PathBuf,
    root: Arc<File>,
    log_io: Arc<FileLogIo>,
    poolset: Arc<StagingPoolset>,
    sync_on_persist: bool,
    /// Whether logs actually ended up opened with O_DIRECT, after any
    /// downgrade (§C.3). Exposed so the provider's config layer can write
    /// the live `file_backend.directio` key back to `false`.
    pub directio_active: bool,
    state: Mutex<State>,
}

impl FileBackend {
    /// Attaches to (or, if the directory is empty, formats and then
    /// attaches to) a file-backend target at `path` (§4.6/§4.7, §C.1,
    /// §C.6). `poolset` is owned by the provider and shared across every
    /// file-backend target it hosts.
    pub async fn attach_or_create(
        path: &Path,
        cfg: &FileBackendConfig,
        poolset: Arc<StagingPoolset>,
    ) -> BakeResult<Self> {
        cfg.validate()?;
        std::fs::create_dir_all(path)
            .map_err(|e| BakeError::Io(format!("mkdir {}: {e}", path.display())))?;

        let root_path = path.join("bake-file-root");
        let existed = root_path.exists() && std::fs::metadata(&root_path).map(|m| m.len() > 0).unwrap_or(false);
        let mut root_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&root_path)
            .map_err(|e| BakeError::Io(format!("open {}: {e}", root_path.display())))?;

        let mut superblock = if existed {
            let mut buf = [0u8; bake_module_target_engine::superblock::SUPERBLOCK_SIZE];
            root_file
                .read_exact(&mut buf)
                .map_err(|e| BakeError::Io(format!("read superblock: {e}")))?;
            let sb = Superblock::from_bytes(&buf)?;
            if sb.log_count != cfg.nlogs || sb.alignment != cfg.alignment {
                return Err(BakeError::Io(format!(
                    "configuration mismatch: superblock has nlogs={} alignment={}, config wants nlogs={} alignment={}",
                    sb.log_count, sb.alignment, cfg.nlogs, cfg.alignment
                )));
            }
            sb
        } else {
            let mut sb = Superblock::new_unformatted(bake_common::ids::TargetId::new());
            sb.format(cfg.nlogs, cfg.alignment)?;
            sb
        };

        let mut logs = Vec::with_capacity(cfg.nlogs as usize);
        let mut directio_active = cfg.directio;
        for i in 0..cfg.nlogs {
            let log_path = path.join(format!("log.{i}"));
            let (file, got_directio) = open_rw(&log_path, cfg.directio)?;
            if !got_directio {
                directio_active = false;
            }
            let len = file
                .metadata()
                .map_err(|e| BakeError::Io(format!("stat {}: {e}", log_path.display())))?
                .len();
            superblock.next_free_offset.resize(cfg.nlogs as usize, 0);
            if len > superblock.next_free_offset[i as usize] {
                superblock.next_free_offset[i as usize] = len;
            }
            logs.push(Arc::new(file));
        }

        let allocator = LogAllocator::new(superblock);
        let log_io = Arc::new(FileLogIo::new(logs));

        let backend = FileBackend {
            path: path.to_path_buf(),
            root: Arc::new(root_file_dup(&mut root_file)?),
            log_io,
            poolset,
            sync_on_persist: cfg.sync,
            directio_active,
            state: Mutex::new(State { allocator }),
        };
        backend.write_superblock().await?;
        Ok(backend)
    }

    async fn write_superblock(&self) -> BakeResult<()> {
        let bytes = {
            let state = self.state.lock().await;
            state.allocator.superblock().to_bytes()?
        };
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || root.write_all_at(&bytes, 0))
            .await
            .map_err(|e| BakeError::Argobots(format!("superblock write join error: {e}")))?
            .map_err(|e| BakeError::Io(format!("write superblock: {e}")))
    }

    /// The target id locked into this target's superblock at format time.
    pub async fn target_id(&self) -> bake_common::ids::TargetId {
        self.state.lock().await.allocator.superblock().target_id
    }

    fn decode(&self, rid: RegionId) -> BakeResult<FileRegionPayload> {
        match rid.payload()? {
            RegionPayload::File(p) => Ok(p),
            RegionPayload::Mem(_) => Err(BakeError::BackendType),
        }
    }

}

/// Duplicates the already-open root file handle so the backend can hold its
/// own `Arc<File>` independent of the `File` used to read the superblock
/// during attach (both refer to the same underlying fd table entry via
/// `dup`, which is what the original's single long-lived `root_fd` amounts
/// to once attach finishes).
fn root_file_dup(f: &mut File) -> BakeResult<File> {
    f.try_clone().map_err(|e| BakeError::Io(format!("dup root fd: {e}")))
}

#[async_trait]
impl Backend for FileBackend {
    async fn create(&self, size: u64) -> BakeResult<RegionId> {
        let (payload, alignment) = {
            let mut state = self.state.lock().await;
            let payload = state.allocator.allocate(size)?;
            (payload, state.allocator.alignment())
        };
        // Touch the last block of the new extent so the log file's length
        // covers the whole allocation immediately (§4.1).
        let last_block = payload.log_offset + payload.log_entry_size - alignment;
        let zeros = AlignedBuffer::new(alignment as usize, alignment as usize);
        self.log_io.write_at(payload.log_index, last_block, zeros.as_slice()).await?;
        if self.sync_on_persist {
            self.log_io.sync(payload.log_index).await?;
        }
        self.write_superblock().await?;
        Ok(RegionId::from_file_payload(payload))
    }

    async fn write_raw(&self, rid: RegionId, offset: u64, data: &[u8]) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        let alignment = {
            let state = self.state.lock().await;
            state.allocator.alignment()
        };
        if offset + data.len() as u64 > payload.log_entry_size {
            return Err(BakeError::OutOfBounds);
        }
        if offset != 0 && offset % alignment != 0 {
            return Err(BakeError::OpUnsupported(
                "unaligned write to a non-zero region offset".into(),
            ));
        }
        let mut buf = AlignedBuffer::new(align_up(data.len() as u64, alignment) as usize, alignment as usize);
        buf.as_mut_slice()[..data.len()].copy_from_slice(data);
        self.log_io
            .write_at(payload.log_index, payload.log_offset + offset, buf.as_slice())
            .await
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
        let alignment = {
            let state = self.state.lock().await;
            state.allocator.alignment()
        };
        if region_offset != 0 {
            return Err(BakeError::OpUnsupported(
                "bulk writes that begin at a non-zero region offset require a read-modify-write".into(),
            ));
        }
        let req = TransferRequest {
            direction: Direction::Pull,
            log_index: payload.log_index,
            log_entry_offset: payload.log_offset,
            log_entry_size: payload.log_entry_size,
            region_offset,
            transmit_size: size,
            remote_addr,
            remote_bulk,
            remote_bulk_offset,
            alignment,
        };
        transfer_data(
            req,
            self.log_io.clone() as Arc<dyn LogIo>,
            self.poolset.clone(),
            transport,
        )
        .await
        .map(|_| ())
    }

    async fn read_raw(&self, rid: RegionId, offset: u64, size: u64) -> BakeResult<Vec<u8>> {
        let payload = self.decode(rid)?;
        let alignment = {
            let state = self.state.lock().await;
            state.allocator.alignment()
        };
        if offset + size > payload.log_entry_size {
            return Err(BakeError::OutOfBounds);
        }
        let aligned_start = align_down(offset, alignment);
        let aligned_len = align_up(offset + size, alignment) - aligned_start;
        let mut buf = AlignedBuffer::new(aligned_len as usize, alignment as usize);
        self.log_io
            .read_at(payload.log_index, payload.log_offset + aligned_start, buf.as_mut_slice())
            .await?;
        let start = (offset - aligned_start) as usize;
        Ok(buf.as_slice()[start..start + size as usize].to_vec())
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
        let alignment = {
            let state = self.state.lock().await;
            state.allocator.alignment()
        };
        let req = TransferRequest {
            direction: Direction::Push,
            log_index: payload.log_index,
            log_entry_offset: payload.log_offset,
            log_entry_size: payload.log_entry_size,
            region_offset,
            transmit_size: size,
            remote_addr,
            remote_bulk,
            remote_bulk_offset,
            alignment,
        };
        transfer_data(req, self.log_io.clone() as Arc<dyn LogIo>, self.poolset.clone(), transport).await
    }

    async fn persist(&self, rid: RegionId, _offset: u64, _size: u64) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        if self.sync_on_persist {
            self.log_io.sync(payload.log_index).await?;
        }
        Ok(())
    }

    async fn get_region_size(&self, rid: RegionId) -> BakeResult<u64> {
        let payload = self.decode(rid)?;
        Ok(payload.log_entry_size)
    }

    async fn get_region_data(&self, _rid: RegionId) -> BakeResult<u64> {
        Err(BakeError::OpUnsupported(
            "file backend keeps region data behind file descriptors, not a mapped pointer".into(),
        ))
    }

    async fn remove(&self, rid: RegionId) -> BakeResult<()> {
        let payload = self.decode(rid)?;
        self.log_io
            .punch_hole(payload.log_index, payload.log_offset, payload.log_entry_size)
            .await
    }

    async fn finalize(&self) -> BakeResult<()> {
        self.write_superblock().await
    }

    async fn create_fileset(&self) -> Option<BakeResult<Vec<PathBuf>>> {
        let nlogs = self.log_io.len();
        let mut files = vec![self.path.join("bake-file-root")];
        for i in 0..nlogs {
            files.push(self.path.join(format!("log.{i}")));
        }
        Some(Ok(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bake_common::config::FileBackendConfig;

    fn cfg() -> FileBackendConfig {
        FileBackendConfig {
            nlogs: 2,
            alignment: 4096,
            sync: true,
            directio: false,
            abtio_nthreads: 4,
            targets: Vec::new(),
        }
    }

    fn poolset() -> Arc<StagingPoolset> {
        Arc::new(StagingPoolset::new(2, 4, 65536, 4, 4096).unwrap())
    }

    #[tokio::test]
    async fn create_write_persist_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::attach_or_create(dir.path(), &cfg(), poolset()).await.unwrap();
        let rid = backend.create(1024).await.unwrap();
        backend.write_raw(rid, 0, &[0xA5; 1024]).await.unwrap();
        backend.persist(rid, 0, 1024).await.unwrap();
        let out = backend.read_raw(rid, 0, 1024).await.unwrap();
        assert_eq!(out, vec![0xA5; 1024]);
    }

    #[tokio::test]
    async fn write_out_of_bounds_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::attach_or_create(dir.path(), &cfg(), poolset()).await.unwrap();
        let rid = backend.create(1024).await.unwrap();
        let err = backend.write_raw(rid, 512, &[0u8; 1024]).await.unwrap_err();
        assert_eq!(err, BakeError::OutOfBounds);
    }

    #[tokio::test]
    async fn remove_isolates_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::attach_or_create(dir.path(), &cfg(), poolset()).await.unwrap();
        let r0 = backend.create(65536).await.unwrap();
        let r1 = backend.create(65536).await.unwrap();
        let r2 = backend.create(65536).await.unwrap();
        backend.write_raw(r0, 0, &[0x11; 4096]).await.unwrap();
        backend.write_raw(r1, 0, &[0x22; 4096]).await.unwrap();
        backend.write_raw(r2, 0, &[0x33; 4096]).await.unwrap();
        backend.remove(r1).await.unwrap();
        assert_eq!(backend.read_raw(r0, 0, 4096).await.unwrap(), vec![0x11; 4096]);
        assert_eq!(backend.read_raw(r2, 0, 4096).await.unwrap(), vec![0x33; 4096]);
    }

    #[tokio::test]
    async fn reattach_respects_superblock_configuration_lock_in() {
        let dir = tempfile::tempdir().unwrap();
        FileBackend::attach_or_create(dir.path(), &cfg(), poolset()).await.unwrap();
        let mut bad = cfg();
        bad.nlogs = 99;
        let err = FileBackend::attach_or_create(dir.path(), &bad, poolset()).await.unwrap_err();
        assert!(matches!(err, BakeError::Io(_)));
    }
}
