//! The target superblock (§3 "Target (on storage)", L2).
//!
//! One fixed-size, `BAKE_SUPERBLOCK_SIZE`-wide block at the front of a
//! target's root file. Ported byte-for-byte from the original's
//! `bake_root_t` plus one addition: a persisted `next_log_to_use` cursor
//! (§C.2 of the expanded spec) so the round-robin allocator is
//! deterministic across restarts instead of reseeding from `rand()`.

use bake_common::error::BakeError;
use bake_common::ids::TargetId;
use uuid::Uuid;

/// Fixed at target creation; must be a multiple of 4 KiB so directio can
/// read/write it as a single aligned block.
pub const SUPERBLOCK_SIZE: usize = 4096;

const TARGET_ID_OFFSET: usize = 0;
const LOG_COUNT_OFFSET: usize = 16;
const ALIGNMENT_OFFSET: usize = 20;
const NEXT_LOG_OFFSET: usize = 28;
const OFFSETS_OFFSET: usize = 32;

/// `(BAKE_SUPERBLOCK_SIZE - header) / size_of::<u64>()`, the maximum number
/// of log shards representable in one superblock.
pub const MAX_LOGS: u32 = ((SUPERBLOCK_SIZE - OFFSETS_OFFSET) / 8) as u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub target_id: TargetId,
    pub log_count: u32,
    pub alignment: u64,
    /// Round-robin cursor for the log allocator (§C.2 redesign).
    pub next_log_to_use: u32,
    /// One entry per log shard: the next free, alignment-aligned byte
    /// offset in that shard.
    pub next_free_offset: Vec<u64>,
}

impl Superblock {
    /// A freshly formatted superblock, as written by `mkpool` (§6
    /// "bake-file-root"). `log_count`/`alignment` are left at zero until
    /// the first attach locks them in, matching the original's
    /// `bake_file_makepool`.
    pub fn new_unformatted(target_id: TargetId) -> Self {
        Superblock {
            target_id,
            log_count: 0,
            alignment: 0,
            next_log_to_use: 0,
            next_free_offset: Vec::new(),
        }
    }

    pub fn is_formatted(&self) -> bool {
        self.log_count != 0 && self.alignment != 0
    }

    /// Locks in `log_count`/`alignment` on first attach and allocates the
    /// offset table.
    pub fn format(&mut self, log_count: u32, alignment: u64) -> Result<(), BakeError> {
        if log_count == 0 || log_count > MAX_LOGS {
            return Err(BakeError::InvalidArg(format!(
                "nlogs {log_count} out of range (1..={MAX_LOGS})"
            )));
        }
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(BakeError::InvalidArg(
                "alignment must be a nonzero power of two".into(),
            ));
        }
        self.log_count = log_count;
        self.alignment = alignment;
        self.next_free_offset = vec![0; log_count as usize];
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<[u8; SUPERBLOCK_SIZE], BakeError> {
        if self.next_free_offset.len() != self.log_count as usize {
            return Err(BakeError::InvalidArg(
                "superblock offset table length mismatch".into(),
            ));
        }
        if OFFSETS_OFFSET + 8 * self.log_count as usize > SUPERBLOCK_SIZE {
            return Err(BakeError::InvalidArg("nlogs too large for superblock".into()));
        }
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[TARGET_ID_OFFSET..TARGET_ID_OFFSET + 16]
            .copy_from_slice(self.target_id.as_uuid().as_bytes());
        buf[LOG_COUNT_OFFSET..LOG_COUNT_OFFSET + 4].copy_from_slice(&self.log_count.to_le_bytes());
        buf[ALIGNMENT_OFFSET..ALIGNMENT_OFFSET + 8].copy_from_slice(&self.alignment.to_le_bytes());
        buf[NEXT_LOG_OFFSET..NEXT_LOG_OFFSET + 4]
            .copy_from_slice(&self.next_log_to_use.to_le_bytes());
        for (i, off) in self.next_free_offset.iter().enumerate() {
            let start = OFFSETS_OFFSET + i * 8;
            buf[start..start + 8].copy_from_slice(&off.to_le_bytes());
        }
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8; SUPERBLOCK_SIZE]) -> Result<Self, BakeError> {
        let target_id_bytes: [u8; 16] = buf[TARGET_ID_OFFSET..TARGET_ID_OFFSET + 16]
            .try_into()
            .unwrap();
        let target_id = TargetId::from_uuid(Uuid::from_bytes(target_id_bytes));
        if target_id.is_nil() {
            return Err(BakeError::Io("superblock is not formatted".into()));
        }
        let log_count = u32::from_le_bytes(
            buf[LOG_COUNT_OFFSET..LOG_COUNT_OFFSET + 4].try_into().unwrap(),
        );
        let alignment = u64::from_le_bytes(
            buf[ALIGNMENT_OFFSET..ALIGNMENT_OFFSET + 8].try_into().unwrap(),
        );
        let next_log_to_use = u32::from_le_bytes(
            buf[NEXT_LOG_OFFSET..NEXT_LOG_OFFSET + 4].try_into().unwrap(),
        );
        let mut next_free_offset = Vec::with_capacity(log_count as usize);
        for i in 0..log_count as usize {
            let start = OFFSETS_OFFSET + i * 8;
            if start + 8 > SUPERBLOCK_SIZE {
                return Err(BakeError::Io("superblock nlogs overflows block".into()));
            }
            next_free_offset.push(u64::from_le_bytes(buf[start..start + 8].try_into().unwrap()));
        }
        Ok(Superblock {
            target_id,
            log_count,
            alignment,
            next_log_to_use,
            next_free_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut sb = Superblock::new_unformatted(TargetId::new());
        sb.format(4, 4096).unwrap();
        sb.next_free_offset[2] = 8192;
        sb.next_log_to_use = 3;
        let bytes = sb.to_bytes().unwrap();
        let back = Superblock::from_bytes(&bytes).unwrap();
        assert_eq!(sb, back);
    }

    #[test]
    fn rejects_nil_target_id() {
        let buf = [0u8; SUPERBLOCK_SIZE];
        assert!(Superblock::from_bytes(&buf).is_err());
    }

    #[test]
    fn format_rejects_bad_alignment() {
        let mut sb = Superblock::new_unformatted(TargetId::new());
        assert!(sb.format(4, 4095).is_err());
        assert!(sb.format(0, 4096).is_err());
    }
}
