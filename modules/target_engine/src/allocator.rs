//! The log allocator (§4.1).
//!
//! A pure, synchronous struct: all the arithmetic the original's
//! `bake_file_create` does under `file_root_mutex`, with no I/O of its own.
//! The caller (the file backend) holds the equivalent "attach mutex" around
//! calls into this and is responsible for persisting the superblock and
//! extending the log file afterwards.

use crate::superblock::Superblock;
use bake_common::error::BakeError;
use bake_common::ids::FileRegionPayload;

fn align_up(x: u64, alignment: u64) -> u64 {
    (x + alignment - 1) & !(alignment - 1)
}

pub struct LogAllocator {
    superblock: Superblock,
}

impl LogAllocator {
    pub fn new(superblock: Superblock) -> Self {
        LogAllocator { superblock }
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.superblock
    }

    pub fn into_superblock(self) -> Superblock {
        self.superblock
    }

    pub fn alignment(&self) -> u64 {
        self.superblock.alignment
    }

    pub fn log_count(&self) -> u32 {
        self.superblock.log_count
    }

    /// Reconciles the allocator's idea of a log's free offset with the
    /// file's actual length on attach (§C.1): the superblock value is
    /// authoritative, but a log whose length has grown past it (a crash
    /// between file-extend and superblock-write) must not be under-allocated.
    pub fn reconcile_log_length(&mut self, log_index: u32, file_len: u64) {
        let cur = &mut self.superblock.next_free_offset[log_index as usize];
        if file_len > *cur {
            *cur = file_len;
        }
    }

    /// `allocate(size) -> {log_index, log_offset, log_entry_size}` (§4.1).
    /// Rounds up to `alignment`, advances the round-robin cursor, and
    /// advances that log's free-offset cursor by the rounded size.
    pub fn allocate(&mut self, size: u64) -> Result<FileRegionPayload, BakeError> {
        if self.superblock.log_count == 0 {
            return Err(BakeError::InvalidArg("target has no log shards".into()));
        }
        let log_entry_size = align_up(size, self.superblock.alignment);
        let log_index = self.superblock.next_log_to_use;
        self.superblock.next_log_to_use =
            (log_index + 1) % self.superblock.log_count;
        let log_offset = self.superblock.next_free_offset[log_index as usize];
        self.superblock.next_free_offset[log_index as usize] += log_entry_size;
        Ok(FileRegionPayload {
            log_index,
            log_offset,
            log_entry_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bake_common::ids::TargetId;

    fn sb(nlogs: u32, alignment: u64) -> Superblock {
        let mut sb = Superblock::new_unformatted(TargetId::new());
        sb.format(nlogs, alignment).unwrap();
        sb
    }

    #[test]
    fn allocate_rounds_up_and_round_robins() {
        let mut alloc = LogAllocator::new(sb(2, 4096));
        let r0 = alloc.allocate(10).unwrap();
        let r1 = alloc.allocate(4096).unwrap();
        let r2 = alloc.allocate(1).unwrap();

        assert_eq!(r0.log_index, 0);
        assert_eq!(r0.log_offset, 0);
        assert_eq!(r0.log_entry_size, 4096);

        assert_eq!(r1.log_index, 1);
        assert_eq!(r1.log_offset, 0);
        assert_eq!(r1.log_entry_size, 4096);

        assert_eq!(r2.log_index, 0);
        assert_eq!(r2.log_offset, 4096);
        assert_eq!(r2.log_entry_size, 4096);
    }

    #[test]
    fn allocations_within_a_log_are_monotone() {
        let mut alloc = LogAllocator::new(sb(1, 512));
        let mut last = 0u64;
        for size in [100u64, 4000, 1, 9000] {
            let r = alloc.allocate(size).unwrap();
            assert!(r.log_offset >= last);
            last = r.log_offset + r.log_entry_size;
        }
    }

    #[test]
    fn reconcile_never_moves_cursor_backward() {
        let mut alloc = LogAllocator::new(sb(1, 4096));
        alloc.allocate(4096).unwrap();
        alloc.reconcile_log_length(0, 0);
        assert_eq!(alloc.superblock().next_free_offset[0], 4096);
        alloc.reconcile_log_length(0, 8192);
        assert_eq!(alloc.superblock().next_free_offset[0], 8192);
    }
}
