//! The server-side target engine (L2-L5): the on-disk superblock, the log
//! allocator built on top of it, the staging poolset used to bounce bytes
//! between the network and the log, and the transfer engine that pipelines
//! a bulk I/O through both.

pub mod allocator;
pub mod backend;
pub mod buffer;
pub mod log_io;
pub mod poolset;
pub mod superblock;
pub mod transfer;

pub use allocator::LogAllocator;
pub use backend::Backend;
pub use buffer::AlignedBuffer;
pub use log_io::LogIo;
pub use poolset::StagingPoolset;
pub use superblock::Superblock;
pub use transfer::{transfer_data, Direction, TransferRequest};
