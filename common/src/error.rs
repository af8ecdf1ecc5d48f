//! The closed error enumeration returned by every BAKE operation.
//!
//! Mirrors the single closed surface pattern used for REST responses in the
//! teacher project (`RESTError`): internals compose with `anyhow::Result`,
//! and are mapped to one of these variants at the dispatch boundary so the
//! wire never carries anything but a fixed `ret` code plus a human message.

use thiserror::Error;

pub type BakeResult<T> = Result<T, BakeError>;

/// One of the fifteen non-success kinds from the wire error enumeration.
/// `SUCCESS` itself has no variant here: it is `Ok(())` / `Ok(T)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BakeError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("transport error: {0}")]
    Mercury(String),

    #[error("task runtime error: {0}")]
    Argobots(String),

    #[error("memory backend error: {0}")]
    Pmem(String),

    #[error("unknown target")]
    UnknownTarget,

    #[error("unknown provider")]
    UnknownProvider,

    #[error("unknown region")]
    UnknownRegion,

    #[error("out of bounds")]
    OutOfBounds,

    #[error("file-set service error: {0}")]
    Remi(String),

    #[error("operation unsupported: {0}")]
    OpUnsupported(String),

    #[error("no such file or directory: {0}")]
    Noent(String),

    #[error("already exists: {0}")]
    Exist(String),

    #[error("wrong backend type for this target")]
    BackendType,

    #[error("i/o error: {0}")]
    Io(String),
}

impl BakeError {
    /// The `ret: i32` code carried on the wire (§6). `0` is reserved for
    /// success and is never produced by this type.
    pub fn ret_code(&self) -> i32 {
        match self {
            BakeError::Allocation(_) => 1,
            BakeError::InvalidArg(_) => 2,
            BakeError::Mercury(_) => 3,
            BakeError::Argobots(_) => 4,
            BakeError::Pmem(_) => 5,
            BakeError::UnknownTarget => 6,
            BakeError::UnknownProvider => 7,
            BakeError::UnknownRegion => 8,
            BakeError::OutOfBounds => 9,
            BakeError::Remi(_) => 10,
            BakeError::OpUnsupported(_) => 11,
            BakeError::Noent(_) => 12,
            BakeError::Exist(_) => 13,
            BakeError::BackendType => 14,
            BakeError::Io(_) => 15,
        }
    }
}

impl From<std::io::Error> for BakeError {
    fn from(e: std::io::Error) -> Self {
        BakeError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ret_codes_are_nonzero_and_distinct() {
        let errs = [
            BakeError::Allocation("x".into()),
            BakeError::InvalidArg("x".into()),
            BakeError::Mercury("x".into()),
            BakeError::Argobots("x".into()),
            BakeError::Pmem("x".into()),
            BakeError::UnknownTarget,
            BakeError::UnknownProvider,
            BakeError::UnknownRegion,
            BakeError::OutOfBounds,
            BakeError::Remi("x".into()),
            BakeError::OpUnsupported("x".into()),
            BakeError::Noent("x".into()),
            BakeError::Exist("x".into()),
            BakeError::BackendType,
            BakeError::Io("x".into()),
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.ret_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
        assert!(codes.iter().all(|&c| c != 0));
    }
}
