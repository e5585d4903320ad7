//! Crate-wide error taxonomy.
//!
//! Every fallible operation in every layer (device, cache, FAT, directory,
//! facade, scheduler) returns `Result<T, FsError>`. There is no panicking on
//! caller-reachable conditions; panics are reserved for internal invariant
//! violations that would indicate a bug in this crate, not bad caller input.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("directory full: {0}")]
    DirectoryFull(String),

    #[error("no space left on device")]
    NoSpace,

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid block index {0}")]
    InvalidBlock(u32),

    #[error("corrupt FAT chain starting at block {0}")]
    CorruptFat(u32),

    #[error("buffer pool exhausted: all {0} pages are pinned")]
    PoolExhausted(usize),

    #[error("file is locked: {0}")]
    Locked(String),
}

pub type FsResult<T> = Result<T, FsError>;
