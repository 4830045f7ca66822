//! Error kinds surfaced by the file system engine.
//!
//! Validation failures are returned to the caller before any mutation takes
//! place, so a failed operation never leaves the volume half-changed.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("insufficient space: {needed} bytes requested, {available} available")]
    InsufficientSpace { needed: usize, available: usize },
    #[error("invalid offset {offset} for a file of {size} bytes")]
    InvalidOffset { offset: usize, size: usize },
    #[error("block reference {0} outside the valid data range")]
    InvalidBlockReference(i64),
    #[error("no free blocks left on the device")]
    NoFreeBlocks,
    #[error("the directory has no entry slot left")]
    DirectoryFull,
}
