//! fat-fs
//!
//! fat-fs is a minimal single-directory file system built around a FAT-style
//! allocation table on a fixed-size block device.
//!
//! The crate is layered from bottom to top:
//!
//! - Block device interface layer ([`BlockDevice`])
//! - Block cache layer ([`block_cache`])
//! - Disk layout layer: the allocation table ([`AllocTable`]) and the flat
//!   directory ([`Directory`]) of fixed-width entries ([`DirEntry`])
//! - File system engine layer ([`FlatFs`]), which implements create, append,
//!   read, remove and free-space accounting on top of the other three
//!
//! The volume layout is fixed: block 0 holds the directory, block 1 holds the
//! allocation table, and every block from 2 upward is file data. Files are
//! linked lists of blocks threaded through the allocation table.

pub mod block_cache;
pub mod block_dev;
pub mod dentry;
pub mod error;
pub mod fat;
pub mod fs;

/// Block size in bytes.
pub const BLOCK_SZ: usize = 512;
/// A block-sized byte buffer.
pub type DataBlock = [u8; BLOCK_SZ];

pub use block_dev::BlockDevice;
pub use dentry::{DirEntry, Directory, DENTRY_SZ};
pub use error::{FsError, Result};
pub use fat::{AllocTable, FAT_ENTRIES, FAT_EOC, FAT_FREE};
pub use fs::{FlatFs, DATA_START, DIR_BLOCK, FAT_BLOCK};
