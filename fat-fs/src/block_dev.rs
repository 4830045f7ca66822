//! Block device interface.
//!
//! Defines the read-write interface [`BlockDevice`] that a backing store has
//! to implement: fixed-size blocks addressed by index, plus the device's
//! capacity in blocks. Passing an out-of-range index is a precondition
//! violation on the caller's side; implementations are expected to assert.

use core::any::Any;

pub trait BlockDevice: Send + Sync + Any {
    /// Read block `block_id` into `buf`.
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// Write `buf` to block `block_id`.
    fn write_block(&self, block_id: usize, buf: &[u8]);
    /// Number of blocks the device holds.
    fn num_blocks(&self) -> usize;
}
