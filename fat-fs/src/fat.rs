//! Disk layout layer: the allocation table.
//!
//! One signed 32-bit entry per representable block, stored back-to-back in
//! the reserved table block in index order, little endian. `-1` marks a free
//! block, `-2` an occupied block that ends its chain, and any value `>= 2`
//! points at the next block of the same file. Blocks 0 and 1 are reserved
//! for the directory and the table itself and are never handed out.

use crate::{
    error::{FsError, Result},
    DataBlock, BLOCK_SZ,
};

/// Number of block slots the table block can represent.
pub const FAT_ENTRIES: usize = BLOCK_SZ / 4;
/// Entry marker: the block is free.
pub const FAT_FREE: i32 = -1;
/// Entry marker: the block is occupied and ends its chain.
pub const FAT_EOC: i32 = -2;

/// The in-memory allocation table, mirrored to its reserved block by the
/// engine after every mutation.
pub struct AllocTable {
    entries: [i32; FAT_ENTRIES],
    capacity: usize,
}

impl AllocTable {
    /// Fresh table: reserved and unrepresentable slots pinned, every data
    /// block free.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 2 && capacity <= FAT_ENTRIES,
            "unsupported device capacity: {} blocks",
            capacity
        );
        let mut entries = [FAT_EOC; FAT_ENTRIES];
        for entry in entries[2..capacity].iter_mut() {
            *entry = FAT_FREE;
        }
        Self { entries, capacity }
    }

    /// Load the table from its reserved block, validating every data-range
    /// entry.
    pub fn decode(block: &DataBlock, capacity: usize) -> Result<Self> {
        assert!(
            capacity > 2 && capacity <= FAT_ENTRIES,
            "unsupported device capacity: {} blocks",
            capacity
        );
        let mut entries = [FAT_EOC; FAT_ENTRIES];
        for (entry, raw) in entries.iter_mut().zip(block.chunks_exact(4)) {
            *entry = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        }
        for &entry in entries[2..capacity].iter() {
            let points_inside = entry >= 2 && (entry as usize) < capacity;
            if entry != FAT_FREE && entry != FAT_EOC && !points_inside {
                return Err(FsError::InvalidBlockReference(entry as i64));
            }
        }
        Ok(Self { entries, capacity })
    }

    /// Serialize the table into its reserved block, overwriting it fully.
    pub fn encode(&self, block: &mut DataBlock) {
        for (raw, entry) in block.chunks_exact_mut(4).zip(self.entries.iter()) {
            raw.copy_from_slice(&entry.to_le_bytes());
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lowest free data block, if any.
    pub fn find_free_block(&self) -> Option<usize> {
        (2..self.capacity).find(|&i| self.entries[i] == FAT_FREE)
    }

    /// Mark `block` occupied as the end of its chain.
    pub fn take(&mut self, block: usize) {
        self.entries[block] = FAT_EOC;
    }

    /// Point `block` at `next` within the same chain.
    pub fn link(&mut self, block: usize, next: usize) {
        self.entries[block] = next as i32;
    }

    /// Return `block` to the free list.
    pub fn release(&mut self, block: usize) {
        self.entries[block] = FAT_FREE;
    }

    /// Successor of `block` in its chain, `None` at end-of-chain.
    pub fn next_block(&self, block: usize) -> Result<Option<usize>> {
        debug_assert!(block >= 2 && block < self.capacity);
        match self.entries[block] {
            FAT_EOC => Ok(None),
            next if next >= 2 && (next as usize) < self.capacity => Ok(Some(next as usize)),
            bad => Err(FsError::InvalidBlockReference(bad as i64)),
        }
    }

    /// Walk the chain starting at `start`, releasing every visited block.
    ///
    /// The walk stops as soon as the pointer read leaves the valid data
    /// range, so an end-of-chain marker, an already-free entry or a corrupt
    /// cyclic chain all terminate it. Returns how many blocks were released.
    pub fn free_chain_from(&mut self, start: usize) -> usize {
        let mut freed = 0;
        let mut cur = start as i32;
        while cur >= 2 && (cur as usize) < self.capacity {
            let next = self.entries[cur as usize];
            if next == FAT_FREE {
                break;
            }
            self.entries[cur as usize] = FAT_FREE;
            freed += 1;
            cur = next;
        }
        freed
    }

    /// Number of free data blocks.
    pub fn free_blocks(&self) -> usize {
        self.entries[2..self.capacity]
            .iter()
            .filter(|&&entry| entry == FAT_FREE)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_frees_only_data_blocks() {
        let fat = AllocTable::new(16);
        assert_eq!(fat.free_blocks(), 14);
        assert_eq!(fat.find_free_block(), Some(2));
    }

    #[test]
    fn lowest_free_block_wins() {
        let mut fat = AllocTable::new(16);
        fat.take(2);
        fat.take(3);
        assert_eq!(fat.find_free_block(), Some(4));
        fat.release(2);
        assert_eq!(fat.find_free_block(), Some(2));
    }

    #[test]
    fn chain_walk_and_release() {
        let mut fat = AllocTable::new(16);
        fat.link(2, 5);
        fat.link(5, 3);
        fat.take(3);
        assert_eq!(fat.next_block(2).unwrap(), Some(5));
        assert_eq!(fat.next_block(5).unwrap(), Some(3));
        assert_eq!(fat.next_block(3).unwrap(), None);
        assert_eq!(fat.free_chain_from(2), 3);
        assert_eq!(fat.free_blocks(), 14);
    }

    #[test]
    fn cyclic_chain_cannot_loop_forever() {
        let mut fat = AllocTable::new(16);
        fat.link(2, 3);
        fat.link(3, 2);
        // the second visit reads a freed entry and stops
        assert_eq!(fat.free_chain_from(2), 2);
    }

    #[test]
    fn decode_round_trip() {
        let mut fat = AllocTable::new(32);
        fat.link(2, 7);
        fat.take(7);
        let mut block = [0u8; BLOCK_SZ];
        fat.encode(&mut block);
        let reloaded = AllocTable::decode(&block, 32).unwrap();
        assert_eq!(reloaded.next_block(2).unwrap(), Some(7));
        assert_eq!(reloaded.next_block(7).unwrap(), None);
        assert_eq!(reloaded.free_blocks(), fat.free_blocks());
    }

    #[test]
    fn decode_rejects_pointer_into_reserved_range() {
        let mut fat = AllocTable::new(16);
        fat.link(2, 5);
        fat.take(5);
        let mut block = [0u8; BLOCK_SZ];
        fat.encode(&mut block);
        // entry 2 now points at reserved block 1
        block[8..12].copy_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            AllocTable::decode(&block, 16),
            Err(FsError::InvalidBlockReference(1))
        ));
    }
}
