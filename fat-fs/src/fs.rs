//! File system engine layer.
//!
//! [`FlatFs`] owns the allocation table, the directory and the block cache
//! for one volume and coordinates them against the block device. Every
//! mutating operation validates first, then updates the in-memory
//! structures, persists the ones it changed to their reserved blocks and
//! flushes the cache before returning, so the device is current after each
//! call.

use std::cmp::min;
use std::sync::Arc;

use log::debug;
use spin::Mutex;

use crate::{
    block_cache::{BlockCache, BlockCacheManager},
    block_dev::BlockDevice,
    dentry::{DirEntry, Directory},
    error::{FsError, Result},
    fat::{AllocTable, FAT_ENTRIES},
    BLOCK_SZ,
};

/// Block reserved for the directory.
pub const DIR_BLOCK: usize = 0;
/// Block reserved for the allocation table.
pub const FAT_BLOCK: usize = 1;
/// First block available for file data.
pub const DATA_START: usize = 2;

/// A mounted single-directory volume.
pub struct FlatFs {
    bdev: Arc<dyn BlockDevice>,
    fat: AllocTable,
    dir: Directory,
    cache: Mutex<BlockCacheManager>,
}

impl FlatFs {
    /// Format `bdev` fresh: zeroed blocks, empty directory, fully free
    /// table. Devices larger than the table can represent are clipped to
    /// [`FAT_ENTRIES`] blocks.
    pub fn format(bdev: Arc<dyn BlockDevice>) -> Self {
        let capacity = min(bdev.num_blocks(), FAT_ENTRIES);
        let fs = Self {
            bdev,
            fat: AllocTable::new(capacity),
            dir: Directory::new(),
            cache: Mutex::new(BlockCacheManager::new()),
        };
        for block_id in 0..capacity {
            fs.block_cache(block_id)
                .lock()
                .modify(|block| block.fill(0));
        }
        fs.persist_fat();
        fs.persist_dir();
        fs.sync();
        debug!("formatted volume: {} blocks of {} bytes", capacity, BLOCK_SZ);
        fs
    }

    /// Open an already formatted device, loading and validating both
    /// reserved blocks.
    pub fn open(bdev: Arc<dyn BlockDevice>) -> Result<Self> {
        let capacity = min(bdev.num_blocks(), FAT_ENTRIES);
        let cache = Mutex::new(BlockCacheManager::new());
        let fat = cache
            .lock()
            .get_block_cache(FAT_BLOCK, Arc::clone(&bdev))
            .lock()
            .read(|block| AllocTable::decode(block, capacity))?;
        let dir = cache
            .lock()
            .get_block_cache(DIR_BLOCK, Arc::clone(&bdev))
            .lock()
            .read(Directory::decode);
        for entry in dir.iter() {
            let start = entry.start_block() as usize;
            if start < DATA_START || start >= capacity {
                return Err(FsError::InvalidBlockReference(start as i64));
            }
        }
        debug!("opened volume: {} files, {} free blocks", dir.len(), fat.free_blocks());
        Ok(Self {
            bdev,
            fat,
            dir,
            cache,
        })
    }

    /// Create `filename` holding `data`, chaining as many blocks as the
    /// payload needs. Every file owns at least one block, even when empty.
    pub fn create(&mut self, filename: &str, data: &[u8]) -> Result<()> {
        let available = self.free_space();
        if data.len() > available {
            return Err(FsError::InsufficientSpace {
                needed: data.len(),
                available,
            });
        }
        if self.dir.find(filename).is_some() {
            return Err(FsError::AlreadyExists(filename.to_string()));
        }
        if self.dir.is_full() {
            return Err(FsError::DirectoryFull);
        }
        let needed = ((data.len() + BLOCK_SZ - 1) / BLOCK_SZ).max(1);
        let blocks = self.alloc_chain(needed)?;
        for (chunk, &block) in data.chunks(BLOCK_SZ).zip(blocks.iter()) {
            self.write_at_block(block, 0, chunk);
        }
        self.dir
            .add(DirEntry::new(filename, data.len() as u32, blocks[0] as u32));
        self.persist_fat();
        self.persist_dir();
        self.sync();
        debug!("created {}: {} bytes over {} blocks", filename, data.len(), needed);
        Ok(())
    }

    /// Append `data` to the end of `filename`, filling the slack in the tail
    /// block and extending the chain when it runs out.
    pub fn append(&mut self, filename: &str, data: &[u8]) -> Result<()> {
        let entry = self
            .dir
            .find(filename)
            .ok_or_else(|| FsError::NotFound(filename.to_string()))?;
        let size = entry.size() as usize;
        let start = entry.start_block() as usize;
        let (tail, held) = self.tail_block(start, size)?;

        let new_size = size + data.len();
        let needed = ((new_size + BLOCK_SZ - 1) / BLOCK_SZ).max(1);
        let extra = needed - held;
        if extra > self.fat.free_blocks() {
            return Err(FsError::InsufficientSpace {
                needed: data.len(),
                available: self.free_space(),
            });
        }

        let tail_offset = size - (held - 1) * BLOCK_SZ;
        let fill = min(BLOCK_SZ - tail_offset, data.len());
        if fill > 0 {
            self.write_at_block(tail, tail_offset, &data[..fill]);
        }
        if extra > 0 {
            let blocks = self.alloc_chain(extra)?;
            self.fat.link(tail, blocks[0]);
            for (chunk, &block) in data[fill..].chunks(BLOCK_SZ).zip(blocks.iter()) {
                self.write_at_block(block, 0, chunk);
            }
        }
        if let Some(entry) = self.dir.find_mut(filename) {
            entry.set_size(new_size as u32);
        }
        self.persist_fat();
        self.persist_dir();
        self.sync();
        debug!("appended {} bytes to {}", data.len(), filename);
        Ok(())
    }

    /// Read up to `limit` bytes of `filename` starting at `offset`;
    /// `limit = None` reads to the end of the file. Pure with respect to the
    /// volume.
    pub fn read(&self, filename: &str, offset: usize, limit: Option<usize>) -> Result<Vec<u8>> {
        let entry = self
            .dir
            .find(filename)
            .ok_or_else(|| FsError::NotFound(filename.to_string()))?;
        let size = entry.size() as usize;
        if offset >= size {
            return Err(FsError::InvalidOffset { offset, size });
        }
        let len = match limit {
            Some(limit) => min(limit, size - offset),
            None => size - offset,
        };
        let mut out = vec![0u8; len];
        let mut block = entry.start_block() as usize;
        for _ in 0..offset / BLOCK_SZ {
            block = self
                .fat
                .next_block(block)?
                .ok_or(FsError::InvalidBlockReference(block as i64))?;
        }
        let mut pos = offset % BLOCK_SZ;
        let mut copied = 0;
        while copied < len {
            let n = min(len - copied, BLOCK_SZ - pos);
            self.block_cache(block).lock().read(|buf| {
                out[copied..copied + n].copy_from_slice(&buf[pos..pos + n]);
            });
            copied += n;
            pos = 0;
            if copied < len {
                block = self
                    .fat
                    .next_block(block)?
                    .ok_or(FsError::InvalidBlockReference(block as i64))?;
            }
        }
        Ok(out)
    }

    /// Remove `filename`, returning its whole block chain to the free list.
    pub fn remove(&mut self, filename: &str) -> Result<()> {
        let entry = self
            .dir
            .remove(filename)
            .ok_or_else(|| FsError::NotFound(filename.to_string()))?;
        let freed = self.fat.free_chain_from(entry.start_block() as usize);
        self.persist_fat();
        self.persist_dir();
        self.sync();
        debug!("removed {}: {} blocks back on the free list", filename, freed);
        Ok(())
    }

    /// Total bytes held by free data blocks. Pure query.
    pub fn free_space(&self) -> usize {
        self.fat.free_blocks() * BLOCK_SZ
    }

    /// Names of every live file, in directory order.
    pub fn ls(&self) -> Vec<String> {
        self.dir.iter().map(|e| e.fullname()).collect()
    }

    /// Volume capacity in blocks, reserved blocks included.
    pub fn capacity(&self) -> usize {
        self.fat.capacity()
    }

    /// Flush every dirty cached block to the device.
    pub fn sync(&self) {
        self.cache.lock().sync_all();
    }

    fn block_cache(&self, block_id: usize) -> Arc<Mutex<BlockCache>> {
        self.cache
            .lock()
            .get_block_cache(block_id, Arc::clone(&self.bdev))
    }

    fn persist_fat(&self) {
        self.block_cache(FAT_BLOCK)
            .lock()
            .modify(|block| self.fat.encode(block));
    }

    fn persist_dir(&self) {
        self.block_cache(DIR_BLOCK)
            .lock()
            .modify(|block| self.dir.encode(block));
    }

    /// Allocate `count` blocks and link them into one chain ending in an
    /// end-of-chain marker. On exhaustion every block taken so far is
    /// released again, leaving the table as it was.
    fn alloc_chain(&mut self, count: usize) -> Result<Vec<usize>> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            match self.fat.find_free_block() {
                Some(block) => {
                    self.fat.take(block);
                    blocks.push(block);
                }
                None => {
                    for &block in &blocks {
                        self.fat.release(block);
                    }
                    return Err(FsError::NoFreeBlocks);
                }
            }
        }
        for pair in blocks.windows(2) {
            self.fat.link(pair[0], pair[1]);
        }
        Ok(blocks)
    }

    /// Overlay `data` into `block` starting at `offset` within the block.
    fn write_at_block(&self, block: usize, offset: usize, data: &[u8]) {
        self.block_cache(block).lock().modify(|buf| {
            buf[offset..offset + data.len()].copy_from_slice(data);
        });
    }

    /// Tail block of a `size`-byte file whose chain starts at `start`, plus
    /// the number of blocks the file occupies.
    fn tail_block(&self, start: usize, size: usize) -> Result<(usize, usize)> {
        let held = ((size + BLOCK_SZ - 1) / BLOCK_SZ).max(1);
        let mut tail = start;
        for _ in 1..held {
            tail = self
                .fat
                .next_block(tail)?
                .ok_or(FsError::InvalidBlockReference(tail as i64))?;
        }
        Ok((tail, held))
    }
}
