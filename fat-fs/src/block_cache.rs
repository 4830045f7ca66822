//! Block cache layer.
//!
//! Keeps a small set of recently used blocks in memory so the engine does not
//! hit the device for every sub-block access. A [`BlockCache`] tracks one
//! block and a dirty bit; it writes itself back on [`BlockCache::sync`] or on
//! drop. The [`BlockCacheManager`] is owned by one file system instance, so
//! two volumes never share cache entries.

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use crate::{block_dev::BlockDevice, DataBlock, BLOCK_SZ};

const BLOCK_CACHE_SIZE: usize = 16;

/// One cached block.
pub struct BlockCache {
    cache: DataBlock,
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
    modified: bool,
}

impl BlockCache {
    /// Load block `block_id` from the device into a fresh cache entry.
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        let mut cache = [0u8; BLOCK_SZ];
        block_device.read_block(block_id, &mut cache);
        Self {
            cache,
            block_id,
            block_device,
            modified: false,
        }
    }

    /// Run `f` over the cached block contents.
    pub fn read<V>(&self, f: impl FnOnce(&DataBlock) -> V) -> V {
        f(&self.cache)
    }

    /// Run `f` over the cached block contents, marking the entry dirty.
    pub fn modify<V>(&mut self, f: impl FnOnce(&mut DataBlock) -> V) -> V {
        self.modified = true;
        f(&mut self.cache)
    }

    /// Write the block back to the device if it is dirty.
    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.block_device.write_block(self.block_id, &self.cache);
        }
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync();
    }
}

/// Fixed-size pool of cached blocks with FIFO replacement of unreferenced
/// entries.
pub struct BlockCacheManager {
    queue: VecDeque<(usize, Arc<Mutex<BlockCache>>)>,
}

impl BlockCacheManager {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Get the cache entry for `block_id`, loading it on a miss and evicting
    /// an unreferenced entry when the pool is full.
    pub fn get_block_cache(
        &mut self,
        block_id: usize,
        block_device: Arc<dyn BlockDevice>,
    ) -> Arc<Mutex<BlockCache>> {
        if let Some((_, cache)) = self.queue.iter().find(|(id, _)| *id == block_id) {
            return Arc::clone(cache);
        }
        if self.queue.len() == BLOCK_CACHE_SIZE {
            if let Some(idx) = self
                .queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1)
            {
                self.queue.remove(idx);
            } else {
                panic!("run out of block cache entries");
            }
        }
        let cache = Arc::new(Mutex::new(BlockCache::new(block_id, block_device)));
        self.queue.push_back((block_id, Arc::clone(&cache)));
        cache
    }

    /// Write every dirty cached block back to the device.
    pub fn sync_all(&self) {
        for (_, cache) in self.queue.iter() {
            cache.lock().sync();
        }
    }
}

impl Default for BlockCacheManager {
    fn default() -> Self {
        Self::new()
    }
}
