//! MemoryStore implementation
//!
//! Sharded HashMap store with one RwLock per shard.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use parking_lot::RwLock;

use super::Storage;

/// Shard count used by `MemoryStore::new`
const DEFAULT_SHARDS: usize = 16;

type Shard = RwLock<HashMap<Vec<u8>, Bytes>>;

/// In-memory store for cached values
pub struct MemoryStore {
    shards: Box<[Shard]>,

    /// `shards.len() - 1`; shard count is always a power of two
    mask: usize,
}

impl MemoryStore {
    /// Create an empty store with the default shard count
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an empty store with at least `count` shards
    ///
    /// The count is rounded up to the next power of two so a shard can be
    /// picked with a mask.
    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            mask: count - 1,
        }
    }

    /// Number of shards backing this store
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & self.mask]
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStore {
    fn put(&self, key: Vec<u8>, value: Bytes) {
        self.shard(&key).write().insert(key, value);
    }

    fn get(&self, key: &[u8]) -> Option<Bytes> {
        // Bytes clone is a refcount bump; the lock is released before return
        self.shard(key).read().get(key).cloned()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.shard(key).write().remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }
}
