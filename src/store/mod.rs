//! Store Module
//!
//! The in-memory key-value map shared by every connection.
//!
//! ## Responsibilities
//! - Unconditional insert/overwrite, lookup and removal by key
//! - Internal synchronization: callers never take locks themselves
//! - Per-key sequential consistency: once `put` returns, every later `get`
//!   on any thread sees that value or a newer one
//!
//! ## Data Structure Choice
//! Keys are hashed onto a fixed set of shards, each a `HashMap` behind a
//! `parking_lot::RwLock`:
//! - Readers of the same shard proceed in parallel
//! - Writers only contend with traffic on their own shard
//! - A single shard degenerates to one reader/writer lock

mod memory;

pub use memory::MemoryStore;

use bytes::Bytes;

/// Operations the connection handler needs from a store
///
/// None of these can fail: running out of memory aborts the process.
pub trait Storage: Send + Sync {
    /// Insert or overwrite the value for `key`
    fn put(&self, key: Vec<u8>, value: Bytes);

    /// Snapshot of the current value, `None` if the key is absent
    fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Remove `key` if present. Returns whether anything was removed.
    fn delete(&self, key: &[u8]) -> bool;

    /// Number of live entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
