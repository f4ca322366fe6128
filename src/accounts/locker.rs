//! Hash-sharded per-address locks.
//!
//! A fixed array of async mutexes; a key always maps to the same shard, so two
//! operations on one address are serialized. Unrelated addresses that collide
//! on a shard only wait on each other.

use tokio::sync::{Mutex, MutexGuard};

use crate::config::schema::DEFAULT_LOCK_SHARDS;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug)]
pub struct ShardedLocker {
    shards: Vec<Mutex<()>>,
}

impl ShardedLocker {
    /// `shards` is clamped to at least one.
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_index(&self, key: &str) -> usize {
        fnv1a32(key.as_bytes()) as usize % self.shards.len()
    }

    /// Wait for the shard owning `key`. Dropping the guard releases it.
    /// Not reentrant: locking the same key twice from one task deadlocks.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let index = self.shard_index(key);
        tracing::trace!(key = %key, shard = index, "Acquiring account lock");
        self.shards[index].lock().await
    }
}

impl Default for ShardedLocker {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_SHARDS)
    }
}
