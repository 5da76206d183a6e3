//! Striped read/write locks keyed by file path.
//!
//! A fixed table of locks guards an unbounded set of files: each path hashes
//! to one shard, and distinct files may share a shard. The table lives on the
//! store instance, so independent stores over one root (or two processes)
//! do not share locks and rely on the optimistic protocol instead.

use std::path::Path;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use xxhash_rust::xxh64::xxh64;

/// Default number of lock shards.
pub const DEFAULT_LOCK_SHARDS: usize = 32;

/// Fixed-size table of read/write locks selected by path hash.
#[derive(Debug)]
pub struct LockShards {
    shards: Box<[RwLock<()>]>,
}

impl LockShards {
    /// Create a table with `count` shards (at least one).
    pub fn new(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| RwLock::new(())).collect();
        Self { shards }
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shard index for `path`.
    pub fn shard_of(&self, path: &Path) -> usize {
        let key = xxh64(path.to_string_lossy().as_bytes(), 0);
        jump_hash(key, self.shards.len() as u32) as usize
    }

    pub fn read(&self, path: &Path) -> RwLockReadGuard<'_, ()> {
        self.shards[self.shard_of(path)].read()
    }

    pub fn write(&self, path: &Path) -> RwLockWriteGuard<'_, ()> {
        self.shards[self.shard_of(path)].write()
    }

    /// Write-lock two paths.
    ///
    /// Shards are always taken in index order. Locks are not reentrant, so
    /// when both paths land on the same shard it is taken once and the second
    /// guard is `None`.
    pub fn write_pair(
        &self,
        first: &Path,
        second: &Path,
    ) -> (RwLockWriteGuard<'_, ()>, Option<RwLockWriteGuard<'_, ()>>) {
        let a = self.shard_of(first);
        let b = self.shard_of(second);
        let (low, high) = (a.min(b), a.max(b));
        let low_guard = self.shards[low].write();
        let high_guard = (low != high).then(|| self.shards[high].write());
        (low_guard, high_guard)
    }
}

impl Default for LockShards {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_SHARDS)
    }
}

/// Jump consistent hash: map `key` to a bucket in `[0, buckets)`.
fn jump_hash(mut key: u64, buckets: u32) -> u32 {
    let buckets = i64::from(buckets.max(1));
    let mut b: i64 = -1;
    let mut j: i64 = 0;

    while j < buckets {
        b = j;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        j = ((b.wrapping_add(1) as f64) * ((1_i64 << 31) as f64 / ((key >> 33).wrapping_add(1) as f64))) as i64;
    }

    b as u32
}
