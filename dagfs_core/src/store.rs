//! The content store interface and an in-memory implementation.

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Key-value storage of opaque bytes addressed by digest.
///
/// Implementations must satisfy:
/// - The value stored under a digest never changes.
/// - `put` is idempotent: writing the same digest twice is a no-op.
/// - `get` has no side effects and fails with [`Error::ObjectNotFound`]
///   when the digest is absent.
pub trait ContentStore: Send + Sync {
    /// Store bytes under a digest.
    fn put(&self, hash: &Hash, bytes: &[u8]) -> Result<()>;

    /// Retrieve the bytes stored under a digest.
    fn get(&self, hash: &Hash) -> Result<Vec<u8>>;

    /// Check whether a digest is present.
    fn contains(&self, hash: &Hash) -> Result<bool>;
}

impl<S: ContentStore + ?Sized> ContentStore for &S {
    fn put(&self, hash: &Hash, bytes: &[u8]) -> Result<()> {
        (**self).put(hash, bytes)
    }

    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        (**self).get(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        (**self).contains(hash)
    }
}

/// In-memory store backed by a `RwLock<HashMap>`.
///
/// Intended for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Hash, Vec<u8>>>,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.read_map().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.read_map()
            .map(|m| m.values().map(|v| v.len() as u64).sum())
            .unwrap_or(0)
    }

    /// Number of `put` calls that stored new bytes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// All stored digests, sorted.
    pub fn hashes(&self) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self
            .read_map()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        hashes.sort();
        hashes
    }

    fn read_map(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Hash, Vec<u8>>>> {
        self.objects
            .read()
            .map_err(|_| Error::store("memory store lock poisoned"))
    }
}

impl ContentStore for MemoryStore {
    fn put(&self, hash: &Hash, bytes: &[u8]) -> Result<()> {
        let mut map = self
            .objects
            .write()
            .map_err(|_| Error::store("memory store lock poisoned"))?;

        if !map.contains_key(hash) {
            trace!(%hash, size = bytes.len(), "storing object in memory");
            map.insert(*hash, bytes.to_vec());
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.read_map()?
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::object_not_found(hash.to_hex()))
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        Ok(self.read_map()?.contains_key(hash))
    }
}
