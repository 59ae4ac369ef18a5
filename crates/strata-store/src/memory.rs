use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::tier::{Tier, TierStore};

/// In-memory, HashMap-based tier.
///
/// Entries live behind a `RwLock` for the lifetime of the tier and are
/// cloned on read and write.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryTier {
    /// Create an empty tier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_map(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Value>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_map(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Value>>> {
        self.entries
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Tier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.read_map()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: Value) -> StoreResult<Option<Value>> {
        Ok(self.write_map()?.insert(key.to_string(), value))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.write_map()?.remove(key).is_some())
    }

    fn clear(&self) -> StoreResult<()> {
        self.write_map()?.clear();
        Ok(())
    }

    /// Keys in sorted order.
    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.read_map()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read_map()?.contains_key(key))
    }
}

/// Store backed by a [`MemoryTier`]; the usual front cache of a chain.
pub type InMemoryStore = TierStore<MemoryTier>;

impl TierStore<MemoryTier> {
    /// Create an empty in-memory store without a fallback.
    pub fn new() -> Self {
        Self::from_tier(MemoryTier::new())
    }

    /// Number of entries held locally.
    pub fn len(&self) -> usize {
        self.tier().len()
    }

    /// Returns `true` if nothing is held locally.
    pub fn is_empty(&self) -> bool {
        self.tier().is_empty()
    }
}

impl Default for TierStore<MemoryTier> {
    fn default() -> Self {
        Self::new()
    }
}
