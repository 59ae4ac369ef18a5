//! Redb-backed document tier.
//!
//! Each collection is one redb table keyed by the entry key. Rows hold the
//! JSON bytes of a [`StoredValue`] document, so scalars are persisted inside
//! the single-field envelope.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde_json::Value;
use tracing::info;

use crate::config::DocumentConfig;
use crate::error::{StoreError, StoreResult};
use crate::tier::{Tier, TierStore};
use crate::value::{Document, StoredValue};

type Table<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

/// Persistent tier backed by one table of a redb database.
///
/// Writes commit their own transaction, so a write is durable once it
/// returns. Handles to the same [`Database`] can be shared between tiers
/// using different collections.
pub struct DocumentTier {
    db: Arc<Database>,
    collection: String,
}

impl DocumentTier {
    pub fn new(db: Arc<Database>, collection: &str) -> StoreResult<Self> {
        if collection.is_empty() {
            return Err(StoreError::Config(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            db,
            collection: collection.to_string(),
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn table(&self) -> Table<'_> {
        TableDefinition::new(&self.collection)
    }

    /// Run `f` against the collection's table in a read transaction.
    /// A collection that was never written reads as empty.
    fn read_table<R>(
        &self,
        empty: R,
        f: impl FnOnce(&redb::ReadOnlyTable<&'static str, &'static [u8]>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let txn = self.db.begin_read().map_err(StoreError::database)?;
        match txn.open_table(self.table()) {
            Ok(table) => f(&table),
            Err(TableError::TableDoesNotExist(_)) => Ok(empty),
            Err(e) => Err(StoreError::database(e)),
        }
    }
}

fn decode(key: &str, bytes: &[u8]) -> StoreResult<Value> {
    let doc: Document = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Serialization(format!("entry {key}: {e}")))?;
    Ok(StoredValue::from_document(doc).into_value())
}

impl std::fmt::Debug for DocumentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentTier")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl Tier for DocumentTier {
    fn name(&self) -> &'static str {
        "document"
    }

    fn read(&self, key: &str) -> StoreResult<Option<Value>> {
        self.read_table(None, |table| {
            match table.get(key).map_err(StoreError::database)? {
                Some(guard) => decode(key, guard.value()).map(Some),
                None => Ok(None),
            }
        })
    }

    fn write(&self, key: &str, value: Value) -> StoreResult<Option<Value>> {
        let bytes = serde_json::to_vec(&StoredValue::from_value(value).into_document())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(StoreError::database)?;
        let previous = {
            let mut table = txn.open_table(self.table()).map_err(StoreError::database)?;
            let old = table
                .insert(key, bytes.as_slice())
                .map_err(StoreError::database)?;
            let previous = match old {
                Some(guard) => Some(decode(key, guard.value())?),
                None => None,
            };
            previous
        };
        txn.commit().map_err(StoreError::database)?;
        Ok(previous)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(StoreError::database)?;
        let removed = {
            let mut table = txn.open_table(self.table()).map_err(StoreError::database)?;
            let removed = table.remove(key).map_err(StoreError::database)?;
            removed.is_some()
        };
        txn.commit().map_err(StoreError::database)?;
        Ok(removed)
    }

    /// Drops the collection's table.
    fn clear(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(StoreError::database)?;
        txn.delete_table(self.table())
            .map_err(StoreError::database)?;
        txn.commit().map_err(StoreError::database)?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.read_table(Vec::new(), |table| {
            let mut keys = Vec::new();
            for item in table.iter().map_err(StoreError::database)? {
                let (key, _) = item.map_err(StoreError::database)?;
                keys.push(key.value().to_string());
            }
            Ok(keys)
        })
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        self.read_table(false, |table| {
            Ok(table.get(key).map_err(StoreError::database)?.is_some())
        })
    }
}

/// Store backed by a [`DocumentTier`].
pub type DocumentStore = TierStore<DocumentTier>;

impl TierStore<DocumentTier> {
    /// Collection used when none is configured.
    pub const DEFAULT_COLLECTION: &'static str = "default";

    /// Open the database file at `path` and use its default collection.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(&DocumentConfig::new(path.as_ref()))
    }

    /// Open a store as described by `config`, creating parent directories.
    pub fn open_with(config: &DocumentConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut db = Database::create(&config.path).map_err(StoreError::database)?;
        if config.compact_on_open {
            db.compact().map_err(StoreError::database)?;
        }
        info!(
            path = %config.path.display(),
            collection = %config.collection,
            "document store opened"
        );
        Self::with_database(Arc::new(db), &config.collection)
    }

    /// Use `collection` of an already open database.
    pub fn with_database(db: Arc<Database>, collection: &str) -> StoreResult<Self> {
        Ok(Self::from_tier(DocumentTier::new(db, collection)?))
    }
}
