use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::value::ensure_shape;

/// Decode check run by the tier that holds a value, before the value leaves
/// that tier. Receives the key and the stored value.
pub type DecodeCheck<'a> = dyn Fn(&str, &Value) -> StoreResult<()> + Send + Sync + 'a;

/// Asynchronous key-value store contract shared by every tier and decorator.
///
/// Values cross the contract as JSON. Use [`StoreExt`] for typed access.
///
/// All implementations must satisfy these invariants:
/// - Absence is never an error: a missing key yields the caller's default,
///   `None` or `false`.
/// - `contains_key(k) == true` implies `get_value(k, d)` returns the stored
///   value rather than `d`.
/// - `get_all_keys` never lists a key twice.
/// - Errors from an inner tier are propagated. Only an isolation decorator
///   turns them into defaults.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short label for logs and chain diagnostics.
    fn name(&self) -> &'static str;

    /// The next store this one delegates to, if any.
    fn fallback_store(&self) -> Option<Arc<dyn KeyValueStore>> {
        None
    }

    /// Read `key`, returning `default` when it is absent everywhere.
    ///
    /// The tier holding the value runs `check` on it first and fails with
    /// its error, normally [`StoreError::DecodeMismatch`]. Decorators forward
    /// `check` unchanged so the failure surfaces below them.
    async fn get_checked(
        &self,
        key: &str,
        default: Value,
        check: &DecodeCheck<'_>,
    ) -> StoreResult<Value>;

    /// [`get_checked`](Self::get_checked) with a shape check: the stored
    /// value must have the JSON shape of `default`, unless `default` is null.
    async fn get_value(&self, key: &str, default: Value) -> StoreResult<Value> {
        let expected = default.clone();
        let check = move |key: &str, stored: &Value| ensure_shape(key, stored, &expected);
        self.get_checked(key, default, &check).await
    }

    /// Write `value` and return what was stored under `key` before.
    async fn set_value(&self, key: &str, value: Value) -> StoreResult<Option<Value>>;

    /// Delete `key`. Returns `true` only if it was found and deleted at
    /// every tier that was asked.
    async fn remove(&self, key: &str) -> StoreResult<bool>;

    /// Delete every entry.
    async fn remove_all(&self) -> StoreResult<()>;

    /// Whether `key` is present in this store or any store behind it.
    async fn contains_key(&self, key: &str) -> StoreResult<bool>;

    /// All keys, nearest tier first.
    ///
    /// `None` means the listing is unavailable (an isolated failure), which
    /// is different from an empty store.
    async fn get_all_keys(&self) -> StoreResult<Option<Vec<String>>>;
}

/// Typed convenience methods for every [`KeyValueStore`].
#[async_trait]
pub trait StoreExt: KeyValueStore {
    /// Read `key` as a `T`, returning `default` when it is absent.
    async fn get<T>(&self, key: &str, default: T) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned + Send;

    /// Serialize and write `value`, returning the previous raw value.
    async fn set<V>(&self, key: &str, value: &V) -> StoreResult<Option<Value>>
    where
        V: Serialize + Sync + ?Sized;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> StoreExt for S {
    async fn get<T>(&self, key: &str, default: T) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let encoded_default = encode(&default)?;
        let check = |key: &str, stored: &Value| {
            T::deserialize(stored)
                .map(drop)
                .map_err(|e| mismatch::<T>(key, e))
        };
        let value = self.get_checked(key, encoded_default.clone(), &check).await?;
        if value == encoded_default {
            return Ok(default);
        }
        serde_json::from_value(value).map_err(|e| mismatch::<T>(key, e))
    }

    async fn set<V>(&self, key: &str, value: &V) -> StoreResult<Option<Value>>
    where
        V: Serialize + Sync + ?Sized,
    {
        let encoded = encode(value)?;
        self.set_value(key, encoded).await
    }
}

fn mismatch<T>(key: &str, err: serde_json::Error) -> StoreError {
    StoreError::DecodeMismatch {
        key: key.to_string(),
        expected: type_name::<T>().to_string(),
        found: err.to_string(),
    }
}

fn encode<V: Serialize + ?Sized>(value: &V) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Names of every store in the chain starting at `store`, outermost first.
pub fn chain_names(store: &dyn KeyValueStore) -> Vec<&'static str> {
    let mut names = vec![store.name()];
    let mut next = store.fallback_store();
    while let Some(current) = next {
        names.push(current.name());
        next = current.fallback_store();
    }
    names
}
