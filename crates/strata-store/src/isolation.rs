//! Exception-isolation decorator.
//!
//! [`ExceptionIsolatingStore`] wraps any store and converts its failures
//! into safe defaults, so a chain keeps answering when an inner tier (for
//! example a remote one) is down. Error kinds on the never-suppress list are
//! passed through untouched.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::traits::{DecodeCheck, KeyValueStore};

/// Callback invoked with every error the decorator suppresses.
pub type ErrorCallback = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// Decorator that turns inner-store failures into default results.
///
/// Safe defaults per operation: the caller's default for reads,
/// `None` for `set_value` and `get_all_keys`, `false` for `remove` and
/// `contains_key`, and a no-op for `remove_all`.
pub struct ExceptionIsolatingStore {
    target: Arc<dyn KeyValueStore>,
    never_suppress: RwLock<HashSet<ErrorKind>>,
    on_error: RwLock<Option<ErrorCallback>>,
}

impl ExceptionIsolatingStore {
    /// Wrap `target`, suppressing every error kind.
    pub fn new(target: Arc<dyn KeyValueStore>) -> Self {
        Self::with_blacklist(target, HashSet::new())
    }

    /// Wrap `target`, letting the given error kinds propagate.
    pub fn with_blacklist(
        target: Arc<dyn KeyValueStore>,
        never_suppress: impl IntoIterator<Item = ErrorKind>,
    ) -> Self {
        Self {
            target,
            never_suppress: RwLock::new(never_suppress.into_iter().collect()),
            on_error: RwLock::new(None),
        }
    }

    /// Builder form of [`set_on_error`](Self::set_on_error).
    pub fn on_error(self, callback: impl Fn(&StoreError) + Send + Sync + 'static) -> Self {
        self.set_on_error(callback);
        self
    }

    /// Register the callback for suppressed errors, replacing any previous one.
    pub fn set_on_error(&self, callback: impl Fn(&StoreError) + Send + Sync + 'static) {
        *self.on_error.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Remove the error callback.
    pub fn clear_on_error(&self) {
        *self.on_error.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Stop suppressing `kind`; matching errors propagate from now on.
    pub fn never_suppress(&self, kind: ErrorKind) {
        self.never_suppress
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
    }

    /// Suppress `kind` again. Returns `true` if it was on the list.
    pub fn allow_suppress(&self, kind: ErrorKind) -> bool {
        self.never_suppress
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
    }

    /// Whether errors of `kind` propagate.
    pub fn is_blacklisted(&self, kind: ErrorKind) -> bool {
        self.never_suppress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    /// The wrapped store.
    pub fn target(&self) -> &Arc<dyn KeyValueStore> {
        &self.target
    }

    fn recover<R>(
        &self,
        op: &'static str,
        result: StoreResult<R>,
        default: impl FnOnce() -> R,
    ) -> StoreResult<R> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let kind = err.kind();
        if self.is_blacklisted(kind) {
            return Err(err);
        }

        warn!(op, %kind, error = %err, store = self.target.name(), "suppressed store error");
        let callback = self
            .on_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(&err);
        }
        Ok(default())
    }
}

impl std::fmt::Debug for ExceptionIsolatingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let never_suppress = self
            .never_suppress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        f.debug_struct("ExceptionIsolatingStore")
            .field("target", &self.target.name())
            .field("never_suppress", &never_suppress)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for ExceptionIsolatingStore {
    fn name(&self) -> &'static str {
        "isolating"
    }

    fn fallback_store(&self) -> Option<Arc<dyn KeyValueStore>> {
        Some(Arc::clone(&self.target))
    }

    async fn get_checked(
        &self,
        key: &str,
        default: Value,
        check: &DecodeCheck<'_>,
    ) -> StoreResult<Value> {
        let result = self.target.get_checked(key, default.clone(), check).await;
        self.recover("get", result, || default)
    }

    async fn set_value(&self, key: &str, value: Value) -> StoreResult<Option<Value>> {
        let result = self.target.set_value(key, value).await;
        self.recover("set", result, || None)
    }

    async fn remove(&self, key: &str) -> StoreResult<bool> {
        let result = self.target.remove(key).await;
        self.recover("remove", result, || false)
    }

    async fn remove_all(&self) -> StoreResult<()> {
        let result = self.target.remove_all().await;
        self.recover("remove_all", result, || ())
    }

    async fn contains_key(&self, key: &str) -> StoreResult<bool> {
        let result = self.target.contains_key(key).await;
        self.recover("contains_key", result, || false)
    }

    async fn get_all_keys(&self) -> StoreResult<Option<Vec<String>>> {
        let result = self.target.get_all_keys().await;
        self.recover("get_all_keys", result, || None)
    }
}
