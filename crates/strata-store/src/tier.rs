//! Fallback composition shared by every store that owns local data.
//!
//! A [`Tier`] is the synchronous local storage of one store. [`TierStore`]
//! turns a tier into a [`KeyValueStore`] and links it to an optional
//! fallback store: reads miss through to the fallback and cache-fill on the
//! way back, writes land locally first and then cascade downward.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::traits::{DecodeCheck, KeyValueStore};

/// Local, synchronous storage of a single tier.
///
/// A tier knows nothing about fallbacks. It must never suspend, so that a
/// write is visible locally before any downstream work starts.
pub trait Tier: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &'static str;

    /// Read a value. `Ok(None)` if absent.
    fn read(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Insert or replace a value, returning the replaced one.
    fn write(&self, key: &str, value: Value) -> StoreResult<Option<Value>>;

    /// Delete a value. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Delete everything.
    fn clear(&self) -> StoreResult<()>;

    /// All keys held by this tier.
    fn keys(&self) -> StoreResult<Vec<String>>;

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read(key)?.is_some())
    }
}

/// A [`Tier`] with an optional fallback store behind it.
pub struct TierStore<T> {
    tier: T,
    fallback: Option<Arc<dyn KeyValueStore>>,
}

impl<T: Tier> TierStore<T> {
    /// Wrap a tier with no fallback.
    pub fn from_tier(tier: T) -> Self {
        Self {
            tier,
            fallback: None,
        }
    }

    /// Attach the next tier of the chain, replacing any previous one.
    pub fn with_fallback(mut self, fallback: Arc<dyn KeyValueStore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// The local tier.
    pub fn tier(&self) -> &T {
        &self.tier
    }

    /// The attached fallback, if any.
    pub fn fallback(&self) -> Option<&Arc<dyn KeyValueStore>> {
        self.fallback.as_ref()
    }

    /// Write `value` locally now and return the downstream half of the write.
    ///
    /// When this returns, a local read of `key` already observes `value`.
    /// The returned [`Propagation`] performs the cascade into the fallback
    /// chain and resolves to the previous value. Dropping it without
    /// awaiting leaves the fallback tiers without the update.
    pub fn begin_set(&self, key: &str, value: Value) -> StoreResult<Propagation> {
        let local_previous = self.tier.write(key, value.clone())?;
        debug!(tier = self.tier.name(), key, "local write");

        let fallback = self.fallback.clone();
        let key = key.to_string();
        Ok(Propagation {
            future: Box::pin(async move {
                let Some(fallback) = fallback else {
                    return Ok(local_previous);
                };
                let fallback_previous = fallback.set_value(&key, value).await?;
                Ok(local_previous.or(fallback_previous))
            }),
        })
    }
}

impl<T: Tier> std::fmt::Debug for TierStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierStore")
            .field("tier", &self.tier.name())
            .field("fallback", &self.fallback.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// The downstream half of a [`TierStore::begin_set`].
///
/// Resolves to the value previously stored under the key: the local one if
/// there was any, otherwise whatever the fallback chain reported.
#[must_use = "dropping a Propagation skips the write to the fallback tiers"]
pub struct Propagation {
    future: Pin<Box<dyn Future<Output = StoreResult<Option<Value>>> + Send>>,
}

impl Future for Propagation {
    type Output = StoreResult<Option<Value>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagation").finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Tier> KeyValueStore for TierStore<T> {
    fn name(&self) -> &'static str {
        self.tier.name()
    }

    fn fallback_store(&self) -> Option<Arc<dyn KeyValueStore>> {
        self.fallback.clone()
    }

    async fn get_checked(
        &self,
        key: &str,
        default: Value,
        check: &DecodeCheck<'_>,
    ) -> StoreResult<Value> {
        if let Some(stored) = self.tier.read(key)? {
            check(key, &stored)?;
            return Ok(stored);
        }
        let Some(fallback) = &self.fallback else {
            return Ok(default);
        };

        let found = fallback.get_checked(key, default.clone(), check).await?;
        if found != default {
            // Cache-fill is best-effort.
            match self.tier.write(key, found.clone()) {
                Ok(_) => debug!(tier = self.tier.name(), key, "cache fill"),
                Err(e) => warn!(tier = self.tier.name(), key, error = %e, "cache fill failed"),
            }
        }
        Ok(found)
    }

    async fn set_value(&self, key: &str, value: Value) -> StoreResult<Option<Value>> {
        self.begin_set(key, value)?.await
    }

    async fn remove(&self, key: &str) -> StoreResult<bool> {
        let removed = self.tier.delete(key)?;
        debug!(tier = self.tier.name(), key, removed, "local remove");
        match &self.fallback {
            Some(fallback) => {
                let fallback_removed = fallback.remove(key).await?;
                Ok(removed && fallback_removed)
            }
            None => Ok(removed),
        }
    }

    async fn remove_all(&self) -> StoreResult<()> {
        self.tier.clear()?;
        debug!(tier = self.tier.name(), "local clear");
        if let Some(fallback) = &self.fallback {
            fallback.remove_all().await?;
        }
        Ok(())
    }

    async fn contains_key(&self, key: &str) -> StoreResult<bool> {
        if self.tier.contains(key)? {
            return Ok(true);
        }
        match &self.fallback {
            Some(fallback) => fallback.contains_key(key).await,
            None => Ok(false),
        }
    }

    async fn get_all_keys(&self) -> StoreResult<Option<Vec<String>>> {
        let mut keys = self.tier.keys()?;
        if let Some(fallback) = &self.fallback {
            if let Some(fallback_keys) = fallback.get_all_keys().await? {
                let local: HashSet<String> = keys.iter().cloned().collect();
                keys.extend(fallback_keys.into_iter().filter(|k| !local.contains(k)));
            }
        }
        Ok(Some(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::traits::{chain_names, StoreExt};
    use proptest::prelude::*;
    use serde_json::json;

    fn chain() -> (Arc<InMemoryStore>, InMemoryStore) {
        let backing = Arc::new(InMemoryStore::new());
        let front = InMemoryStore::new().with_fallback(backing.clone());
        (backing, front)
    }

    // -----------------------------------------------------------------------
    // Read-through
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn miss_reads_through_and_fills_cache() {
        let (backing, front) = chain();
        backing.set("k", "v").await.unwrap();
        assert!(!front.tier().contains("k").unwrap());

        assert_eq!(front.get("k", String::new()).await.unwrap(), "v");
        assert!(front.tier().contains("k").unwrap());
        assert_eq!(backing.get("k", String::new()).await.unwrap(), "v");
    }

    #[tokio::test]
    async fn default_equal_value_is_not_cached() {
        let (backing, front) = chain();
        backing.set("k", "d").await.unwrap();

        assert_eq!(front.get("k", "d".to_string()).await.unwrap(), "d");
        assert!(!front.tier().contains("k").unwrap());
        // Still reported present through the fallback.
        assert!(front.contains_key("k").await.unwrap());
    }

    #[tokio::test]
    async fn absent_everywhere_returns_default() {
        let (_backing, front) = chain();
        assert_eq!(front.get("k", 7i64).await.unwrap(), 7);
        assert!(!front.contains_key("k").await.unwrap());
    }

    #[tokio::test]
    async fn local_hit_shadows_fallback() {
        let (backing, front) = chain();
        backing.set("k", "below").await.unwrap();
        front.tier().write("k", json!("above")).unwrap();
        assert_eq!(front.get("k", String::new()).await.unwrap(), "above");
    }

    #[tokio::test]
    async fn decode_mismatch_from_fallback_propagates() {
        let (backing, front) = chain();
        backing.set("k", &1).await.unwrap();
        let err = front.get("k", String::from("d")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DecodeMismatch);
        assert!(!front.tier().contains("k").unwrap());
    }

    // -----------------------------------------------------------------------
    // Write cascade
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn set_cascades_to_fallback() {
        let (backing, front) = chain();
        assert!(front.set("k", "v1").await.unwrap().is_none());
        assert_eq!(backing.get("k", String::new()).await.unwrap(), "v1");

        let previous = front.set("k", "v2").await.unwrap();
        assert_eq!(previous, Some(json!("v1")));
        assert_eq!(backing.get("k", String::new()).await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn previous_value_comes_from_fallback_when_local_is_empty() {
        let (backing, front) = chain();
        backing.set("k", "old").await.unwrap();
        let previous = front.set("k", "new").await.unwrap();
        assert_eq!(previous, Some(json!("old")));
    }

    #[tokio::test]
    async fn begin_set_is_visible_before_propagation() {
        let (backing, front) = chain();
        let pending = front.begin_set("k", json!("v")).unwrap();
        assert_eq!(front.get("k", String::new()).await.unwrap(), "v");
        assert!(!backing.contains_key("k").await.unwrap());

        assert!(pending.await.unwrap().is_none());
        assert!(backing.contains_key("k").await.unwrap());
    }

    #[tokio::test]
    async fn dropped_propagation_never_reaches_fallback() {
        let (backing, front) = chain();
        drop(front.begin_set("k", json!(1)).unwrap());
        assert!(front.tier().contains("k").unwrap());
        assert!(!backing.contains_key("k").await.unwrap());
    }

    // -----------------------------------------------------------------------
    // Removal and enumeration
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn remove_requires_success_at_every_tier() {
        let (backing, front) = chain();
        front.set("both", &1).await.unwrap();
        assert!(front.remove("both").await.unwrap());

        backing.set("below", &1).await.unwrap();
        assert!(!front.remove("below").await.unwrap());
        assert!(!backing.contains_key("below").await.unwrap());

        assert!(!front.remove("nowhere").await.unwrap());
    }

    #[tokio::test]
    async fn remove_all_clears_the_chain() {
        let (backing, front) = chain();
        front.set("a", &1).await.unwrap();
        backing.set("b", &2).await.unwrap();
        front.remove_all().await.unwrap();
        assert_eq!(front.get_all_keys().await.unwrap(), Some(vec![]));
        assert!(backing.is_empty());
    }

    #[tokio::test]
    async fn all_keys_deduplicates() {
        let (backing, front) = chain();
        front.set("shared", &1).await.unwrap();
        backing.set("below", &2).await.unwrap();
        front.tier().write("above", json!(3)).unwrap();

        let keys = front.get_all_keys().await.unwrap().unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys.iter().filter(|k| *k == "shared").count(), 1);
        // Local keys come first.
        assert_eq!(&keys[..2], &["above".to_string(), "shared".to_string()]);
    }

    #[test]
    fn chain_names_walks_fallbacks() {
        let (_backing, front) = chain();
        assert_eq!(chain_names(&front), vec!["memory", "memory"]);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #[test]
        fn set_returns_previous_and_get_returns_latest(
            key in "[a-z]{1,8}",
            v1 in any::<i64>(),
            v2 in any::<i64>(),
        ) {
            block_on(async {
                let (_backing, front) = chain();
                prop_assert_eq!(front.set(&key, &v1).await.unwrap(), None);
                prop_assert_eq!(front.set(&key, &v2).await.unwrap(), Some(json!(v1)));
                prop_assert_eq!(front.get(&key, 0i64).await.unwrap(), v2);
                Ok::<(), TestCaseError>(())
            })?;
        }

        #[test]
        fn all_keys_is_the_union_without_duplicates(
            upper in proptest::collection::hash_set("[a-e]{1,2}", 0..8),
            lower in proptest::collection::hash_set("[a-e]{1,2}", 0..8),
        ) {
            block_on(async {
                let (backing, front) = chain();
                for key in &upper {
                    front.tier().write(key, json!(1)).unwrap();
                }
                for key in &lower {
                    backing.set(key, &2).await.unwrap();
                }

                let keys = front.get_all_keys().await.unwrap().unwrap();
                let unique: HashSet<&String> = keys.iter().collect();
                prop_assert_eq!(unique.len(), keys.len());
                let expected: HashSet<&String> = upper.iter().chain(lower.iter()).collect();
                prop_assert_eq!(unique, expected);
                Ok::<(), TestCaseError>(())
            })?;
        }

        #[test]
        fn fresh_keys_are_absent(key in "[a-z0-9]{1,12}", default in any::<i32>()) {
            block_on(async {
                let (_backing, front) = chain();
                prop_assert!(!front.contains_key(&key).await.unwrap());
                prop_assert_eq!(front.get(&key, default).await.unwrap(), default);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
