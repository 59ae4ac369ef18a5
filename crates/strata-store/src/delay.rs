//! Latency and fault injection for tests.
//!
//! [`DelayStore`] stands in for a networked tier: every operation waits for
//! a fixed delay before it reaches the wrapped store, and a runtime toggle
//! makes every operation fail with [`StoreError::Timeout`] instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{DecodeCheck, KeyValueStore};

/// Delay applied when none is configured.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// Decorator that delays, or fails, every operation on its target.
pub struct DelayStore {
    target: Arc<dyn KeyValueStore>,
    delay: Duration,
    fault: AtomicBool,
}

impl DelayStore {
    /// Wrap `target` with [`DEFAULT_DELAY`] and the fault toggle off.
    pub fn new(target: Arc<dyn KeyValueStore>) -> Self {
        Self {
            target,
            delay: DEFAULT_DELAY,
            fault: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Make every following operation time out (`true`) or behave (`false`).
    pub fn set_fault(&self, enabled: bool) {
        self.fault.store(enabled, Ordering::SeqCst);
        debug!(enabled, "fault injection toggled");
    }

    pub fn fault_enabled(&self) -> bool {
        self.fault.load(Ordering::SeqCst)
    }

    /// Fail fast when faulted, otherwise sleep for the configured delay.
    async fn gate(&self, op: &'static str) -> StoreResult<()> {
        if self.fault_enabled() {
            return Err(StoreError::Timeout {
                op,
                after: self.delay,
            });
        }
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

impl std::fmt::Debug for DelayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayStore")
            .field("target", &self.target.name())
            .field("delay", &self.delay)
            .field("fault", &self.fault_enabled())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for DelayStore {
    fn name(&self) -> &'static str {
        "delay"
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
        self.gate("get").await?;
        self.target.get_checked(key, default, check).await
    }

    async fn set_value(&self, key: &str, value: Value) -> StoreResult<Option<Value>> {
        self.gate("set").await?;
        self.target.set_value(key, value).await
    }

    async fn remove(&self, key: &str) -> StoreResult<bool> {
        self.gate("remove").await?;
        self.target.remove(key).await
    }

    async fn remove_all(&self) -> StoreResult<()> {
        self.gate("remove_all").await?;
        self.target.remove_all().await
    }

    async fn contains_key(&self, key: &str) -> StoreResult<bool> {
        self.gate("contains_key").await?;
        self.target.contains_key(key).await
    }

    async fn get_all_keys(&self) -> StoreResult<Option<Vec<String>>> {
        self.gate("get_all_keys").await?;
        self.target.get_all_keys().await
    }
}
