//! Chainable key-value stores.
//!
//! Every store implements [`KeyValueStore`]. Stores that own data
//! ([`InMemoryStore`], [`DocumentStore`]) can sit in front of a fallback
//! store: reads miss through to it and fill the local tier on the way back,
//! writes land locally first and then cascade down the chain. Decorators
//! ([`ExceptionIsolatingStore`], [`DelayStore`]) wrap any store and change
//! how failures and latency reach the caller.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_store::{DocumentStore, InMemoryStore, StoreExt};
//!
//! # async fn demo() -> strata_store::StoreResult<()> {
//! let store = InMemoryStore::new().with_fallback(Arc::new(DocumentStore::open("app.db")?));
//! store.set("theme", "dark").await?;
//! let theme: String = store.get("theme", String::from("light")).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delay;
pub mod document;
pub mod error;
pub mod isolation;
pub mod memory;
pub mod tier;
pub mod traits;
pub mod value;

#[cfg(test)]
mod conformance;

pub use config::{ChainConfig, DocumentConfig, RemoteConfig};
pub use delay::{DelayStore, DEFAULT_DELAY};
pub use document::{DocumentStore, DocumentTier};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use isolation::{ErrorCallback, ExceptionIsolatingStore};
pub use memory::{InMemoryStore, MemoryTier};
pub use tier::{Propagation, Tier, TierStore};
pub use traits::{chain_names, DecodeCheck, KeyValueStore, StoreExt};
pub use value::{Document, Shape, StoredValue, PRIMITIVE_FIELD};
