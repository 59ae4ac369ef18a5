use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::delay::{DelayStore, DEFAULT_DELAY};
use crate::document::DocumentStore;
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::isolation::ExceptionIsolatingStore;
use crate::memory::InMemoryStore;
use crate::traits::KeyValueStore;

/// Declarative description of a store chain, outermost tier first.
///
/// ```toml
/// cache = true
///
/// [document]
/// path = "settings.db"
/// collection = "settings"
///
/// [remote]
/// latency_ms = 50
/// never_suppress = ["decode_mismatch"]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Put an in-memory tier on top of the chain.
    pub cache: bool,
    /// Persistent document tier.
    pub document: Option<DocumentConfig>,
    /// Simulated remote tier at the bottom of the chain.
    pub remote: Option<RemoteConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cache: true,
            document: None,
            remote: None,
        }
    }
}

/// Settings for a document-backed tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Database file.
    pub path: PathBuf,
    /// Collection holding the entries.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Compact the database file on open.
    #[serde(default)]
    pub compact_on_open: bool,
}

fn default_collection() -> String {
    DocumentStore::DEFAULT_COLLECTION.to_string()
}

impl DocumentConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collection: default_collection(),
            compact_on_open: false,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

/// Settings for the simulated remote tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Latency added to every operation, in milliseconds.
    pub latency_ms: u64,
    /// Wrap the remote tier in an [`ExceptionIsolatingStore`].
    pub isolate: bool,
    /// Error kinds the isolation decorator lets through.
    pub never_suppress: Vec<ErrorKind>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            latency_ms: DEFAULT_DELAY.as_millis() as u64,
            isolate: true,
            never_suppress: Vec::new(),
        }
    }
}

impl RemoteConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl ChainConfig {
    /// A cache in front of a document database at `path`.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            cache: true,
            document: Some(DocumentConfig::new(path)),
            remote: None,
        }
    }

    pub fn from_toml_str(input: &str) -> StoreResult<Self> {
        toml::from_str(input).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Wire the chain bottom-up and return its outermost store.
    ///
    /// Order: `cache -> document -> [isolation ->] delay -> memory`. An
    /// empty configuration still yields a single in-memory store.
    pub fn build(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        let mut below: Option<Arc<dyn KeyValueStore>> = None;

        if let Some(remote) = &self.remote {
            let backend: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
            let delayed: Arc<dyn KeyValueStore> =
                Arc::new(DelayStore::new(backend).with_delay(remote.latency()));
            let remote_store: Arc<dyn KeyValueStore> = if remote.isolate {
                Arc::new(ExceptionIsolatingStore::with_blacklist(
                    delayed,
                    remote.never_suppress.iter().copied(),
                ))
            } else {
                delayed
            };
            below = Some(remote_store);
        }

        if let Some(document) = &self.document {
            let mut store = DocumentStore::open_with(document)?;
            if let Some(fallback) = below.take() {
                store = store.with_fallback(fallback);
            }
            below = Some(Arc::new(store));
        }

        let top: Arc<dyn KeyValueStore> = match below {
            Some(fallback) if self.cache => Arc::new(InMemoryStore::new().with_fallback(fallback)),
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };
        info!(
            chain = ?crate::traits::chain_names(top.as_ref()),
            "store chain built"
        );
        Ok(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{chain_names, StoreExt};

    #[test]
    fn defaults() {
        let config = ChainConfig::default();
        assert!(config.cache);
        assert!(config.document.is_none());
        let remote = RemoteConfig::default();
        assert_eq!(remote.latency(), Duration::from_millis(50));
        assert!(remote.isolate);
    }

    #[test]
    fn parses_full_toml() {
        let config = ChainConfig::from_toml_str(
            r#"
            cache = false

            [document]
            path = "settings.db"
            compact_on_open = true

            [remote]
            latency_ms = 5
            never_suppress = ["decode_mismatch", "timeout"]
            "#,
        )
        .unwrap();

        assert!(!config.cache);
        let document = config.document.unwrap();
        assert_eq!(document.path, PathBuf::from("settings.db"));
        assert_eq!(document.collection, "default");
        assert!(document.compact_on_open);
        let remote = config.remote.unwrap();
        assert_eq!(remote.latency_ms, 5);
        assert!(remote.isolate);
        assert_eq!(
            remote.never_suppress,
            vec![ErrorKind::DecodeMismatch, ErrorKind::Timeout]
        );
    }

    #[test]
    fn empty_toml_is_the_default() {
        assert_eq!(ChainConfig::from_toml_str("").unwrap(), ChainConfig::default());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ChainConfig::from_toml_str("[remote]\nlatency_ms = \"slow\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn toml_round_trip() {
        let mut config = ChainConfig::persistent("a.db");
        config.remote = Some(RemoteConfig::default());
        let text = config.to_toml_string().unwrap();
        assert_eq!(ChainConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.toml");
        std::fs::write(&path, "cache = false").unwrap();
        assert!(!ChainConfig::load(&path).unwrap().cache);

        let err = ChainConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn build_wires_tiers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig {
            cache: true,
            document: Some(DocumentConfig::new(dir.path().join("chain.db"))),
            remote: Some(RemoteConfig {
                latency_ms: 1,
                ..RemoteConfig::default()
            }),
        };
        let store = config.build().unwrap();
        assert_eq!(
            chain_names(store.as_ref()),
            vec!["memory", "document", "isolating", "delay", "memory"]
        );
    }

    #[test]
    fn build_without_isolation_or_cache() {
        let config = ChainConfig {
            cache: false,
            document: None,
            remote: Some(RemoteConfig {
                latency_ms: 1,
                isolate: false,
                never_suppress: Vec::new(),
            }),
        };
        let store = config.build().unwrap();
        assert_eq!(chain_names(store.as_ref()), vec!["delay", "memory"]);

        let bare = ChainConfig {
            cache: false,
            ..ChainConfig::default()
        };
        assert_eq!(chain_names(bare.build().unwrap().as_ref()), vec!["memory"]);
    }

    #[tokio::test]
    async fn built_chain_persists_through_document_tier() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig::persistent(dir.path().join("p.db"));
        {
            let store = config.build().unwrap();
            store.set("theme", "dark").await.unwrap();
        }
        let store = config.build().unwrap();
        assert_eq!(store.get("theme", String::new()).await.unwrap(), "dark");
    }
}
