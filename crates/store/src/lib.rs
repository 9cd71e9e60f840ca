//! Thread, checkpoint and knowledge-base stores for finassist.

pub mod file_backend;
pub mod in_memory;
pub mod knowledge;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use knowledge::KeywordRetriever;

use std::sync::Arc;

use finassist_config::StoreConfig;
use finassist_core::error::StoreError;
use finassist_core::store::{CheckpointStore, ThreadStore};

/// Thread registry and checkpoint store, usually backed by the same object.
#[derive(Clone)]
pub struct Stores {
    pub threads: Arc<dyn ThreadStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

impl Stores {
    /// Both roles served by one backend.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ThreadStore + CheckpointStore + 'static,
    {
        Self {
            threads: store.clone(),
            checkpoints: store,
        }
    }
}

/// Open the backend named in the configuration.
pub fn from_config(config: &StoreConfig) -> Result<Stores, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Stores::shared(Arc::new(InMemoryStore::new()))),
        "file" => Ok(Stores::shared(Arc::new(FileStore::open(config.resolved_path())?))),
        other => Err(StoreError::Storage(format!(
            "Unknown store backend '{other}' (expected 'memory' or 'file')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_rejected() {
        let config = StoreConfig {
            backend: "postgres".into(),
            path: None,
        };
        assert!(from_config(&config).is_err());
    }

    #[tokio::test]
    async fn memory_backend_shares_state() {
        let config = StoreConfig {
            backend: "memory".into(),
            path: None,
        };
        let stores = from_config(&config).unwrap();
        stores.threads.insert_thread("u1", "t1").await.unwrap();
        assert!(stores.threads.confirm_thread_exists("u1", "t1").await.unwrap());
        assert!(stores.checkpoints.load("u1", "t1").await.unwrap().is_none());
    }
}
