//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use finassist_core::error::StoreError;
use finassist_core::state::ConversationState;
use finassist_core::store::{CheckpointStore, ThreadRecord, ThreadStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type ThreadKey = (String, String);

/// Threads and checkpoints held in maps. Nothing survives the process.
pub struct InMemoryStore {
    threads: Arc<RwLock<HashMap<ThreadKey, ThreadRecord>>>,
    checkpoints: Arc<RwLock<HashMap<ThreadKey, ConversationState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
            checkpoints: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(user_id: &str, thread_id: &str) -> ThreadKey {
    (user_id.to_string(), thread_id.to_string())
}

#[async_trait]
impl ThreadStore for InMemoryStore {
    async fn insert_thread(&self, user_id: &str, thread_id: &str) -> Result<(), StoreError> {
        self.threads
            .write()
            .await
            .entry(key(user_id, thread_id))
            .or_insert_with(|| ThreadRecord::new(user_id, thread_id));
        Ok(())
    }

    async fn confirm_thread_exists(&self, user_id: &str, thread_id: &str) -> Result<bool, StoreError> {
        Ok(self.threads.read().await.contains_key(&key(user_id, thread_id)))
    }

    async fn update_title(&self, user_id: &str, thread_id: &str, title: &str) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let record = threads
            .get_mut(&key(user_id, thread_id))
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        record.title = Some(title.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadRecord>, StoreError> {
        let threads = self.threads.read().await;
        let mut records: Vec<ThreadRecord> = threads
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn delete_thread(&self, user_id: &str, thread_id: &str) -> Result<bool, StoreError> {
        let removed = self.threads.write().await.remove(&key(user_id, thread_id)).is_some();
        if removed {
            self.checkpoints.write().await.remove(&key(user_id, thread_id));
        }
        Ok(removed)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn load(&self, user_id: &str, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.checkpoints.read().await.get(&key(user_id, thread_id)).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.checkpoints
            .write()
            .await
            .insert(key(&state.user_id, &state.thread_id), state.clone());
        Ok(())
    }
}
