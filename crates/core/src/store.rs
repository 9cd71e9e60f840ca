//! Persistence traits for threads and per-thread conversation checkpoints.
//!
//! Threads are keyed by the pair `(user_id, thread_id)`; checkpoints by
//! `thread_id`. Implementations live in `finassist-store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::state::ConversationState;

/// Thread metadata row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadRecord {
    pub fn new(user_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Create the thread row. Inserting an existing thread is a no-op.
    async fn insert_thread(&self, user_id: &str, thread_id: &str) -> Result<(), StoreError>;

    /// Whether `thread_id` exists and belongs to `user_id`.
    async fn confirm_thread_exists(&self, user_id: &str, thread_id: &str) -> Result<bool, StoreError>;

    async fn update_title(&self, user_id: &str, thread_id: &str, title: &str) -> Result<(), StoreError>;

    /// The user's threads, most recently updated first.
    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadRecord>, StoreError>;

    /// Returns whether a thread was removed.
    async fn delete_thread(&self, user_id: &str, thread_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The latest state of the user's thread. Another user's thread with the
    /// same id is never returned.
    async fn load(&self, user_id: &str, thread_id: &str) -> Result<Option<ConversationState>, StoreError>;

    /// Stored under `(state.user_id, state.thread_id)`.
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}
