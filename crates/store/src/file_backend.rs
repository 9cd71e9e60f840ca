//! File-based store: thread registry as JSON lines, one JSON checkpoint per
//! user thread.
//!
//! Layout under the store directory:
//!
//! ```text
//! threads.jsonl                    one ThreadRecord per line
//! checkpoints/<user>/<thread>.json latest ConversationState of the thread
//! ```
//!
//! User and thread ids are percent-encoded into file names, so distinct ids
//! always map to distinct files.
//!
//! The thread registry is loaded into memory on open and flushed on every
//! mutation.

use async_trait::async_trait;
use chrono::Utc;
use finassist_core::error::StoreError;
use finassist_core::state::ConversationState;
use finassist_core::store::{CheckpointStore, ThreadRecord, ThreadStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const THREADS_FILE: &str = "threads.jsonl";
const CHECKPOINT_DIR: &str = "checkpoints";

/// A directory-backed thread and checkpoint store.
pub struct FileStore {
    dir: PathBuf,
    threads: Arc<RwLock<Vec<ThreadRecord>>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join(CHECKPOINT_DIR))
            .map_err(|e| StoreError::Storage(format!("Failed to create store directory: {e}")))?;

        let threads = load_threads(&dir.join(THREADS_FILE));
        debug!(path = %dir.display(), count = threads.len(), "File store opened");
        Ok(Self {
            dir,
            threads: Arc::new(RwLock::new(threads)),
        })
    }

    fn checkpoint_path(&self, user_id: &str, thread_id: &str) -> PathBuf {
        self.dir
            .join(CHECKPOINT_DIR)
            .join(file_stem(user_id))
            .join(format!("{}.json", file_stem(thread_id)))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let threads = self.threads.read().await;
        let mut content = String::new();
        for record in threads.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            content.push_str(&line);
            content.push('\n');
        }
        std::fs::write(self.dir.join(THREADS_FILE), content)
            .map_err(|e| StoreError::Storage(format!("Failed to write thread registry: {e}")))
    }
}

fn load_threads(path: &Path) -> Vec<ThreadRecord> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ThreadRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted thread record");
                None
            }
        })
        .collect()
}

/// Ids come from clients. Every byte outside `[A-Za-z0-9_-]` becomes `%XX`,
/// which keeps ids inside the directory and keeps the mapping injective.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl ThreadStore for FileStore {
    async fn insert_thread(&self, user_id: &str, thread_id: &str) -> Result<(), StoreError> {
        {
            let mut threads = self.threads.write().await;
            if threads.iter().any(|r| r.user_id == user_id && r.thread_id == thread_id) {
                return Ok(());
            }
            threads.push(ThreadRecord::new(user_id, thread_id));
        }
        self.flush().await
    }

    async fn confirm_thread_exists(&self, user_id: &str, thread_id: &str) -> Result<bool, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads.iter().any(|r| r.user_id == user_id && r.thread_id == thread_id))
    }

    async fn update_title(&self, user_id: &str, thread_id: &str, title: &str) -> Result<(), StoreError> {
        {
            let mut threads = self.threads.write().await;
            let record = threads
                .iter_mut()
                .find(|r| r.user_id == user_id && r.thread_id == thread_id)
                .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
            record.title = Some(title.to_string());
            record.updated_at = Utc::now();
        }
        self.flush().await
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadRecord>, StoreError> {
        let threads = self.threads.read().await;
        let mut records: Vec<ThreadRecord> =
            threads.iter().filter(|r| r.user_id == user_id).cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn delete_thread(&self, user_id: &str, thread_id: &str) -> Result<bool, StoreError> {
        let deleted = {
            let mut threads = self.threads.write().await;
            let before = threads.len();
            threads.retain(|r| !(r.user_id == user_id && r.thread_id == thread_id));
            threads.len() < before
        };
        if deleted {
            self.flush().await?;
            let path = self.checkpoint_path(user_id, thread_id);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| StoreError::Storage(format!("Failed to remove checkpoint: {e}")))?;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn load(&self, user_id: &str, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let path = self.checkpoint_path(user_id, thread_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Storage(format!("Failed to read checkpoint: {e}"))),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.checkpoint_path(&state.user_id, &state.thread_id);
        let tmp = path.with_extension("json.tmp");
        path.parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(&tmp, json))
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| StoreError::Storage(format!("Failed to write checkpoint: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finassist_core::artifact::{Artifact, ArtifactKind};
    use finassist_core::message::Message;
    use finassist_core::state::{StateUpdate, UserProfile};
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn threads_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.insert_thread("u1", "t1").await.unwrap();
        store.update_title("u1", "t1", "Repayment plans").await.unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.confirm_thread_exists("u1", "t1").await.unwrap());
        let threads = reopened.list_threads("u1").await.unwrap();
        assert_eq!(threads[0].title.as_deref(), Some("Repayment plans"));
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut state = ConversationState::new("t1", "u1", UserProfile::default());
        state.apply(
            StateUpdate::new()
                .with_message(Message::user("plot my loan"))
                .with_artifact(Artifact::new("call_1", ArtifactKind::MsdUpload, "Upload", "", serde_json::json!({})))
                .with_blocked_id("m0"),
        );
        store.save(&state).await.unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load("u1", "t1").await.unwrap(), Some(state));
        assert!(reopened.load("u1", "t2").await.unwrap().is_none());
        assert!(reopened.load("u2", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.insert_thread("u1", "t1").await.unwrap();
        store
            .save(&ConversationState::new("t1", "u1", UserProfile::default()))
            .await
            .unwrap();

        assert!(store.delete_thread("u1", "t1").await.unwrap());
        assert!(store.load("u1", "t1").await.unwrap().is_none());
        assert!(!store.confirm_thread_exists("u1", "t1").await.unwrap());
    }

    #[tokio::test]
    async fn hostile_thread_ids_stay_inside_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let state = ConversationState::new("../../etc/passwd", "u1", UserProfile::default());
        store.save(&state).await.unwrap();
        assert!(
            dir.path()
                .join(CHECKPOINT_DIR)
                .join("u1")
                .join("%2E%2E%2F%2E%2E%2Fetc%2Fpasswd.json")
                .exists()
        );
        assert_eq!(store.load("u1", "../../etc/passwd").await.unwrap(), Some(state));

        let user = ConversationState::new("t1", "../alice", UserProfile::default());
        store.save(&user).await.unwrap();
        assert!(dir.path().join(CHECKPOINT_DIR).join("%2E%2E%2Falice").join("t1.json").exists());
    }

    #[tokio::test]
    async fn similar_ids_get_separate_checkpoints() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut dotted = ConversationState::new("a.b", "u1", UserProfile::default());
        dotted.apply(StateUpdate::new().with_message(Message::user("dotted")));
        let mut underscored = ConversationState::new("a_b", "u1", UserProfile::default());
        underscored.apply(StateUpdate::new().with_message(Message::user("underscored")));
        let spaced = ConversationState::new("a b", "u1", UserProfile::default());
        store.save(&dotted).await.unwrap();
        store.save(&underscored).await.unwrap();
        store.save(&spaced).await.unwrap();

        assert_eq!(store.load("u1", "a.b").await.unwrap(), Some(dotted));
        assert_eq!(store.load("u1", "a_b").await.unwrap(), Some(underscored));
        assert_eq!(store.load("u1", "a b").await.unwrap(), Some(spaced));
        assert_ne!(file_stem("a.b"), file_stem("a_b"));
        assert_ne!(file_stem("a%2Eb"), file_stem("a.b"));
    }

    #[tokio::test]
    async fn corrupted_registry_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join(THREADS_FILE)).unwrap();
        writeln!(file, r#"{{"thread_id":"t1","user_id":"u1","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.list_threads("u1").await.unwrap().len(), 1);
    }
}
