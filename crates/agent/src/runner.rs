//! Turn runner: thread bookkeeping, checkpoints and per-thread serialization
//! around [`TurnGraph`].

use std::collections::HashMap;
use std::sync::Arc;

use finassist_core::error::Error;
use finassist_core::event::{EventSink, TurnEvent};
use finassist_core::message::Message;
use finassist_core::state::{ConversationState, StateUpdate, UserProfile};
use finassist_core::store::{CheckpointStore, ThreadStore};
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::graph::TurnGraph;

/// Shown to the user when the reasoning model fails mid-turn.
pub const TURN_ERROR_MESSAGE: &str = "I'm sorry, there was an error processing your request. Please try again.";

const EVENT_BUFFER: usize = 64;

/// `(user_id, thread_id)`
type ThreadKey = (String, String);

pub struct TurnRunner {
    graph: Arc<TurnGraph>,
    threads: Arc<dyn ThreadStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    profile: UserProfile,
    locks: Mutex<HashMap<ThreadKey, Arc<Mutex<()>>>>,
}

impl TurnRunner {
    pub fn new(
        graph: Arc<TurnGraph>,
        threads: Arc<dyn ThreadStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            graph,
            threads,
            checkpoints,
            profile: UserProfile::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Profile given to threads created by this runner.
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Run one turn for `message` on the given thread and return the
    /// checkpointed state.
    ///
    /// Threads are scoped to their user: another user's thread with the same
    /// id is a different thread. Turns on the same thread run one at a time.
    /// A reasoning-model failure is reported as an apology message and an
    /// [`TurnEvent::Error`], not as an `Err`; only store failures are returned.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_id: &str,
        message: &str,
        events: &EventSink,
    ) -> Result<ConversationState, Error> {
        let key = (user_id.to_string(), thread_id.to_string());
        let lock = self.thread_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(thread_id, user_id, message, events).await
        };
        self.release_lock(&key, lock).await;
        result
    }

    async fn run_locked(
        &self,
        thread_id: &str,
        user_id: &str,
        message: &str,
        events: &EventSink,
    ) -> Result<ConversationState, Error> {
        if !self.threads.confirm_thread_exists(user_id, thread_id).await? {
            self.threads.insert_thread(user_id, thread_id).await?;
            info!(thread_id, user_id, "Created thread");
        }

        let mut state = match self.checkpoints.load(user_id, thread_id).await? {
            Some(state) => state,
            None => ConversationState::new(thread_id, user_id, self.profile.clone()),
        };
        state.apply(StateUpdate::new().with_message(Message::user(message)));

        info!(thread_id, messages = state.messages.len(), "Turn starting");

        if let Err(e) = self.graph.run(&mut state, events).await {
            error!(thread_id, error = %e, "Turn failed");
            state.apply(
                StateUpdate::new()
                    .with_message(Message::assistant(TURN_ERROR_MESSAGE))
                    .with_iterations(0),
            );
            events
                .emit(TurnEvent::Error {
                    message: TURN_ERROR_MESSAGE.to_string(),
                })
                .await;
        }

        self.checkpoints.save(&state).await?;

        events
            .emit(TurnEvent::StateSnapshot {
                state: Box::new(state.clone()),
            })
            .await;
        events
            .emit(TurnEvent::Done {
                thread_id: thread_id.to_string(),
            })
            .await;

        info!(thread_id, messages = state.messages.len(), "Turn complete");
        Ok(state)
    }

    /// Run a turn in the background and stream its events.
    ///
    /// A store failure ends the stream with an [`TurnEvent::Error`].
    pub fn stream_turn(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> ReceiverStream<TurnEvent> {
        let (events, rx) = EventSink::channel(EVENT_BUFFER);
        let runner = Arc::clone(self);
        let (thread_id, user_id, message) = (thread_id.into(), user_id.into(), message.into());

        tokio::spawn(async move {
            if let Err(e) = runner.run_turn(&thread_id, &user_id, &message, &events).await {
                error!(thread_id = %thread_id, error = %e, "Turn aborted");
                events.emit(TurnEvent::Error { message: e.to_string() }).await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn thread_lock(&self, key: &ThreadKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the thread's lock entry unless another turn is holding or
    /// waiting on it.
    async fn release_lock(&self, key: &ThreadKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // The map's copy plus ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, SequentialMockProvider, make_verdict};
    use finassist_core::message::Role;
    use finassist_core::provider::BoundModel;
    use finassist_core::tool::ToolRegistry;
    use finassist_providers::ModelSet;
    use finassist_store::InMemoryStore;
    use tokio_stream::StreamExt;

    fn runner(reasoning: Arc<dyn finassist_core::provider::Provider>, verdicts: usize) -> (TurnRunner, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let guardrail = Arc::new(SequentialMockProvider::new(
            (0..verdicts).map(|_| make_verdict(false, "on topic")).collect(),
        ));
        let models = ModelSet {
            reasoning: BoundModel::new(reasoning, "reasoning"),
            guardrail: BoundModel::new(guardrail, "guardrail"),
            safe_response: BoundModel::new(Arc::new(SequentialMockProvider::new(vec![])), "safe"),
            fast: BoundModel::new(Arc::new(SequentialMockProvider::new(vec![])), "fast"),
        };
        let graph = TurnGraph::new(&models, Arc::new(ToolRegistry::new()), store.clone());
        (TurnRunner::new(Arc::new(graph), store.clone(), store.clone()), store)
    }

    #[tokio::test]
    async fn creates_thread_and_checkpoints() {
        let (runner, store) = runner(Arc::new(SequentialMockProvider::single_text("Hello! Ask me about loans.")), 1);

        let state = runner.run_turn("t1", "u1", "hi", &EventSink::none()).await.unwrap();
        assert_eq!(state.messages.len(), 2);
        assert!(store.confirm_thread_exists("u1", "t1").await.unwrap());

        let saved = store.load("u1", "t1").await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 2);
        assert_eq!(saved.react_loop_iterations, 0);
    }

    #[tokio::test]
    async fn model_failure_becomes_apology() {
        let (runner, store) = runner(Arc::new(FailingProvider::network()), 1);
        let (events, mut rx) = EventSink::channel(32);

        let state = runner.run_turn("t1", "u1", "What is IDR?", &events).await.unwrap();
        drop(events);

        let last = state.messages.last().unwrap();
        assert_eq!(last.role(), Role::Assistant);
        assert_eq!(last.text(), TURN_ERROR_MESSAGE);
        assert_eq!(state.react_loop_iterations, 0);
        assert!(store.load("u1", "t1").await.unwrap().is_some());

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.event_type());
        }
        assert!(kinds.contains(&"error"));
        assert_eq!(kinds.last(), Some(&"done"));
    }

    #[tokio::test]
    async fn same_thread_id_is_separate_per_user() {
        let reasoning = Arc::new(SequentialMockProvider::new(vec![
            crate::test_helpers::make_text_response("Noted."),
            crate::test_helpers::make_text_response("Hi Bob."),
        ]));
        let (runner, store) = runner(reasoning, 2);

        runner.run_turn("t1", "alice", "my loan is 40k", &EventSink::none()).await.unwrap();
        let bob = runner.run_turn("t1", "bob", "hello", &EventSink::none()).await.unwrap();

        assert_eq!(bob.user_id, "bob");
        assert_eq!(bob.messages.len(), 2);
        assert!(bob.messages.iter().all(|m| !m.text().contains("40k")));
        assert_eq!(store.load("alice", "t1").await.unwrap().unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn thread_locks_are_released_after_turns() {
        let reasoning = Arc::new(SequentialMockProvider::new(vec![
            crate::test_helpers::make_text_response("One."),
            crate::test_helpers::make_text_response("Two."),
        ]));
        let (runner, _store) = runner(reasoning, 2);

        runner.run_turn("t1", "u1", "first", &EventSink::none()).await.unwrap();
        assert_eq!(runner.lock_count().await, 0);

        let runner = Arc::new(runner);
        let sink_a = EventSink::none();
        let sink_b = EventSink::none();
        let (a, b) = tokio::join!(
            runner.run_turn("t2", "u1", "second", &sink_a),
            runner.run_turn("t3", "u1", "third", &sink_b),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(runner.lock_count().await, 0);
    }

    #[tokio::test]
    async fn stream_ends_with_done() {
        let (runner, _store) = runner(Arc::new(SequentialMockProvider::single_text("Sure.")), 1);
        let runner = Arc::new(runner);

        let events: Vec<TurnEvent> = runner.stream_turn("t1", "u1", "hello").collect().await;
        assert!(matches!(events.last(), Some(TurnEvent::Done { thread_id }) if thread_id == "t1"));
        assert!(events.iter().any(|e| matches!(e, TurnEvent::TextDelta { .. })));
    }
}
