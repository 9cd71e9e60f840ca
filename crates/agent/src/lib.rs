//! The conversational turn for finassist.
//!
//! A turn runs as a small graph:
//!
//! 1. **Initialize**, the **guardrail gate** and **entry retrieval** run
//!    concurrently over the same snapshot
//! 2. Their updates are merged and the **router** reads the gate's verdict
//! 3. Blocked input gets a **safe response**; allowed input enters the
//!    bounded **ReAct loop** (reason → act → reason …)
//!
//! [`TurnRunner`] wraps the graph with thread bookkeeping, checkpoints and
//! per-thread serialization.

pub mod binder;
pub mod graph;
pub mod nodes;
pub mod prompt;
pub mod react;
pub mod redaction;
pub mod runner;
pub mod test_helpers;

pub use binder::{DefaultBinder, StaticBinder, ToolBinder};
pub use graph::TurnGraph;
pub use nodes::{EntryRetrieval, Initialize, Route, SafeResponder, route};
pub use prompt::{PromptBuilder, StudentDebtPrompt};
pub use react::{DEFAULT_MAX_REACT_LOOPS, ReactEngine, Step};
pub use redaction::{REDACTION_NOTICE, redact};
pub use runner::{TURN_ERROR_MESSAGE, TurnRunner};
