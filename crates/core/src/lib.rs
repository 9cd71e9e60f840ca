//! # finassist core
//!
//! Domain types, traits, and error definitions for the finassist
//! conversational agent. This crate has **zero framework dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the agent talks to (language models, tools, stores,
//! retrievers) is a trait here. Implementations live in their respective
//! crates, which keeps the dependency graph pointing inward and makes every
//! node of a turn testable with scripted stand-ins.

pub mod artifact;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod state;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use artifact::{Artifact, ArtifactKind, ChartData, DataLabels, RowData, merge_artifacts};
pub use error::{Error, Result};
pub use event::{EventSink, TurnEvent};
pub use message::{Content, Message, MessageToolCall, Role};
pub use provider::{BoundModel, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use retrieval::{Chunk, Retriever, format_chunks};
pub use state::{ConversationState, References, StateUpdate, UserProfile, ValidationResult, merge_messages};
pub use store::{CheckpointStore, ThreadRecord, ThreadStore};
pub use tool::{Tool, ToolCall, ToolContext, ToolOutput, ToolRegistry};
