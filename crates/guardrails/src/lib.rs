//! Input guardrails for finassist.
//!
//! Every user message passes through two stages before the agent may act
//! on it: a deterministic [`prefilter`] and a model-based semantic check.
//! Any failure of the second stage blocks the message.

pub mod context;
pub mod gate;
pub mod prefilter;
pub mod prompts;
pub mod repair;

pub use context::extract_context;
pub use gate::{Gate, GateOutcome};
pub use prefilter::{PrefilterVerdict, prefilter};
pub use repair::{extract_json, parse_json};
