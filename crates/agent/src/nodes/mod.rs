//! Graph nodes around the ReAct engine.
//!
//! Each node reads the state and returns a [`StateUpdate`] touching only its
//! own fields, so the concurrent entry nodes can be merged without locking.
//!
//! [`StateUpdate`]: finassist_core::state::StateUpdate

pub mod initialize;
pub mod retrieval;
pub mod router;
pub mod safe_response;

pub use initialize::Initialize;
pub use retrieval::EntryRetrieval;
pub use router::{Route, route};
pub use safe_response::SafeResponder;
