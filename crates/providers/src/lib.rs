//! LLM provider implementations for finassist.
//!
//! All providers implement the `finassist_core::Provider` trait.
//! [`router::build_from_config`] assembles the model set a turn uses.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
pub use router::{ModelSet, build_from_config};
