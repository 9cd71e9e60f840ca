//! Routing after the merge point.

use finassist_core::state::ValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SafeResponse,
    React,
}

/// Pure function of the gate's verdict. A missing verdict routes to the
/// safe response.
pub fn route(assessment: Option<&ValidationResult>) -> Route {
    match assessment {
        Some(result) if !result.blocked => Route::React,
        _ => Route::SafeResponse,
    }
}
