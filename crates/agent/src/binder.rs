//! Dynamic tool binding: which tools the model is *offered* this iteration.
//!
//! Binding never limits what is executable: the engine validates every call
//! against the full registry, so a withheld tool still runs if the model
//! names it.

use finassist_core::provider::ToolDefinition;
use finassist_core::state::ConversationState;
use finassist_core::tool::ToolRegistry;

/// Strategy for selecting the offered subset of a registry.
pub trait ToolBinder: Send + Sync {
    /// Names of the registered tools to offer for `state`.
    fn bind<'r>(&self, registry: &'r ToolRegistry, state: &ConversationState) -> Vec<&'r str>;

    /// Definitions of the bound tools, sorted by name.
    fn definitions(&self, registry: &ToolRegistry, state: &ConversationState) -> Vec<ToolDefinition> {
        let names = self.bind(registry, state);
        registry
            .definitions()
            .into_iter()
            .filter(|def| names.contains(&def.name.as_str()))
            .collect()
    }
}

/// Offers every registered tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticBinder;

impl ToolBinder for StaticBinder {
    fn bind<'r>(&self, registry: &'r ToolRegistry, _state: &ConversationState) -> Vec<&'r str> {
        registry.names()
    }
}

/// Withholds tools whose precondition does not hold for the user.
///
/// - `recommend_product` needs at least one product the user has access to.
/// - `upload_student_data` is pointless once loans are connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBinder;

impl ToolBinder for DefaultBinder {
    fn bind<'r>(&self, registry: &'r ToolRegistry, state: &ConversationState) -> Vec<&'r str> {
        let profile = &state.user_info;
        registry
            .names()
            .into_iter()
            .filter(|name| match *name {
                "recommend_product" => !profile.product_combination.is_empty(),
                "upload_student_data" => !profile.loans_connected,
                _ => true,
            })
            .collect()
    }
}
