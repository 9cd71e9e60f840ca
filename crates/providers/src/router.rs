//! Model set builder: one provider, four model roles.
//!
//! Every role shares the same HTTP provider (wrapped with retries) and
//! differs only by model name.

use std::sync::Arc;
use std::time::Duration;
use finassist_core::provider::{BoundModel, Provider};
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryProvider;

/// The models a turn talks to.
#[derive(Debug, Clone)]
pub struct ModelSet {
    /// Drives the reason/act loop
    pub reasoning: BoundModel,
    /// Semantic input check
    pub guardrail: BoundModel,
    /// Refusals for blocked input
    pub safe_response: BoundModel,
    /// Entry retrieval decisions
    pub fast: BoundModel,
}

impl ModelSet {
    /// Use one provider for every role with the given model names.
    pub fn uniform(provider: Arc<dyn Provider>, model: &str) -> Self {
        let bound = BoundModel::new(provider, model);
        Self {
            reasoning: bound.clone(),
            guardrail: bound.clone(),
            safe_response: bound.clone(),
            fast: bound,
        }
    }
}

/// Build the provider and model set from configuration.
pub fn build_from_config(config: &finassist_config::AppConfig) -> ModelSet {
    let api_key = config.api_key.clone().unwrap_or_default();
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.default_provider));
    let timeout = Duration::from_secs(config.client.timeout_secs);

    let http: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::with_timeout(
        &config.default_provider,
        base_url,
        api_key,
        timeout,
    ));
    let provider: Arc<dyn Provider> = Arc::new(RetryProvider::new(
        http,
        config.client.max_retries,
        timeout,
    ));

    let models = &config.models;
    let bind = |model: &str| {
        BoundModel::new(provider.clone(), model)
            .with_temperature(models.temperature)
            .with_max_tokens(models.max_tokens)
    };

    ModelSet {
        reasoning: bind(&models.reasoning),
        guardrail: bind(&models.guardrail),
        safe_response: bind(&models.safe_response),
        fast: bind(&models.fast),
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
