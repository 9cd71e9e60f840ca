//! `finassist check`: run the deterministic pre-filter on one message.

use std::path::Path;

use finassist_guardrails::prefilter;

/// Prints the verdict and returns whether the text was blocked.
pub fn run(config_path: Option<&Path>, text: &str) -> anyhow::Result<bool> {
    let config = super::load_config(config_path)?;
    let verdict = prefilter(text, config.guardrail.max_input_chars);
    let blocked = verdict.is_blocked();
    let result = verdict.into_result();

    if blocked {
        println!("BLOCKED  {}", result.reasoning);
    } else {
        println!("ALLOWED  {}", result.reasoning);
        println!("         (the model-based check still runs during chat)");
    }
    Ok(blocked)
}
