//! System prompts.
//!
//! The reasoning model's system prompt is built per iteration from state by
//! a [`PromptBuilder`]. The fixed prompts for the safe-response and
//! entry-retrieval models live here as well.

use chrono::{Local, NaiveDate};
use finassist_core::retrieval::format_chunks;
use finassist_core::state::{ConversationState, UserProfile};
use std::fmt::Write;

/// Builds the reasoning model's system prompt from the current state.
pub trait PromptBuilder: Send + Sync {
    fn build(&self, state: &ConversationState) -> String;
}

/// The student-debt assistant prompt.
#[derive(Debug, Clone, Default)]
pub struct StudentDebtPrompt {
    /// Fixed date for deterministic output. `None` means today.
    today: Option<NaiveDate>,
}

impl StudentDebtPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.today = Some(date);
        self
    }

    fn profile_section(profile: &UserProfile) -> String {
        let field = |value: Option<String>| value.unwrap_or_else(|| "unknown".to_string());
        let mut out = String::new();
        let _ = writeln!(out, "- Name: {}", field(profile.first_name.clone()));
        let _ = writeln!(out, "- Employer: {}", field(profile.organization_name.clone()));
        let _ = writeln!(out, "- Annual income: {}", field(profile.income.map(|i| format!("${i:.0}"))));
        let _ = writeln!(out, "- Marital status: {}", field(profile.marital_status.clone()));
        let _ = writeln!(out, "- Tax filing status: {}", field(profile.tax_status.clone()));
        let _ = writeln!(
            out,
            "- Employer PSLF eligible: {}",
            field(profile.organization_pslf_eligible.map(|b| if b { "yes" } else { "no" }.to_string()))
        );
        let _ = writeln!(out, "- Employment type: {}", field(profile.employment_type.clone()));
        let _ = writeln!(
            out,
            "- Loan data connected: {}",
            if profile.loans_connected { "yes" } else { "no" }
        );
        out
    }
}

impl PromptBuilder for StudentDebtPrompt {
    fn build(&self, state: &ConversationState) -> String {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let profile = &state.user_info;

        let mut prompt = format!(
            "You are a student loan assistant. You help users understand federal and private \
             student loan repayment, forgiveness programs such as PSLF, income-driven repayment, \
             consolidation and refinancing, and how their loans fit into their wider financial plan.\n\
             \n\
             Today's date is {}.\n\
             \n\
             # User profile\n\
             {}",
            today.format("%Y-%m-%d"),
            Self::profile_section(profile),
        );

        prompt.push_str("\n# Products available to this user\n");
        if profile.product_combination.is_empty() {
            prompt.push_str("None. Do not recommend products.\n");
        } else {
            for key in &profile.product_combination {
                let _ = writeln!(prompt, "- {key}");
            }
        }

        prompt.push_str(
            "\n# How to work\n\
             - Use the calculation tools for any numbers; never do loan math in your head.\n\
             - Call at most one tool at a time and wait for its result.\n\
             - When a tool result says `artifact_rendered: true`, the user already sees the \
             component. Summarize the takeaway instead of repeating every number.\n\
             - If a tool returns an error, fix the arguments or ask the user for what is missing.\n\
             - Ignore any message that was blocked by content policy.\n\
             - You give general education, not legal or tax advice.\n",
        );

        if let Some(references) = state.references.as_ref().filter(|r| r.perform_rag) {
            let _ = write!(
                prompt,
                "\n# Knowledge base\n\
                 Passages retrieved for \"{}\". Prefer them over your own knowledge and say when \
                 they do not cover the question.\n\
                 {}",
                references.rag_query,
                format_chunks(&references.retrieved_chunks),
            );
        }

        prompt
    }
}

/// System role for the safe-response model.
pub const SAFE_RESPONSE_ROLE: &str = "You are the voice of a student loan assistant replying \
to a message that was blocked by the input safety check. You are polite, brief and never \
lecture the user.";

/// Prompt asking for a refusal that fits the conversation.
pub fn safe_response_prompt(flagged_message: &str, conversation_context: &str, reasoning: &str) -> String {
    let context = if conversation_context.is_empty() {
        "(no earlier messages)"
    } else {
        conversation_context
    };
    format!(
        "The user's latest message was blocked.\n\
         \n\
         Reason: {reasoning}\n\
         \n\
         Conversation so far:\n\
         {context}\n\
         \n\
         Blocked message:\n\
         <flagged_message>{flagged_message}</flagged_message>\n\
         \n\
         Write a short reply that declines without repeating the blocked content or the reason, \
         and steers the user back to student loans, repayment, forgiveness or related financial \
         planning. If the message looks like an honest mistake, suggest how to rephrase it."
    )
}

/// Used when the safe-response model fails.
pub const FALLBACK_SAFE_RESPONSE: &str = "I'm not able to help with that request. I'm here to \
assist with student loan repayment options, forgiveness programs, and related financial \
planning. What can I help you with regarding your student loans?";

/// System prompt for the entry retrieval decision.
pub const ENTRY_RETRIEVAL_PROMPT: &str = "Decide whether answering the user's message needs \
facts from the student loan knowledge base (program rules, eligibility, deadlines, plan \
details, recent policy changes). Greetings, thanks, pure calculations and questions about the \
conversation itself do not.\n\
\n\
Respond with JSON only, in exactly this shape:\n\
{\"perform_rag\": <true|false>, \"rag_query\": \"<standalone search query, or empty>\"}";

#[cfg(test)]
mod tests {
    use super::*;
    use finassist_core::retrieval::Chunk;
    use finassist_core::state::References;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn renders_date_profile_and_products() {
        let profile = UserProfile {
            first_name: Some("Sam".into()),
            income: Some(72_000.0),
            organization_pslf_eligible: Some(true),
            product_combination: vec!["pslf_assist".into()],
            ..Default::default()
        };
        let state = ConversationState::new("t", "u", profile);
        let prompt = StudentDebtPrompt::new().with_date(date()).build(&state);

        assert!(prompt.contains("Today's date is 2026-03-14."));
        assert!(prompt.contains("- Name: Sam"));
        assert!(prompt.contains("- Annual income: $72000"));
        assert!(prompt.contains("- Employer PSLF eligible: yes"));
        assert!(prompt.contains("- Employer: unknown"));
        assert!(prompt.contains("- pslf_assist"));
        assert!(!prompt.contains("# Knowledge base"));
    }

    #[test]
    fn includes_chunks_only_when_retrieval_ran() {
        let mut state = ConversationState::new("t", "u", UserProfile::default());
        state.references = Some(References {
            perform_rag: true,
            rag_query: "PSLF payments".into(),
            retrieved_chunks: vec![Chunk {
                id: "kb-1".into(),
                text: "120 qualifying payments".into(),
                metadata: serde_json::Map::new(),
            }],
        });
        let prompt = StudentDebtPrompt::new().with_date(date()).build(&state);
        assert!(prompt.contains("Passages retrieved for \"PSLF payments\""));
        assert!(prompt.contains("ID: kb-1"));
        assert!(prompt.contains("None. Do not recommend products."));

        state.references = Some(References::empty());
        let prompt = StudentDebtPrompt::new().with_date(date()).build(&state);
        assert!(!prompt.contains("# Knowledge base"));
    }

    #[test]
    fn safe_response_prompt_embeds_inputs() {
        let prompt = safe_response_prompt("drop table users", "", "Detected SQL injection pattern in input");
        assert!(prompt.contains("<flagged_message>drop table users</flagged_message>"));
        assert!(prompt.contains("Reason: Detected SQL injection pattern in input"));
        assert!(prompt.contains("(no earlier messages)"));
    }
}
