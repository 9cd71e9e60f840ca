//! Deterministic pre-filter: cheap checks that run before any model call.
//!
//! Rejects oversized input, instruction-override phrases, SQL statements and
//! code-execution snippets. Input that passes still goes to the semantic
//! check; passing here is not the same as being allowed.

use finassist_core::ValidationResult;
use regex_lite::Regex;
use std::sync::LazyLock;

/// Phrases that try to override the assistant's instructions.
pub const INJECTION_PHRASES: &[&str] = &[
    "ignore previous",
    "ignore all",
    "act as",
    "pretend you are",
    "you are now",
    "new instructions",
    "override",
    "jailbreak",
    "your training",
    "system prompt",
    "internal instructions",
];

const SQL_PATTERNS: &[&str] = &[
    r"\bselect\s+[\w\*]+(?:\s*,\s*[\w\*]+)*\s+from\s+\w+",
    r"\binsert\s+into\s+\w+\s+(?:values|select)",
    r"\bupdate\s+\w+\s+set\s+\w+\s*=",
    r"\bdelete\s+from\s+\w+\s+where",
    r"\bdrop\s+(?:table|database)\s+\w+",
    r"\balter\s+table\s+\w+",
    r"\btruncate\s+table\s+\w+",
    r"\bgrant\s+[\w\s]+privileges",
    r"--\s*;\s*select",
];

const CODE_PATTERNS: &[&str] = &[
    r"\bimport\s+(?:os|sys|subprocess|shutil)\b",
    r"\bos\s*\.\s*(?:system|popen|environ)\s*\(",
    r"\bsubprocess\s*\.\s*(?:run|call|Popen)\s*\(",
    r"\beval\s*\(",
    r"\bexec\s*\(",
    r"\b__import__\s*\(",
    r"\bwith\s+open\s*\(",
    r#"\bopen\s*\(\s*['"](?:/|\\)"#,
    r"^def\s+\w+\s*\(.*\):",
    r"^class\s+\w+\s*:",
];

static SQL_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(SQL_PATTERNS));
static CODE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CODE_PATTERNS));

/// Compile case-insensitive, line-anchored patterns. A pattern that fails to
/// compile is logged and skipped.
fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(&format!("(?im){pattern}")) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern, error = %e, "Invalid guardrail pattern");
                None
            }
        })
        .collect()
}

/// Outcome of the pre-filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefilterVerdict {
    /// Nothing matched; the semantic check decides.
    Pass,
    /// Rejected without a model call.
    Blocked(ValidationResult),
}

impl PrefilterVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, PrefilterVerdict::Blocked(_))
    }

    /// The verdict as a validation result.
    pub fn into_result(self) -> ValidationResult {
        match self {
            PrefilterVerdict::Pass => ValidationResult::allowed("Input passed pre-filtering checks"),
            PrefilterVerdict::Blocked(result) => result,
        }
    }
}

/// Run the deterministic checks in order: length, injection phrases, SQL,
/// code execution.
pub fn prefilter(input: &str, max_chars: usize) -> PrefilterVerdict {
    if input.chars().count() > max_chars {
        return PrefilterVerdict::Blocked(ValidationResult::blocked(format!(
            "Input exceeds maximum allowed length of {max_chars} characters"
        )));
    }

    let lowered = input.to_lowercase();
    if let Some(phrase) = INJECTION_PHRASES.iter().find(|p| lowered.contains(*p)) {
        return PrefilterVerdict::Blocked(ValidationResult::blocked(format!(
            "Detected prompt injection pattern: '{phrase}'"
        )));
    }

    if SQL_REGEXES.iter().any(|re| re.is_match(input)) {
        return PrefilterVerdict::Blocked(ValidationResult::blocked(
            "Detected SQL injection pattern in input",
        ));
    }

    if CODE_REGEXES.iter().any(|re| re.is_match(input)) {
        return PrefilterVerdict::Blocked(ValidationResult::blocked(
            "Detected code execution pattern in input",
        ));
    }

    PrefilterVerdict::Pass
}
