//! Best-effort JSON recovery for model output.
//!
//! Small models wrap JSON in code fences, lead with prose, leave trailing
//! commas or use Python literals. Strict parsing is tried first; repair only
//! runs when that fails.

use finassist_core::error::GuardrailError;
use serde::de::DeserializeOwned;

/// Parse model output as `T`, repairing it if strict parsing fails.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, GuardrailError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let snippet = extract_json(trimmed)
        .ok_or_else(|| GuardrailError::Parse(format!("no JSON object in model output: {}", preview(trimmed))))?;
    let repaired = repair(snippet);
    serde_json::from_str(&repaired).map_err(|e| GuardrailError::Parse(e.to_string()))
}

/// Locate the JSON object inside a fenced block or surrounding prose.
pub fn extract_json(text: &str) -> Option<&str> {
    for fence in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(fence) {
            let rest = &text[start + fence.len()..];
            if let Some(end) = rest.find("```") {
                let inner = rest[..end].trim();
                if inner.starts_with('{') {
                    return Some(inner);
                }
            }
        }
    }
    if let Some(start) = text.find('{')
        && let Some(end) = text.rfind('}')
        && end > start
    {
        return Some(&text[start..=end]);
    }
    None
}

/// Rewrite common near-JSON into JSON: single-quoted strings, trailing
/// commas and Python `True`/`False`/`None`.
fn repair(snippet: &str) -> String {
    let chars: Vec<char> = snippet.chars().collect();
    let mut out = String::with_capacity(snippet.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        // \' is not a JSON escape
                        if next != '\'' {
                            out.push('\\');
                        }
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else if c == q {
                    out.push('"');
                    quote = None;
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
            None => match c {
                '"' | '\'' => {
                    out.push('"');
                    quote = Some(c);
                }
                ',' => {
                    let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                    if !matches!(next, Some('}') | Some(']')) {
                        out.push(',');
                    }
                }
                c if c.is_ascii_alphabetic() => {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    out.push_str(match word.as_str() {
                        "True" => "true",
                        "False" => "false",
                        "None" => "null",
                        other => other,
                    });
                    continue;
                }
                _ => out.push(c),
            },
        }
        i += 1;
    }

    out
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use finassist_core::ValidationResult;
    use serde_json::Value;

    #[test]
    fn strict_json_parses() {
        let r: ValidationResult = parse_json(r#"{"reasoning": "fine", "blocked": false}"#).unwrap();
        assert!(!r.blocked);
    }

    #[test]
    fn fenced_output() {
        let raw = "```json\n{\"reasoning\": \"off topic\", \"blocked\": true}\n```";
        let r: ValidationResult = parse_json(raw).unwrap();
        assert!(r.blocked);
        assert_eq!(r.reasoning, "off topic");
    }

    #[test]
    fn leading_prose_and_trailing_comma() {
        let raw = "Here is my verdict:\n{\"reasoning\": \"ok\", \"blocked\": false,}\nThanks!";
        let r: ValidationResult = parse_json(raw).unwrap();
        assert_eq!(r.reasoning, "ok");
    }

    #[test]
    fn single_quotes_and_python_literals() {
        let raw = "{'reasoning': 'the user said \"hi\", it\\'s fine', 'blocked': False}";
        let r: ValidationResult = parse_json(raw).unwrap();
        assert!(!r.blocked);
        assert_eq!(r.reasoning, "the user said \"hi\", it's fine");
    }

    #[test]
    fn literals_inside_strings_are_untouched() {
        let v: Value = parse_json("{'a': 'True story', 'b': None, 'c': [1, 2,],}").unwrap();
        assert_eq!(v["a"], "True story");
        assert!(v["b"].is_null());
        assert_eq!(v["c"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn garbage_fails() {
        assert!(parse_json::<ValidationResult>("I cannot answer that.").is_err());
        assert!(parse_json::<ValidationResult>("{not json at all}").is_err());
    }

    #[test]
    fn missing_fields_fail() {
        assert!(parse_json::<ValidationResult>(r#"{"blocked": true}"#).is_err());
    }
}
