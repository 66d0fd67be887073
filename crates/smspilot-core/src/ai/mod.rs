//! AI module - the text oracle and everything needed to talk to it.
//!
//! - Oracle: the `TextOracle` seam plus the provider-backed implementation
//! - Prompt Engine: `{{variable}}` templates
//! - Prompts: built-in prompt texts with a file override
//! - Provider: single-shot Gemini, OpenAI-compatible and Anthropic clients

pub mod oracle;
pub mod prompt_engine;
pub mod prompts;
pub mod provider;

pub use oracle::{build_oracle, ProviderOracle, TextOracle, UnconfiguredOracle};
pub use prompt_engine::PromptTemplate;
pub use prompts::PromptsConfig;
pub use provider::ProviderConfig;

/// Strip markdown code fence markers from an LLM response.
pub fn strip_json_code_fence(input: &str) -> &str {
    let s = input.trim();
    for fence in ["```json", "```JSON", "```"] {
        if let Some(rest) = s.strip_prefix(fence) {
            return rest.trim_end().trim_end_matches("```").trim();
        }
    }
    s
}

/// The first balanced `{...}` object in `input`, if any.
pub fn extract_json_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in input[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_code_fences() {
        let input = "```json\n{\"action\":\"open_file\"}\n```";
        assert_eq!(strip_json_code_fence(input), "{\"action\":\"open_file\"}");
        assert_eq!(strip_json_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_json_code_fence("  {} "), "{}");
    }

    #[test]
    fn finds_object_inside_prose() {
        let input = r#"Sure! Here it is: {"action": "search", "query": "a } b"} hope that helps"#;
        assert_eq!(
            extract_json_object(input),
            Some(r#"{"action": "search", "query": "a } b"}"#)
        );
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("{ unclosed"), None);
    }
}
