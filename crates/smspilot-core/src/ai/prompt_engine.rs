//! Prompt templates with `{{variable}}` substitution.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static VARIABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex pattern"));

/// # Example
/// ```ignore
/// use smspilot_core::ai::prompt_engine::PromptTemplate;
/// use smspilot_core::prompt_vars;
///
/// let template = PromptTemplate::new("The user sent: \"{{message}}\"");
/// let prompt = template.render(&prompt_vars!("message" => "open app.py"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Replace every known `{{variable}}` in a single pass.
    ///
    /// Unknown placeholders are kept as-is, and substituted values are never
    /// re-scanned, so user text containing `{{...}}` is inserted literally.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        VARIABLE_REGEX
            .replace_all(&self.template, |caps: &regex::Captures| {
                match variables.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Like [`render`](Self::render), but unknown placeholders become `default`.
    pub fn render_with_default(&self, variables: &HashMap<String, String>, default: &str) -> String {
        VARIABLE_REGEX
            .replace_all(&self.template, |caps: &regex::Captures| {
                variables
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| default.to_string())
            })
            .into_owned()
    }

    pub fn extract_variables(&self) -> Vec<String> {
        VARIABLE_REGEX
            .captures_iter(&self.template)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        let pattern = format!("{{{{{}}}}}", name);
        self.template.contains(&pattern)
    }

    pub fn raw(&self) -> &str {
        &self.template
    }
}

#[macro_export]
macro_rules! prompt_vars {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.to_string(), $value.to_string());
        )*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_render() {
        let template = PromptTemplate::new("Hello, {{name}}!");
        assert_eq!(template.render(&prompt_vars!("name" => "World")), "Hello, World!");
    }

    #[test]
    fn test_missing_variable_preserved() {
        let template = PromptTemplate::new("Open {{file}} for {{sender}}.");
        assert_eq!(
            template.render(&prompt_vars!("file" => "app.py")),
            "Open app.py for {{sender}}."
        );
    }

    #[test]
    fn test_render_with_default() {
        let template = PromptTemplate::new("Open {{file}} for {{sender}}.");
        assert_eq!(
            template.render_with_default(&prompt_vars!("file" => "app.py"), "n/a"),
            "Open app.py for n/a."
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let template = PromptTemplate::new("A={{a}} B={{b}}");
        let out = template.render(&prompt_vars!("a" => "{{b}}", "b" => "x"));
        assert_eq!(out, "A={{b}} B=x");
    }

    #[test]
    fn test_extract_and_has_variable() {
        let template = PromptTemplate::new("{{message}}\n{{action}}\n{{message}}");
        assert_eq!(template.extract_variables().len(), 3);
        assert!(template.has_variable("action"));
        assert!(!template.has_variable("unknown"));
    }
}
