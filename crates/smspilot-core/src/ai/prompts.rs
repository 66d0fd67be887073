//! Prompt texts, overridable with a `prompts.json` next to the config file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::prompt_engine::PromptTemplate;

pub const PROMPTS_FILE_NAME: &str = "prompts.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub classifier_system: String,
    /// Variables: `{{message}}`.
    pub classifier: String,
    pub prediction_system: String,
    /// Variables: `{{action}}`, `{{description}}`, `{{instruction}}`, `{{file_path}}`.
    pub prediction: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            classifier_system: "You turn text messages into code-editor actions. Reply with a single JSON object and nothing else.".to_string(),
            classifier: r#"The user sent this text message to control their code editor: "{{message}}"

Decide which action should be performed. Allowed actions:
1. create_file - create a new file; the editor's AI writes the code
2. edit_file - change existing code
3. open_file - open a specific file
4. search_code - search the codebase for text
5. run_command - run a terminal command
6. analyze - analyze the codebase (file counts, large files, tests)
7. clarify - the message is not an editor request or is too vague

Respond with a JSON object containing:
- action: one of [create_file, edit_file, open_file, search_code, run_command, analyze, clarify]
- command: the instruction for the editor's AI, in plain words
- description: a short description of what will be done
- file_path: the file to work with, if any
- query: the search text, for search_code
- shell_command: the exact terminal command, for run_command

Example:
{"action": "create_file", "command": "Create a Python script that prints 'Hello World'", "description": "Creating a Python hello world script", "file_path": "hello.py"}"#
                .to_string(),
            prediction_system: "You predict what a code editor's AI assistant would do. Answer in at most three short sentences, plain text, no markdown.".to_string(),
            prediction: r#"The editor could not be reached. Predict briefly what the outcome of this request would be.
Action: {{action}}
Request: {{instruction}}
File: {{file_path}}
Summary so far: {{description}}"#
                .to_string(),
        }
    }
}

impl PromptsConfig {
    /// Load `prompts.json` from `dir`, falling back to the built-in texts.
    pub fn load(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };
        let path = dir.join(PROMPTS_FILE_NAME);
        if !path.exists() {
            tracing::debug!("{:?} not found, using built-in prompts", path);
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<PromptsConfig>(&content) {
                Ok(config) => {
                    tracing::info!("loaded prompts from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("failed to parse {:?}: {}, using built-in prompts", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("failed to read {:?}: {}, using built-in prompts", path, e);
                Self::default()
            }
        }
    }

    pub fn classifier_template(&self) -> PromptTemplate {
        PromptTemplate::new(&self.classifier)
    }

    pub fn prediction_template(&self) -> PromptTemplate {
        PromptTemplate::new(&self.prediction)
    }
}
