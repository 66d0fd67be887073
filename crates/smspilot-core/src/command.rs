//! Inbound commands and the intents classified from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix the carrier prepends to messages sent from a trial account.
const TRIAL_PREFIX: &str = "Sent from your Twilio trial account - ";

/// One inbound SMS treated as a unit of work. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub text: String,
    pub sender: String,
    pub recipient: String,
    pub received_at: DateTime<Utc>,
}

impl Command {
    pub fn new(text: &str, sender: &str, recipient: &str) -> Self {
        let text = text.trim();
        let text = text.strip_prefix(TRIAL_PREFIX).unwrap_or(text).trim();
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            sender: sender.trim().to_string(),
            recipient: recipient.trim().to_string(),
            received_at: Utc::now(),
        }
    }
}

/// Closed set of actions a command can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CreateFile,
    EditFile,
    OpenFile,
    SearchCode,
    RunCommand,
    Analyze,
    /// Default intent when the request cannot be understood.
    Clarify,
}

impl IntentKind {
    pub const ALL: [IntentKind; 7] = [
        IntentKind::CreateFile,
        IntentKind::EditFile,
        IntentKind::OpenFile,
        IntentKind::SearchCode,
        IntentKind::RunCommand,
        IntentKind::Analyze,
        IntentKind::Clarify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::CreateFile => "create_file",
            IntentKind::EditFile => "edit_file",
            IntentKind::OpenFile => "open_file",
            IntentKind::SearchCode => "search_code",
            IntentKind::RunCommand => "run_command",
            IntentKind::Analyze => "analyze",
            IntentKind::Clarify => "clarify",
        }
    }

    /// Map an action label (as returned by the oracle) onto the closed set.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        let kind = match normalized.as_str() {
            "create_file" | "create" | "new_file" | "write_file" => IntentKind::CreateFile,
            "edit_file" | "edit" | "modify_file" | "refactor" => IntentKind::EditFile,
            "open_file" | "open" | "show_file" => IntentKind::OpenFile,
            "search_code" | "search" | "search_codebase" | "find" | "grep" => {
                IntentKind::SearchCode
            }
            "run_command" | "run" | "run_code" | "execute_command" | "execute" | "shell" => {
                IntentKind::RunCommand
            }
            "analyze" | "analyze_codebase" | "analyse" | "count_tests" | "find_large_files" => {
                IntentKind::Analyze
            }
            "clarify" | "noop" | "no_op" | "error" | "unknown" => IntentKind::Clarify,
            _ => return None,
        };
        Some(kind)
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified action plus its free-form parameters. Read-only after classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    /// Natural-language instruction handed to the editor's assistant.
    pub instruction: String,
    /// Short human description used in the reply.
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// File body when the oracle produced one (create_file only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_command: Option<String>,
}

impl Intent {
    pub fn new(kind: IntentKind, instruction: &str, description: &str) -> Self {
        Self {
            kind,
            instruction: instruction.to_string(),
            description: description.to_string(),
            file_path: None,
            content: None,
            query: None,
            shell_command: None,
        }
    }

    /// The "no-op / clarify" intent for text that could not be classified.
    pub fn clarify(text: &str) -> Self {
        Self::new(
            IntentKind::Clarify,
            text,
            "Request was not understood",
        )
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.file_path = Some(path.to_string());
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn with_shell_command(mut self, command: &str) -> Self {
        self.shell_command = Some(command.to_string());
        self
    }

    /// Text typed into the editor's chat by the UI-automation channel.
    pub fn editor_instruction(&self) -> String {
        match self.kind {
            IntentKind::CreateFile => match &self.file_path {
                Some(path) => format!("Create the file {}: {}", path, self.instruction),
                None => self.instruction.clone(),
            },
            IntentKind::EditFile => match &self.file_path {
                Some(path) => format!("Edit {}: {}", path, self.instruction),
                None => self.instruction.clone(),
            },
            IntentKind::OpenFile => match &self.file_path {
                Some(path) => format!("Open the file {}", path),
                None => self.instruction.clone(),
            },
            IntentKind::SearchCode => match &self.query {
                Some(query) => format!("Search the codebase for \"{}\" and list the matches", query),
                None => self.instruction.clone(),
            },
            IntentKind::RunCommand => match &self.shell_command {
                Some(cmd) => format!("Run `{}` in the terminal and show the output", cmd),
                None => self.instruction.clone(),
            },
            IntentKind::Analyze | IntentKind::Clarify => self.instruction.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trial_prefix_and_whitespace() {
        let cmd = Command::new(
            "  Sent from your Twilio trial account - Open app.py ",
            "+15550001111",
            "+15550002222",
        );
        assert_eq!(cmd.text, "Open app.py");
        assert_eq!(cmd.sender, "+15550001111");
    }

    #[test]
    fn maps_oracle_labels_onto_closed_set() {
        assert_eq!(IntentKind::from_label("create_file"), Some(IntentKind::CreateFile));
        assert_eq!(IntentKind::from_label("execute_command"), Some(IntentKind::RunCommand));
        assert_eq!(IntentKind::from_label("Run-Code"), Some(IntentKind::RunCommand));
        assert_eq!(IntentKind::from_label("search"), Some(IntentKind::SearchCode));
        assert_eq!(IntentKind::from_label("analyze_codebase"), Some(IntentKind::Analyze));
        assert_eq!(IntentKind::from_label("dance"), None);
    }

    #[test]
    fn every_kind_round_trips_through_its_label() {
        for kind in IntentKind::ALL {
            assert_eq!(IntentKind::from_label(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn editor_instruction_uses_parameters() {
        let intent = Intent::new(IntentKind::RunCommand, "check git", "Running git status")
            .with_shell_command("git status");
        assert_eq!(
            intent.editor_instruction(),
            "Run `git status` in the terminal and show the output"
        );

        let intent = Intent::new(IntentKind::SearchCode, "find flask", "Searching");
        assert_eq!(intent.editor_instruction(), "find flask");
    }
}
