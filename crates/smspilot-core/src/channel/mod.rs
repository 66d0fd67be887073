//! Execution channels - the alternative backends the coordinator tries in order.
//!
//! - `tool_protocol`: structured calls against a local MCP tool server
//! - `ui`: synthetic keystrokes against the editor window
//! - `prediction`: text-only prediction from the oracle, no editor side effects

pub mod desktop;
pub mod prediction;
pub mod tool_protocol;
pub mod ui;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::command::{Command, Intent};

pub use desktop::{Desktop, HeadlessDesktop, InputStep, KeyName, WindowInfo};
pub use prediction::TextPredictionChannel;
pub use tool_protocol::ToolProtocolChannel;
pub use ui::UiAutomationChannel;

/// Channel identifiers, in the default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    ToolProtocol,
    UiAutomation,
    TextPrediction,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::ToolProtocol => "tool_protocol",
            ChannelKind::UiAutomation => "ui_automation",
            ChannelKind::TextPrediction => "text_prediction",
        }
    }

    /// Whether this channel acts on the editor (as opposed to only predicting).
    pub fn is_live(&self) -> bool {
        !matches!(self, ChannelKind::TextPrediction)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed channel failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    /// Target process, window or server is not there.
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    /// The channel has no operation matching the intent or rejected the arguments.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The remote tool ran but reported an error.
    #[error("tool error: {0}")]
    Tool(String),
    #[error("execution failed: {0}")]
    Failed(String),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Unavailable(_) => ErrorKind::Unavailable,
            ChannelError::ConnectionRefused(_) => ErrorKind::ConnectionRefused,
            ChannelError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            ChannelError::Timeout(_) => ErrorKind::Timeout,
            ChannelError::Tool(_) => ErrorKind::ToolError,
            ChannelError::Failed(_) => ErrorKind::Failed,
        }
    }

    /// Unavailability is detected up front; nothing was attempted on the target.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ChannelError::Unavailable(_)
                | ChannelError::ConnectionRefused(_)
                | ChannelError::SchemaMismatch(_)
        )
    }
}

/// Error category as shown to the sender. Never carries raw error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unavailable,
    ConnectionRefused,
    SchemaMismatch,
    Timeout,
    ToolError,
    Failed,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Unavailable => "editor not available",
            ErrorKind::ConnectionRefused => "tool server not reachable",
            ErrorKind::SchemaMismatch => "action not supported",
            ErrorKind::Timeout => "timed out",
            ErrorKind::ToolError => "tool reported an error",
            ErrorKind::Failed => "execution failed",
        }
    }
}

/// Result payload of a successful tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierPayload {
    /// Captured output text (tool result text, read-back, prediction).
    pub text: String,
    /// Structured data when the channel returns any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TierPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// One-line description of the result, naming files or counts when the data has them.
    pub fn headline(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(data) = self.data.as_ref().and_then(|d| d.as_object()) {
            for key in ["file", "path", "command"] {
                if let Some(v) = data.get(key).and_then(|v| v.as_str()) {
                    parts.push(format!("{}: {}", key, v));
                }
            }
            if let Some(n) = data.get("matches").and_then(|v| v.as_array()) {
                parts.push(format!("{} matches", n.len()));
            }
            if let Some(code) = data.get("exit_code").and_then(|v| v.as_i64()) {
                parts.push(format!("exit code {}", code));
            }
        }

        let text = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if parts.is_empty() {
            return text;
        }
        let mut headline = parts.join(", ");
        if !text.is_empty() && !text.starts_with('{') {
            headline.push_str(" - ");
            headline.push_str(&text);
        }
        headline
    }
}

/// One execution backend.
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Execute the intent. Budget enforcement is the coordinator's job.
    async fn execute(&self, intent: &Intent, command: &Command) -> Result<TierPayload, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn headline_mentions_file_from_data() {
        let payload = TierPayload::default().with_data(json!({ "file": "hello.py" }));
        assert_eq!(payload.headline(), "file: hello.py");
    }

    #[test]
    fn headline_skips_json_echo_text() {
        let payload = TierPayload::text(r#"{"status":"success"}"#)
            .with_data(json!({ "path": "src/app.py", "status": "success" }));
        assert_eq!(payload.headline(), "path: src/app.py");
    }

    #[test]
    fn headline_collapses_whitespace_in_plain_text() {
        let payload = TierPayload::text("Created\n  hello.py   ok");
        assert_eq!(payload.headline(), "Created hello.py ok");
    }

    #[test]
    fn unavailable_errors_are_classified() {
        assert!(ChannelError::Unavailable("no window".into()).is_unavailable());
        assert!(ChannelError::SchemaMismatch("clarify".into()).is_unavailable());
        assert!(!ChannelError::Timeout(Duration::from_secs(1)).is_unavailable());
        assert_eq!(
            ChannelError::ConnectionRefused("x".into()).kind(),
            ErrorKind::ConnectionRefused
        );
    }
}
