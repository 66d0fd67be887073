//! Editor tools exposed by the tool server.
//!
//! Each tool has a name, a description and a JSON schema for its arguments,
//! takes JSON in and returns JSON out. A `summary` string in the result is
//! used as the human-readable text of the call.

mod files;
mod reply;
mod search;
mod shell;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::context::ToolContext;
use crate::protocol::ToolDescriptor;

pub use files::{CreateFileTool, OpenFileTool};
pub use reply::SendTextReplyTool;
pub use search::{AnalyzeCodebaseTool, SearchCodeTool};
pub use shell::{RunCommandTool, ALLOWED_PROGRAMS};

#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments missing or of the wrong type.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool ran and refused or failed.
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

pub(crate) fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument '{}'", name)))
}

pub(crate) fn opt_str_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

/// Tools by name, listed in name order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }
}

/// Registry with every editor tool bound to `ctx`.
pub fn create_default_registry(ctx: Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(CreateFileTool::new(ctx.clone())));
    registry.register(Arc::new(OpenFileTool::new(ctx.clone())));
    registry.register(Arc::new(SearchCodeTool::new(ctx.clone())));
    registry.register(Arc::new(RunCommandTool::new(ctx.clone())));
    registry.register(Arc::new(AnalyzeCodebaseTool::new(ctx.clone())));
    registry.register(Arc::new(SendTextReplyTool::new(ctx)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_the_editor_tool_set() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ToolContext::new(dir.path(), "cursor").unwrap());
        let registry = create_default_registry(ctx);

        let names: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "analyze_codebase",
                "create_file",
                "open_file",
                "run_command",
                "search_code",
                "send_text_reply"
            ]
        );
        assert!(registry.get("unknown").is_none());
        for tool in registry.list_tools() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        }
    }
}
