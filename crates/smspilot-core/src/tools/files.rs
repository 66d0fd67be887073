use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use super::{opt_str_arg, str_arg, Tool, ToolError};
use crate::context::ToolContext;

/// Line-comment prefix for a file's language, used for the placeholder header.
fn comment_prefix(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let prefix = match ext.as_str() {
        "py" | "sh" | "rb" | "toml" | "yaml" | "yml" | "r" => "#",
        "rs" | "js" | "jsx" | "ts" | "tsx" | "go" | "java" | "c" | "cpp" | "h" | "hpp" | "cs"
        | "swift" | "kt" => "//",
        "sql" | "lua" => "--",
        _ => return None,
    };
    Some(prefix)
}

/// Placeholder body for a file the editor's assistant is asked to complete.
fn placeholder(path: &Path, instruction: &str) -> String {
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    match comment_prefix(path) {
        Some(c) => format!(
            "{c} Request: {instruction}\n{c} Generated: {generated}\n{c} Ask the editor's AI to complete this file.\n"
        ),
        None => String::new(),
    }
}

pub struct CreateFileTool {
    ctx: Arc<ToolContext>,
}

impl CreateFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a file in the workspace. Writes `content` when given, otherwise a header carrying the instruction for the editor's AI."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "content": { "type": "string", "description": "Full file content" },
                "instruction": { "type": "string", "description": "What the file should contain" },
                "overwrite": { "type": "boolean", "description": "Replace an existing file (default false)" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let requested = str_arg(&args, "path")?;
        let path = self.ctx.resolve(requested)?;
        let overwrite = args.get("overwrite").and_then(Value::as_bool).unwrap_or(false);
        let instruction = opt_str_arg(&args, "instruction").unwrap_or("");

        if path.exists() && !overwrite {
            return Err(ToolError::Failed(format!(
                "{} already exists",
                self.ctx.display(&path)
            )));
        }

        let body = match opt_str_arg(&args, "content") {
            Some(content) => content.to_string(),
            None => placeholder(&path, instruction),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Failed(format!("cannot create directory: {}", e)))?;
        }
        tokio::fs::write(&path, body.as_bytes())
            .await
            .map_err(|e| ToolError::Failed(format!("cannot write file: {}", e)))?;

        let shown = self.ctx.display(&path);
        tracing::info!("created {} ({} bytes)", shown, body.len());
        Ok(json!({
            "file": shown,
            "bytes": body.len(),
            "summary": format!("Created {} ({} bytes)", shown, body.len()),
        }))
    }
}

pub struct OpenFileTool {
    ctx: Arc<ToolContext>,
}

impl OpenFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for OpenFileTool {
    fn name(&self) -> &str {
        "open_file"
    }

    fn description(&self) -> &str {
        "Open a workspace file in the editor"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let path = self.ctx.resolve(str_arg(&args, "path")?)?;
        let shown = self.ctx.display(&path);
        if !path.is_file() {
            return Err(ToolError::Failed(format!("{} does not exist", shown)));
        }

        let editor = self.ctx.editor_command();
        tokio::process::Command::new(editor)
            .arg(&path)
            .current_dir(self.ctx.workspace())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| ToolError::Failed(format!("cannot start editor '{}': {}", editor, e)))?;

        Ok(json!({
            "file": shown,
            "editor": editor,
            "summary": format!("Opened {} in {}", shown, editor),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dir: &tempfile::TempDir, editor: &str) -> Arc<ToolContext> {
        Arc::new(ToolContext::new(dir.path(), editor).unwrap())
    }

    #[tokio::test]
    async fn creates_file_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CreateFileTool::new(ctx(&dir, "cursor"));

        let result = tool
            .execute(json!({ "path": "src/hello.py", "content": "print('Hello World')\n" }))
            .await
            .unwrap();

        assert_eq!(result["file"], "src/hello.py");
        let written = std::fs::read_to_string(dir.path().join("src/hello.py")).unwrap();
        assert_eq!(written, "print('Hello World')\n");
    }

    #[tokio::test]
    async fn writes_placeholder_without_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CreateFileTool::new(ctx(&dir, "cursor"));

        tool.execute(json!({ "path": "calc.py", "instruction": "a calculator" }))
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("calc.py")).unwrap();
        assert!(written.starts_with("# Request: a calculator\n"));
    }

    #[tokio::test]
    async fn refuses_to_overwrite_or_escape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "keep").unwrap();
        let tool = CreateFileTool::new(ctx(&dir, "cursor"));

        let err = tool.execute(json!({ "path": "app.py", "content": "x" })).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
        assert_eq!(std::fs::read_to_string(dir.path().join("app.py")).unwrap(), "keep");

        let err = tool.execute(json!({ "path": "../outside.py" })).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));

        let err = tool.execute(json!({ "content": "x" })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn open_requires_existing_file_and_editor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "").unwrap();

        let tool = OpenFileTool::new(ctx(&dir, "smspilot-no-such-editor"));
        let err = tool.execute(json!({ "path": "missing.py" })).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let err = tool.execute(json!({ "path": "app.py" })).await.unwrap_err();
        assert!(err.to_string().contains("cannot start editor"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_spawns_editor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "").unwrap();
        let tool = OpenFileTool::new(ctx(&dir, "true"));

        let result = tool.execute(json!({ "path": "app.py" })).await.unwrap();
        assert_eq!(result["file"], "app.py");
        assert_eq!(result["summary"], "Opened app.py in true");
    }
}
