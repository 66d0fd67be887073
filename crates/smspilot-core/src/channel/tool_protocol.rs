//! Tool-protocol channel - one short-lived MCP session per call.
//!
//! Spawns the configured tool server, then speaks newline-delimited JSON-RPC
//! over its stdio: `initialize`, `notifications/initialized`, `tools/call`.
//! The child is killed when the session is dropped, including on timeout.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};

use super::{Channel, ChannelError, ChannelKind, TierPayload};
use crate::command::{Command, Intent, IntentKind};
use crate::config::ToolProtocolConfig;
use crate::protocol::{
    CallToolResult, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, MCP_PROTOCOL_VERSION,
    METHOD_NOT_FOUND,
};
use crate::redact::redact_secrets;

pub const WORKSPACE_ENV: &str = "SMSPILOT_WORKSPACE";
pub const EDITOR_ENV: &str = "SMSPILOT_EDITOR";

pub struct ToolProtocolChannel {
    config: ToolProtocolConfig,
}

impl ToolProtocolChannel {
    pub fn new(config: ToolProtocolConfig) -> Self {
        Self { config }
    }

    /// The remote procedure and arguments for an intent.
    pub fn tool_call(intent: &Intent) -> Result<(&'static str, Value), ChannelError> {
        let missing = |what: &str| {
            ChannelError::SchemaMismatch(format!("{} needs {}", intent.kind, what))
        };
        match intent.kind {
            IntentKind::CreateFile => {
                let path = intent.file_path.as_deref().ok_or_else(|| missing("a file path"))?;
                let mut args = json!({ "path": path, "instruction": intent.instruction });
                if let Some(content) = &intent.content {
                    args["content"] = Value::from(content.as_str());
                }
                Ok(("create_file", args))
            }
            IntentKind::OpenFile => {
                let path = intent.file_path.as_deref().ok_or_else(|| missing("a file path"))?;
                Ok(("open_file", json!({ "path": path })))
            }
            IntentKind::SearchCode => {
                let query = intent.query.as_deref().unwrap_or(intent.instruction.as_str());
                Ok(("search_code", json!({ "query": query })))
            }
            IntentKind::RunCommand => {
                let command = intent
                    .shell_command
                    .as_deref()
                    .ok_or_else(|| missing("a shell command"))?;
                Ok(("run_command", json!({ "command": command })))
            }
            IntentKind::Analyze => Ok(("analyze_codebase", json!({}))),
            IntentKind::EditFile | IntentKind::Clarify => Err(ChannelError::SchemaMismatch(
                format!("no tool for {}", intent.kind),
            )),
        }
    }

    fn spawn(&self) -> Result<Session, ChannelError> {
        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .env(EDITOR_ENV, &self.config.editor_command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(workspace) = &self.config.workspace {
            cmd.env(WORKSPACE_ENV, workspace);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ChannelError::ConnectionRefused(format!("cannot start '{}': {}", self.config.command, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::ConnectionRefused("tool server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::ConnectionRefused("tool server stdout unavailable".into()))?;

        Ok(Session {
            _child: child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }
}

struct Session {
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl Session {
    async fn send(&mut self, request: &JsonRpcRequest) -> Result<(), ChannelError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| ChannelError::Failed(format!("cannot encode request: {}", e)))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ChannelError::ConnectionRefused(format!("write to tool server failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ChannelError::ConnectionRefused(format!("flush to tool server failed: {}", e)))
    }

    /// Send a request and wait for the response carrying its id.
    async fn call(&mut self, request: JsonRpcRequest) -> Result<JsonRpcResponse, ChannelError> {
        self.send(&request).await?;
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ChannelError::ConnectionRefused(format!("read from tool server failed: {}", e)))?
                .ok_or_else(|| ChannelError::ConnectionRefused("tool server closed the pipe".into()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(line) {
                Ok(response) if response.id == request.id => return Ok(response),
                Ok(_) => continue,
                Err(_) => {
                    tracing::debug!("ignoring non JSON-RPC line from tool server: {}", line);
                    continue;
                }
            }
        }
    }
}

fn rpc_error(response: &JsonRpcResponse) -> Option<ChannelError> {
    response.error.as_ref().map(|e| match e.code {
        METHOD_NOT_FOUND | INVALID_PARAMS => ChannelError::SchemaMismatch(e.message.clone()),
        _ => ChannelError::Tool(redact_secrets(&e.message)),
    })
}

#[async_trait]
impl Channel for ToolProtocolChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::ToolProtocol
    }

    async fn execute(&self, intent: &Intent, command: &Command) -> Result<TierPayload, ChannelError> {
        let (tool, arguments) = Self::tool_call(intent)?;
        let mut session = self.spawn()?;

        let init = session
            .call(JsonRpcRequest::new(
                1,
                "initialize",
                Some(json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "smspilot", "version": env!("CARGO_PKG_VERSION") }
                })),
            ))
            .await?;
        if let Some(err) = rpc_error(&init) {
            return Err(err);
        }
        session
            .send(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        tracing::info!(command_id = %command.id, tool, "calling tool");
        let response = session
            .call(JsonRpcRequest::new(
                2,
                "tools/call",
                Some(json!({ "name": tool, "arguments": arguments })),
            ))
            .await?;
        if let Some(err) = rpc_error(&response) {
            return Err(err);
        }

        let result: CallToolResult = serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| ChannelError::Failed(format!("malformed tools/call result: {}", e)))?;
        let text = result.text();
        if result.is_error {
            return Err(ChannelError::Tool(redact_secrets(&text)));
        }

        let data = result
            .structured_content
            .or_else(|| serde_json::from_str::<Value>(&text).ok().filter(Value::is_object));
        let payload = TierPayload {
            text: redact_secrets(&text),
            data,
        };
        Ok(payload)
    }
}
