use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use super::{str_arg, Tool, ToolError};
use crate::context::ToolContext;
use crate::formatter::truncate_tail;
use crate::redact::redact_secrets;

/// Programs `run_command` will start. Anything else is refused.
pub const ALLOWED_PROGRAMS: &[&str] = &[
    "git", "python", "python3", "pip", "pip3", "node", "npm", "cargo", "ls", "dir", "find", "grep",
];

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_CHARS: usize = 4000;
const METACHARACTERS: &[char] = &['|', '&', ';', '<', '>', '`', '$', '\n', '\r'];

/// Validate a command line and return its program and arguments.
fn parse_command(command: &str) -> Result<(String, Vec<String>), ToolError> {
    if let Some(c) = command.chars().find(|c| METACHARACTERS.contains(c)) {
        return Err(ToolError::Failed(format!(
            "shell operator '{}' is not allowed",
            c.escape_default()
        )));
    }
    let mut args = shlex::split(command)
        .ok_or_else(|| ToolError::InvalidArguments("unbalanced quotes in command".into()))?;
    if args.is_empty() {
        return Err(ToolError::InvalidArguments("command is empty".into()));
    }
    let program = args.remove(0);
    if !ALLOWED_PROGRAMS.contains(&program.as_str()) {
        return Err(ToolError::Failed(format!(
            "'{}' is not an allowed program (allowed: {})",
            program,
            ALLOWED_PROGRAMS.join(", ")
        )));
    }
    Ok((program, args))
}

pub struct RunCommandTool {
    ctx: Arc<ToolContext>,
}

impl RunCommandTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    fn command(&self, program: &str, args: &[String]) -> tokio::process::Command {
        let mut cmd = if cfg!(windows) && program == "dir" {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg("dir");
            cmd
        } else {
            tokio::process::Command::new(program)
        };
        cmd.args(args)
            .current_dir(self.ctx.workspace())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run an allow-listed program (git, python, npm, cargo, ...) in the workspace without a shell"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Command line, e.g. `git status`" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let command = str_arg(&args, "command")?.trim().to_string();
        let (program, program_args) = parse_command(&command)?;

        let child = self
            .command(&program, &program_args)
            .spawn()
            .map_err(|e| ToolError::Failed(format!("cannot start '{}': {}", program, e)))?;

        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                ToolError::Failed(format!(
                    "'{}' timed out after {}s",
                    command,
                    COMMAND_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| ToolError::Failed(format!("'{}' failed: {}", command, e)))?;

        let stdout = redact_secrets(&truncate_tail(
            String::from_utf8_lossy(&output.stdout).trim_end(),
            MAX_OUTPUT_CHARS,
        ));
        let stderr = redact_secrets(&truncate_tail(
            String::from_utf8_lossy(&output.stderr).trim_end(),
            MAX_OUTPUT_CHARS,
        ));
        let exit_code = output.status.code();
        tracing::info!(command = %command, ?exit_code, "command finished");

        let first_line = stdout
            .lines()
            .chain(stderr.lines())
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();
        let summary = match exit_code {
            Some(0) if first_line.is_empty() => format!("`{}` succeeded", command),
            Some(0) => format!("`{}` succeeded: {}", command, first_line),
            Some(code) => format!("`{}` exited with {}: {}", command, code, first_line),
            None => format!("`{}` was terminated", command),
        };

        Ok(json!({
            "command": command,
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "summary": summary,
        }))
    }
}
