//! What the editor tools may touch: one workspace directory, one editor CLI,
//! and optionally an SMS sender.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::sms::SmsSender;
use crate::tools::ToolError;

pub struct ToolContext {
    workspace: PathBuf,
    editor_command: String,
    sms: Option<Arc<dyn SmsSender>>,
}

impl ToolContext {
    pub fn new(workspace: &Path, editor_command: &str) -> Result<Self> {
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("workspace {:?} is not accessible", workspace))?;
        if !workspace.is_dir() {
            anyhow::bail!("workspace {:?} is not a directory", workspace);
        }
        Ok(Self {
            workspace,
            editor_command: editor_command.to_string(),
            sms: None,
        })
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn editor_command(&self) -> &str {
        &self.editor_command
    }

    pub fn sms(&self) -> Option<&Arc<dyn SmsSender>> {
        self.sms.as_ref()
    }

    /// Resolve a user-supplied path inside the workspace.
    ///
    /// Resolution is lexical: `..` may not climb above the workspace root and
    /// absolute paths must already point into it.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(ToolError::InvalidArguments("path is empty".into()));
        }
        let path = Path::new(requested);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.workspace).map_err(|_| {
                ToolError::Failed(format!("path {} is outside the workspace", requested))
            })?
        } else {
            path
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ToolError::Failed(format!(
                            "path {} escapes the workspace",
                            requested
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::Failed(format!(
                        "path {} is outside the workspace",
                        requested
                    )));
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(ToolError::InvalidArguments("path names the workspace itself".into()));
        }
        Ok(self.workspace.join(normalized))
    }

    /// Workspace-relative display form of a resolved path.
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
