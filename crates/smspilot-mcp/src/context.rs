use anyhow::{Context, Result};
use smspilot_core::config::Secrets;
use smspilot_core::context::ToolContext;
use smspilot_core::sms::TwilioClient;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Tool context for this process: the workspace, the editor CLI and Twilio
/// when its credentials are in the environment.
pub fn build_context(workspace: &Path, editor: &str, secrets: &Secrets) -> Result<Arc<ToolContext>> {
    let mut ctx = ToolContext::new(workspace, editor)
        .with_context(|| format!("cannot use workspace {}", workspace.display()))?;

    match secrets.twilio.clone() {
        Some(credentials) => match TwilioClient::new(credentials) {
            Ok(client) => {
                info!("SMS replies enabled from {}", client.from_number());
                ctx = ctx.with_sms(Arc::new(client));
            }
            Err(e) => warn!("SMS client unavailable: {:#}", e),
        },
        None => info!("Twilio credentials not set, send_text_reply disabled"),
    }

    info!("Workspace: {}", ctx.workspace().display());
    Ok(Arc::new(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_twilio() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_context(dir.path(), "cursor", &Secrets::default()).unwrap();
        assert!(ctx.sms().is_none());
        assert_eq!(ctx.editor_command(), "cursor");
    }

    #[test]
    fn missing_workspace_fails() {
        let err = build_context(Path::new("/no/such/workspace"), "cursor", &Secrets::default())
            .err()
            .expect("missing workspace must be rejected");
        assert!(err.to_string().contains("cannot use workspace"));
    }
}
