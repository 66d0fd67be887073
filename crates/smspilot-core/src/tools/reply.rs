use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{str_arg, Tool, ToolError};
use crate::context::ToolContext;
use crate::formatter::{fit_to_limit, DEFAULT_MAX_REPLY_CHARS};

pub struct SendTextReplyTool {
    ctx: Arc<ToolContext>,
}

impl SendTextReplyTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SendTextReplyTool {
    fn name(&self) -> &str {
        "send_text_reply"
    }

    fn description(&self) -> &str {
        "Send an SMS to a phone number through the configured Twilio account"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Destination number in E.164 form" },
                "body": { "type": "string", "description": "Message text" }
            },
            "required": ["to", "body"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let to = str_arg(&args, "to")?.trim();
        let body = fit_to_limit(str_arg(&args, "body")?, DEFAULT_MAX_REPLY_CHARS);
        let sms = self
            .ctx
            .sms()
            .ok_or_else(|| ToolError::Failed("SMS is not configured".into()))?;

        let sid = sms
            .send(to, &body)
            .await
            .map_err(|e| ToolError::Failed(format!("send failed: {}", e)))?;

        Ok(json!({
            "sid": sid,
            "to": to,
            "summary": format!("Sent {} characters to {}", body.chars().count(), to),
        }))
    }
}
