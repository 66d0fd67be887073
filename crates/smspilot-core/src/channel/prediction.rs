//! Text-prediction channel - the last resort, so a reply is always possible.
//!
//! Never touches the editor; it asks the oracle what the outcome would likely be.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Channel, ChannelError, ChannelKind, TierPayload};
use crate::ai::{PromptsConfig, TextOracle};
use crate::command::{Command, Intent, IntentKind};
use crate::redact::redact_secrets;

pub struct TextPredictionChannel {
    oracle: Arc<dyn TextOracle>,
    prompts: PromptsConfig,
}

impl TextPredictionChannel {
    pub fn new(oracle: Arc<dyn TextOracle>, prompts: PromptsConfig) -> Self {
        Self { oracle, prompts }
    }

    fn prompt(&self, intent: &Intent) -> String {
        self.prompts.prediction_template().render(&crate::prompt_vars!(
            "action" => intent.kind,
            "instruction" => intent.editor_instruction(),
            "file_path" => intent.file_path.as_deref().unwrap_or("(none)"),
            "description" => intent.description,
        ))
    }
}

#[async_trait]
impl Channel for TextPredictionChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::TextPrediction
    }

    async fn execute(&self, intent: &Intent, command: &Command) -> Result<TierPayload, ChannelError> {
        if intent.kind == IntentKind::Clarify {
            return Err(ChannelError::SchemaMismatch(
                "nothing to predict for an unclassified request".to_string(),
            ));
        }

        let reply = self
            .oracle
            .complete(Some(&self.prompts.prediction_system), &self.prompt(intent))
            .await
            .map_err(|e| ChannelError::Failed(redact_secrets(&e.to_string())))?;

        let text = reply.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(ChannelError::Failed("oracle returned an empty prediction".to_string()));
        }
        tracing::debug!(command_id = %command.id, "prediction received ({} chars)", text.len());
        Ok(TierPayload::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingOracle {
        reply: anyhow::Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextOracle for RecordingOracle {
        async fn complete(&self, _system: Option<&str>, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn channel(reply: anyhow::Result<String>) -> (TextPredictionChannel, Arc<RecordingOracle>) {
        let oracle = Arc::new(RecordingOracle {
            reply,
            prompts: Mutex::new(Vec::new()),
        });
        (
            TextPredictionChannel::new(oracle.clone(), PromptsConfig::default()),
            oracle,
        )
    }

    fn intent() -> (Intent, Command) {
        (
            Intent::new(IntentKind::CreateFile, "print hello world", "Creating hello.py").with_file("hello.py"),
            Command::new("hello world script", "+1", "+2"),
        )
    }

    #[tokio::test]
    async fn prediction_is_collapsed_text() {
        let (channel, oracle) = channel(Ok("A file hello.py\n\nthat prints   Hello World.".into()));
        let (intent, command) = intent();

        let payload = channel.execute(&intent, &command).await.unwrap();

        assert_eq!(payload.text, "A file hello.py that prints Hello World.");
        let prompt = oracle.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("create_file"));
        assert!(prompt.contains("File: hello.py"));
    }

    #[tokio::test]
    async fn oracle_failure_is_redacted_failure() {
        let (channel, _) = channel(Err(anyhow::anyhow!("401: Bearer sk-secretsecret")));
        let (intent, command) = intent();

        let err = channel.execute(&intent, &command).await.unwrap_err();
        match err {
            ChannelError::Failed(msg) => assert!(!msg.contains("secretsecret")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_prediction_fails() {
        let (channel, _) = channel(Ok("   ".into()));
        let (intent, command) = intent();
        assert!(matches!(
            channel.execute(&intent, &command).await,
            Err(ChannelError::Failed(_))
        ));
    }
}
