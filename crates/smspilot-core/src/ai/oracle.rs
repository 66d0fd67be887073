//! The AI text service seen as a prompt-in, text-out oracle.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::provider::{chat_with_anthropic, chat_with_gemini, chat_with_openai, ProviderConfig};
use crate::config::{OracleConfig, ProviderKind, Secrets};

#[async_trait]
pub trait TextOracle: Send + Sync {
    /// One prompt, one reply. No memory between calls.
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String>;
}

pub struct ProviderOracle {
    kind: ProviderKind,
    model: String,
    config: ProviderConfig,
}

impl ProviderOracle {
    pub fn new(kind: ProviderKind, model: &str, config: ProviderConfig) -> Self {
        Self {
            kind,
            model: model.to_string(),
            config,
        }
    }
}

#[async_trait]
impl TextOracle for ProviderOracle {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String> {
        match self.kind {
            ProviderKind::Gemini => chat_with_gemini(prompt, &self.model, &self.config, system).await,
            ProviderKind::Openai => chat_with_openai(prompt, &self.model, &self.config, system).await,
            ProviderKind::Anthropic => {
                chat_with_anthropic(prompt, &self.model, &self.config, system).await
            }
        }
    }
}

/// Oracle used when no API key is configured; every call fails.
pub struct UnconfiguredOracle {
    reason: String,
}

#[async_trait]
impl TextOracle for UnconfiguredOracle {
    async fn complete(&self, _system: Option<&str>, _prompt: &str) -> Result<String> {
        Err(anyhow::anyhow!("{}", self.reason))
    }
}

/// Build the oracle for the configured provider.
///
/// A missing API key is not fatal: the classifier degrades to keyword
/// matching and the prediction tier fails over.
pub fn build_oracle(config: &OracleConfig, secrets: &Secrets) -> Arc<dyn TextOracle> {
    match secrets.api_key(config.provider) {
        Some(key) => {
            let provider = ProviderConfig::new(
                key.to_string(),
                config.base_url.clone(),
                config.provider.default_base_url(),
            )
            .with_timeout(config.timeout());
            tracing::info!(provider = ?config.provider, model = config.model(), "oracle configured");
            Arc::new(ProviderOracle::new(config.provider, config.model(), provider))
        }
        None => {
            let reason = format!("{} is not set", config.provider.api_key_var());
            tracing::warn!("oracle disabled: {}", reason);
            Arc::new(UnconfiguredOracle { reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_yields_failing_oracle() {
        let oracle = build_oracle(&OracleConfig::default(), &Secrets::default());
        let err = oracle.complete(None, "hi").await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
