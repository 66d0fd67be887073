use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::formatter::safe_truncate;
use crate::redact::redact_secrets;

/// Provider endpoint and credentials.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(api_key: String, base_url: Option<String>, default_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| default_url.to_string()),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

const MAX_OUTPUT_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.2;

async fn error_for_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = redact_secrets(&response.text().await.unwrap_or_default());
    Err(anyhow::anyhow!(
        "{} API returned {} - {}",
        provider,
        status,
        safe_truncate(&error_text, 800)
    ))
}

/// Join a base URL and a path suffix unless the base already ends with it.
fn endpoint(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(suffix) {
        base.to_string()
    } else {
        format!("{}{}", base, suffix)
    }
}

/// Single-shot `generateContent` call.
pub async fn chat_with_gemini(
    prompt: &str,
    model: &str,
    config: &ProviderConfig,
    system_prompt: Option<&str>,
) -> Result<String> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateRequest {
        contents: Vec<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        system_instruction: Option<Content>,
        generation_config: GenerationConfig,
    }

    #[derive(Serialize, Deserialize, Debug, Default)]
    struct Content {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default)]
        parts: Vec<Part>,
    }

    #[derive(Serialize, Deserialize, Debug)]
    struct Part {
        #[serde(default)]
        text: Option<String>,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerationConfig {
        temperature: f32,
        max_output_tokens: u32,
    }

    #[derive(Deserialize, Debug)]
    struct GenerateResponse {
        #[serde(default)]
        candidates: Vec<Candidate>,
    }

    #[derive(Deserialize, Debug)]
    struct Candidate {
        content: Option<Content>,
    }

    let request = GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(prompt.to_string()),
            }],
        }],
        system_instruction: system_prompt.map(|s| Content {
            role: None,
            parts: vec![Part {
                text: Some(s.to_string()),
            }],
        }),
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    };

    let url = format!(
        "{}/models/{}:generateContent",
        config.base_url.trim_end_matches('/'),
        model
    );
    tracing::debug!("chat_with_gemini: POST {}", url);
    let start = std::time::Instant::now();

    let response = config
        .client()?
        .post(&url)
        .header("x-goog-api-key", &config.api_key)
        .json(&request)
        .send()
        .await
        .context("Gemini API request failed")?;
    tracing::debug!(
        "chat_with_gemini: status={} after {}ms",
        response.status(),
        start.elapsed().as_millis()
    );

    let response = error_for_status("Gemini", response).await?;
    let result: GenerateResponse = response
        .json()
        .await
        .context("failed to parse Gemini response")?;

    let text = result
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(anyhow::anyhow!("Gemini API returned empty content"));
    }
    Ok(text)
}

/// Single-shot chat completion against an OpenAI-compatible endpoint.
pub async fn chat_with_openai(
    prompt: &str,
    model: &str,
    config: &ProviderConfig,
    system_prompt: Option<&str>,
) -> Result<String> {
    #[derive(Serialize)]
    struct ChatRequest {
        model: String,
        messages: Vec<Message>,
        max_tokens: u32,
        temperature: f32,
    }

    #[derive(Serialize)]
    struct Message {
        role: &'static str,
        content: String,
    }

    #[derive(Deserialize, Debug)]
    struct ChatResponse {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize, Debug)]
    struct Choice {
        message: Option<MessageResponse>,
        // legacy completions shape
        text: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    struct MessageResponse {
        content: Option<String>,
    }

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(Message {
            role: "system",
            content: system.to_string(),
        });
    }
    messages.push(Message {
        role: "user",
        content: prompt.to_string(),
    });

    let request = ChatRequest {
        model: model.to_string(),
        messages,
        max_tokens: MAX_OUTPUT_TOKENS,
        temperature: TEMPERATURE,
    };

    let url = endpoint(&config.base_url, "/chat/completions");
    tracing::debug!("chat_with_openai: POST {}", url);

    let response = config
        .client()?
        .post(&url)
        .header("Authorization", format!("Bearer {}", config.api_key))
        .json(&request)
        .send()
        .await
        .context("OpenAI chat request failed")?;

    let response = error_for_status("OpenAI", response).await?;
    let response_text = response.text().await.context("failed to read response body")?;
    tracing::trace!(
        "OpenAI raw response: {}",
        safe_truncate(&redact_secrets(&response_text), 1000)
    );

    let result: ChatResponse =
        serde_json::from_str(&response_text).context("failed to parse OpenAI chat response")?;
    let content = result
        .choices
        .first()
        .and_then(|c| {
            c.message
                .as_ref()
                .and_then(|m| m.content.clone())
                .or_else(|| c.text.clone())
        })
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(anyhow::anyhow!("OpenAI API returned empty content"));
    }
    Ok(content)
}

/// Single-shot Messages API call.
pub async fn chat_with_anthropic(
    prompt: &str,
    model: &str,
    config: &ProviderConfig,
    system_prompt: Option<&str>,
) -> Result<String> {
    #[derive(Serialize)]
    struct ChatRequest {
        model: String,
        max_tokens: u32,
        messages: Vec<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<String>,
    }

    #[derive(Serialize)]
    struct Message {
        role: &'static str,
        content: String,
    }

    #[derive(Deserialize)]
    struct ChatResponse {
        content: Vec<ContentBlock>,
    }

    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(default)]
        text: Option<String>,
    }

    let request = ChatRequest {
        model: model.to_string(),
        max_tokens: MAX_OUTPUT_TOKENS,
        messages: vec![Message {
            role: "user",
            content: prompt.to_string(),
        }],
        system: system_prompt.map(str::to_string),
    };

    let base = config.base_url.trim_end_matches('/');
    let url = if base.ends_with("/messages") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/messages", base)
    } else {
        format!("{}/v1/messages", base)
    };
    tracing::debug!("chat_with_anthropic: POST {}", url);

    let response = config
        .client()?
        .post(&url)
        .header("x-api-key", &config.api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&request)
        .send()
        .await
        .context("Anthropic request failed")?;

    let response = error_for_status("Anthropic", response).await?;
    let result: ChatResponse = response
        .json()
        .await
        .context("failed to parse Anthropic response")?;

    let text = result
        .content
        .into_iter()
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(anyhow::anyhow!("Anthropic API returned empty content"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_does_not_double_suffix() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://localhost:8080/v1/chat/completions", "/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn blank_base_url_uses_default() {
        let config = ProviderConfig::new("k".into(), Some("  ".into()), "https://example.test");
        assert_eq!(config.base_url, "https://example.test");
        assert!(!format!("{:?}", config).contains("\"k\""));
    }
}
