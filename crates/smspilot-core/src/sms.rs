//! Outbound SMS through the Twilio REST API, and TwiML replies.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::TwilioCredentials;
use crate::formatter::safe_truncate;
use crate::redact::redact_secrets;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send one message, returning the provider's message id.
    async fn send(&self, to: &str, body: &str) -> Result<String>;
}

pub struct TwilioClient {
    credentials: TwilioCredentials,
    base_url: String,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new(credentials: TwilioCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            credentials,
            base_url: TWILIO_API_BASE.to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn from_number(&self) -> &str {
        &self.credentials.phone_number
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.credentials.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct MessageResource {
            sid: String,
        }

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .form(&[
                ("To", to),
                ("From", self.credentials.phone_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .context("Twilio request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = redact_secrets(&response.text().await.unwrap_or_default());
            return Err(anyhow::anyhow!(
                "Twilio API returned {} - {}",
                status,
                safe_truncate(&error_text, 500)
            ));
        }

        let message: MessageResource = response
            .json()
            .await
            .context("failed to parse Twilio response")?;
        tracing::info!(sid = %message.sid, "sms sent");
        Ok(message.sid)
    }
}

pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\n' | '\r' | '\t') => {}
            c => out.push(c),
        }
    }
    out
}

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// TwiML document replying with exactly one message.
pub fn twiml_message(body: &str) -> String {
    format!(
        "{}<Response><Message>{}</Message></Response>",
        XML_DECL,
        xml_escape(body)
    )
}

/// TwiML document that sends nothing.
pub fn twiml_empty() -> String {
    format!("{}<Response></Response>", XML_DECL)
}
