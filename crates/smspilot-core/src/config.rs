//! Application configuration.
//!
//! Non-secret settings live in `config.json` under the app data directory and
//! are written with defaults on first run. Secrets only ever come from the
//! environment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::channel::ChannelKind;
use crate::formatter::DEFAULT_MAX_REPLY_CHARS;

pub const APP_DIR_NAME: &str = "smspilot";
pub const CONFIG_FILE_NAME: &str = "config.json";
/// Carriers drop a webhook that has not answered within this window.
pub const WEBHOOK_WINDOW_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data directory available on this platform")]
    NoDataDir,
    #[error("config I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint.
    Openai,
    Anthropic,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Openai => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-2.5-flash",
            ProviderKind::Openai => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// How the single reply leaves the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Reply inline in the webhook response.
    #[default]
    Twiml,
    /// Send through the REST API and answer the webhook with an empty document.
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: ProviderKind,
    /// Empty means the provider's default model.
    pub model: String,
    pub base_url: Option<String>,
    /// Classification budget; past it the classifier degrades to keyword matching.
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: String::new(),
            base_url: None,
            timeout_ms: 4_000,
        }
    }
}

impl OracleConfig {
    pub fn model(&self) -> &str {
        if self.model.trim().is_empty() {
            self.provider.default_model()
        } else {
            self.model.trim()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Tier order, tried first to last.
    pub tiers: Vec<ChannelKind>,
    /// Classification plus every tier must finish inside this, measured from
    /// receipt. Per-step budgets are clamped to what is left.
    pub deadline_ms: u64,
    pub tool_protocol_timeout_ms: u64,
    pub ui_automation_timeout_ms: u64,
    pub text_prediction_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                ChannelKind::ToolProtocol,
                ChannelKind::UiAutomation,
                ChannelKind::TextPrediction,
            ],
            deadline_ms: 12_000,
            tool_protocol_timeout_ms: 6_000,
            ui_automation_timeout_ms: 8_000,
            text_prediction_timeout_ms: 5_000,
        }
    }
}

impl DispatchConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn budget(&self, kind: ChannelKind) -> Duration {
        let ms = match kind {
            ChannelKind::ToolProtocol => self.tool_protocol_timeout_ms,
            ChannelKind::UiAutomation => self.ui_automation_timeout_ms,
            ChannelKind::TextPrediction => self.text_prediction_timeout_ms,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolProtocolConfig {
    /// Tool server executable, spawned once per call.
    pub command: String,
    pub args: Vec<String>,
    /// Exported to the tool server as `SMSPILOT_WORKSPACE`; unset means its current directory.
    pub workspace: Option<PathBuf>,
    /// Editor CLI used by the `open_file` tool.
    pub editor_command: String,
}

impl Default for ToolProtocolConfig {
    fn default() -> Self {
        Self {
            command: "smspilot-mcp".to_string(),
            args: Vec::new(),
            workspace: None,
            editor_command: "cursor".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Case-insensitive substring of the editor window title.
    pub window_title: String,
    pub chat_hotkey: String,
    pub step_delay_ms: u64,
    /// Wait after pressing Enter before reading back.
    pub settle_delay_ms: u64,
    /// Treat a missing read-back as failure instead of a best-effort success.
    pub require_readback: bool,
    pub min_readback_chars: usize,
    pub readback_tail_chars: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_title: "cursor".to_string(),
            chat_hotkey: "ctrl+l".to_string(),
            step_delay_ms: 500,
            settle_delay_ms: 3_000,
            require_readback: false,
            min_readback_chars: 20,
            readback_tail_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub reply_mode: ReplyMode,
    pub max_reply_chars: usize,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            reply_mode: ReplyMode::Twiml,
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// SQLite execution log; defaults to `<data dir>/smspilot.db`.
    pub database_path: Option<PathBuf>,
    /// Rolling log files; defaults to `<data dir>/logs`.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub oracle: OracleConfig,
    pub dispatch: DispatchConfig,
    pub tool_protocol: ToolProtocolConfig,
    pub ui: UiConfig,
    pub sms: SmsConfig,
    pub log: LogConfig,
}

/// `<platform data dir>/smspilot`
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoDataDir)
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load the config at `path`, writing defaults there first if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            let config = AppConfig::default();
            config.save(path)?;
            tracing::info!("wrote default config to {:?}", path);
            config
        };
        config.validate()?;
        Ok(config)
    }

    /// Atomic write: temp file then rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).map_err(io_err)?;
        // rename does not overwrite on Windows
        if cfg!(windows) && path.exists() {
            std::fs::remove_file(path).map_err(io_err)?;
        }
        std::fs::rename(&temp_path, path).map_err(io_err)?;
        tracing::debug!("config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.tiers.is_empty() {
            return Err(ConfigError::Invalid("dispatch.tiers must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for tier in &self.dispatch.tiers {
            if !seen.insert(*tier) {
                return Err(ConfigError::Invalid(format!(
                    "dispatch.tiers lists {} more than once",
                    tier
                )));
            }
            if self.dispatch.budget(*tier).is_zero() {
                return Err(ConfigError::Invalid(format!("timeout for {} must be non-zero", tier)));
            }
        }
        if self.oracle.timeout_ms == 0 {
            return Err(ConfigError::Invalid("oracle.timeout_ms must be non-zero".into()));
        }
        if self.dispatch.deadline_ms == 0 || self.dispatch.deadline_ms >= WEBHOOK_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "dispatch.deadline_ms must be between 1 and {} (the webhook window)",
                WEBHOOK_WINDOW_MS - 1
            )));
        }
        if self.oracle.timeout_ms >= self.dispatch.deadline_ms {
            return Err(ConfigError::Invalid(
                "oracle.timeout_ms leaves no time for dispatch.deadline_ms".into(),
            ));
        }
        if self.sms.max_reply_chars < 16 {
            return Err(ConfigError::Invalid("sms.max_reply_chars must be at least 16".into()));
        }
        if self.tool_protocol.command.trim().is_empty()
            && self.dispatch.tiers.contains(&ChannelKind::ToolProtocol)
        {
            return Err(ConfigError::Invalid("tool_protocol.command is empty".into()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.log.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_data_dir()?.join("smspilot.db")),
        }
    }

    pub fn log_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.log.log_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(app_data_dir()?.join("logs")),
        }
    }
}

/// Carrier account credentials.
#[derive(Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
}

impl std::fmt::Debug for TwilioCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("phone_number", &self.phone_number)
            .finish()
    }
}

/// Secrets read from the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub twilio: Option<TwilioCredentials>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("gemini_api_key", &self.gemini_api_key.is_some())
            .field("openai_api_key", &self.openai_api_key.is_some())
            .field("anthropic_api_key", &self.anthropic_api_key.is_some())
            .field("twilio", &self.twilio)
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let twilio = match (
            lookup("TWILIO_ACCOUNT_SID"),
            lookup("TWILIO_AUTH_TOKEN"),
            lookup("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(phone_number)) => Some(TwilioCredentials {
                account_sid,
                auth_token,
                phone_number,
            }),
            _ => None,
        };
        Self {
            gemini_api_key: lookup(ProviderKind::Gemini.api_key_var()),
            openai_api_key: lookup(ProviderKind::Openai.api_key_var()),
            anthropic_api_key: lookup(ProviderKind::Anthropic.api_key_var()),
            twilio,
        }
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::Gemini => self.gemini_api_key.as_deref(),
            ProviderKind::Openai => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = AppConfig::load_or_init(&path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(config.dispatch.tiers.len(), 3);
        assert_eq!(config.sms.max_reply_chars, 1600);
        assert_eq!(config.oracle.model(), "gemini-2.5-flash");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "dispatch": { "tiers": ["ui_automation", "text_prediction"] }, "sms": { "reply_mode": "rest" } }"#,
        )
        .unwrap();

        let config = AppConfig::load_or_init(&path).unwrap();

        assert_eq!(
            config.dispatch.tiers,
            vec![ChannelKind::UiAutomation, ChannelKind::TextPrediction]
        );
        assert_eq!(config.sms.reply_mode, ReplyMode::Rest);
        assert_eq!(config.ui.window_title, "cursor");
        assert_eq!(config.dispatch.budget(ChannelKind::UiAutomation), Duration::from_secs(8));
    }

    #[test]
    fn rejects_empty_and_duplicate_tiers() {
        let mut config = AppConfig::default();
        config.dispatch.tiers.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.dispatch.tiers = vec![ChannelKind::UiAutomation, ChannelKind::UiAutomation];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_budget() {
        let mut config = AppConfig::default();
        config.dispatch.ui_automation_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deadline_must_fit_the_webhook_window() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.dispatch.deadline_ms < WEBHOOK_WINDOW_MS);

        config.dispatch.deadline_ms = 30_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.dispatch.deadline_ms = 0;
        assert!(config.validate().is_err());

        config.dispatch.deadline_ms = 3_000;
        config.oracle.timeout_ms = 3_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load_or_init(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn secrets_need_full_twilio_triple() {
        let vars: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "g-key"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "token"),
        ]
        .into_iter()
        .collect();
        let secrets = Secrets::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(secrets.api_key(ProviderKind::Gemini), Some("g-key"));
        assert!(secrets.api_key(ProviderKind::Openai).is_none());
        assert!(secrets.twilio.is_none());
        assert!(!format!("{:?}", secrets).contains("g-key"));
    }
}
