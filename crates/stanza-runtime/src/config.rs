//! Configuration schema and loader.
//!
//! Configuration is layered with figment, later sources overriding earlier
//! ones:
//!
//! 1. Built-in defaults
//! 2. `stanza.toml` in the working directory (or an explicit path)
//! 3. Environment variables (`STANZA_*`, `__` as section separator)
//!
//! ```text
//! STANZA_TOKEN=123:abc
//! STANZA_POLLING__TIMEOUT_SECS=50
//! STANZA_WEBHOOK__CHECK_SOURCE_IP=false
//! ```

use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use stanza_core::KeyStrategy;
use stanza_transport::WebhookAuth;

use crate::error::RuntimeResult;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StanzaConfig {
    /// The bot's secret token, used for the platform API and as the
    /// webhook path token.
    #[serde(default)]
    pub token: String,

    /// Polling driver settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Webhook driver settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Conversation continuation settings.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StanzaConfig {
    /// Loads configuration from `stanza.toml` and `STANZA_*` environment
    /// variables over the built-in defaults.
    pub fn load() -> RuntimeResult<Self> {
        Self::load_from("stanza.toml")
    }

    /// Loads configuration with an explicit config file path.
    pub fn load_from(path: &str) -> RuntimeResult<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("STANZA_").split("__"))
            .extract()?;
        Ok(config)
    }
}

/// Settings for the long-poll ingestion driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Maximum number of updates per batch.
    #[serde(default)]
    pub limit: Option<u8>,

    /// Long-poll timeout in seconds, passed straight through to the
    /// platform request.
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u32,

    /// Pause before retrying after a failed fetch, in seconds.
    #[serde(default = "default_retry_pause_secs")]
    pub retry_pause_secs: u64,

    /// Update types the platform should deliver; `None` means all.
    #[serde(default)]
    pub allowed_updates: Option<Vec<String>>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            limit: None,
            timeout_secs: default_poll_timeout_secs(),
            retry_pause_secs: default_retry_pause_secs(),
            allowed_updates: None,
        }
    }
}

impl PollingConfig {
    /// The retry pause as a `Duration`.
    pub fn retry_pause(&self) -> Duration {
        Duration::from_secs(self.retry_pause_secs)
    }
}

fn default_poll_timeout_secs() -> u32 {
    30
}

fn default_retry_pause_secs() -> u64 {
    5
}

/// Settings for the webhook ingestion drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Address the async listener binds.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Expected last path segment of webhook URLs. Falls back to the bot
    /// token when unset.
    #[serde(default)]
    pub secret_token: Option<String>,

    /// Whether the source address must fall inside the platform's
    /// published IPv4 ranges.
    #[serde(default = "default_true")]
    pub check_source_ip: bool,

    /// Whether the path token is verified at all.
    #[serde(default = "default_true")]
    pub check_path_token: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            secret_token: None,
            check_source_ip: default_true(),
            check_path_token: default_true(),
        }
    }
}

impl WebhookConfig {
    /// Builds the authorizer these settings describe.
    ///
    /// `bot_token` is used as the path token when no dedicated secret is
    /// configured.
    pub fn auth(&self, bot_token: &str) -> WebhookAuth {
        let mut auth = WebhookAuth::new().check_source_ip(self.check_source_ip);
        if self.check_path_token {
            let secret = self.secret_token.as_deref().unwrap_or(bot_token);
            auth = auth.with_secret_token(secret);
        }
        auth
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_true() -> bool {
    true
}

/// Settings for conversation continuation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConversationConfig {
    /// How conversation keys are derived from updates.
    #[serde(default)]
    pub key_strategy: KeyStrategyConfig,

    /// Optional time-to-live for pending conversation entries, in seconds.
    /// Unset means entries persist until explicitly ended.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl ConversationConfig {
    /// The TTL as a `Duration`, if configured.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Serializable mirror of [`KeyStrategy`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategyConfig {
    /// One conversation per chat.
    #[default]
    Chat,
    /// One conversation per user within each chat.
    ChatAndUser,
}

impl From<KeyStrategyConfig> for KeyStrategy {
    fn from(config: KeyStrategyConfig) -> Self {
        match config {
            KeyStrategyConfig::Chat => Self::Chat,
            KeyStrategyConfig::ChatAndUser => Self::ChatAndUser,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `stanza=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Single-line compact output.
    #[default]
    Compact,
    /// Multi-line human-readable output.
    Pretty,
    /// The default `tracing_subscriber::fmt` layout.
    Full,
}
