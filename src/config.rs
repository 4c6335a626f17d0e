//! Configuration file parser for ~/.config/tagchat/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the top level contains potential typos.
//!
//! The two chat backends disagree on which feed kind polls slowly and which
//! kind a bare `/tag/<tag>` URL means. Neither is hard-coded: each backend
//! carries its own [`KindProfile`] defaults and `[chat.kinds]` overrides any
//! part of it.

use crate::chat::FeedKind;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Lower bound for every timer period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL_MS: u64 = 10;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which remote contract the chat engine speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// JSON REST API with a scraped client credential
    #[default]
    Api,
    /// Tag page and AJAX fragment scraping
    Scrape,
}

impl Backend {
    /// Poll cadence and default kind each backend was designed around.
    pub fn default_profile(self) -> KindProfile {
        match self {
            Backend::Api => KindProfile {
                best_interval: Duration::from_secs(10),
                all_interval: Duration::from_secs(1),
                default_kind: FeedKind::All,
            },
            Backend::Scrape => KindProfile {
                best_interval: Duration::from_secs(1),
                all_interval: Duration::from_secs(10),
                default_kind: FeedKind::Best,
            },
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "api" => Ok(Backend::Api),
            "scrape" => Ok(Backend::Scrape),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Resolved per-kind poll intervals plus the kind used when a URL names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    pub best_interval: Duration,
    pub all_interval: Duration,
    pub default_kind: FeedKind,
}

impl KindProfile {
    pub fn poll_interval(&self, kind: FeedKind) -> Duration {
        match kind {
            FeedKind::Best => self.best_interval,
            FeedKind::All => self.all_interval,
        }
    }
}

/// Optional `[chat.kinds]` overrides on top of the backend's profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KindOverrides {
    pub best_interval_ms: Option<u64>,
    pub all_interval_ms: Option<u64>,
    pub default_kind: Option<FeedKind>,
}

/// `[chat.api]` endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST API root, without trailing slash
    pub base_url: String,
    /// Public script bundle carrying the client id and secret literals
    pub script_asset_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wykop.pl/api/v3".to_string(),
            script_asset_url: "https://wykop.pl/static/js/vendor.62eaf5fdda64ac237769.js"
                .to_string(),
        }
    }
}

/// `[chat.scrape]` endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Site root serving tag pages and AJAX fragments, without trailing slash
    pub base_url: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wykop.pl".to_string(),
        }
    }
}

/// `[chat]` section: engine behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub backend: Backend,
    /// Delay between two revealed messages.
    pub emission_interval_ms: u64,
    /// Capacity of the queue between the poll task and the pacer.
    pub queue_capacity: usize,
    /// How many message ids a session remembers for deduplication.
    pub seen_capacity: usize,
    pub request_timeout_secs: u64,
    pub kinds: KindOverrides,
    pub api: ApiConfig,
    pub scrape: ScrapeConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Api,
            emission_interval_ms: 1000,
            queue_capacity: 256,
            seen_capacity: 4096,
            request_timeout_secs: 15,
            kinds: KindOverrides::default(),
            api: ApiConfig::default(),
            scrape: ScrapeConfig::default(),
        }
    }
}

impl ChatConfig {
    /// The backend's profile with `[chat.kinds]` overrides applied.
    pub fn kind_profile(&self) -> KindProfile {
        let mut profile = self.backend.default_profile();
        if let Some(ms) = self.kinds.best_interval_ms {
            profile.best_interval = clamp_interval(ms);
        }
        if let Some(ms) = self.kinds.all_interval_ms {
            profile.all_interval = clamp_interval(ms);
        }
        if let Some(kind) = self.kinds.default_kind {
            profile.default_kind = kind;
        }
        profile
    }

    pub fn emission_interval(&self) -> Duration {
        clamp_interval(self.emission_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    pub fn seen_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.seen_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

fn clamp_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.max(MIN_INTERVAL_MS))
}

/// `[video]` section: stream URL resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Tokenizer endpoint; the numeric video id is appended as a path segment
    pub tokenizer_url: String,
    pub request_timeout_secs: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            tokenizer_url: "https://api.tvp.pl/tokenizer/token".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl VideoConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub video: VideoConfig,
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown top-level keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["chat", "video"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            backend = ?config.chat.backend,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
