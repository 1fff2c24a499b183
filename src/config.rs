//! Configuration and settings management
//!
//! Loads settings from environment variables (optionally layered over
//! `config/*` files) and defines the fixed tunables of the checker.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Telegram user id of the bot owner (may mutate the allow-list)
    pub owner_id: i64,

    /// Chat that receives hit notifications
    pub hits_chat_id: i64,

    /// Optional privileged group: members of this chat may use the checker
    pub allowed_chat_id: Option<i64>,

    /// Base URL of the profile-lookup endpoint
    #[serde(default = "default_profile_api_url")]
    pub profile_api_url: String,

    /// Number of result lines accumulated before a batch is flushed
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u32,

    /// Lower jitter bound between consecutive probes, in milliseconds
    #[serde(default = "default_request_delay_min_ms")]
    pub request_delay_min_ms: u64,

    /// Upper jitter bound between consecutive probes, in milliseconds
    #[serde(default = "default_request_delay_max_ms")]
    pub request_delay_max_ms: u64,

    /// Minimum interval between outbound Telegram messages, in milliseconds
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,
}

fn default_profile_api_url() -> String {
    "https://api-cops.criticalforce.fi/api/public/profile".to_string()
}

const fn default_batch_size() -> usize {
    10
}

const fn default_max_file_size() -> u32 {
    1_000_000
}

const fn default_request_delay_min_ms() -> u64 {
    500
}

const fn default_request_delay_max_ms() -> u64 {
    2000
}

const fn default_message_delay_ms() -> u64 {
    1000
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset.
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Validate settings that have no sensible fallback.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message("telegram_token is empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Message(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.request_delay_min_ms > self.request_delay_max_ms {
            return Err(ConfigError::Message(
                "request_delay_min_ms exceeds request_delay_max_ms".to_string(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Message(
                "max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Jitter bounds between consecutive probe calls
    #[must_use]
    pub const fn request_delay_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.request_delay_min_ms),
            Duration::from_millis(self.request_delay_max_ms),
        )
    }

    /// Minimum interval between outbound messages
    #[must_use]
    pub const fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }
}

// Probe configuration
/// Total attempts per username check (first try included)
pub const PROBE_MAX_ATTEMPTS: u32 = 3;
/// Per-attempt request timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Delay before retrying an ordinary transient failure
pub const PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Extended delay before retrying after a 403
pub const PROBE_BLOCKED_DELAY: Duration = Duration::from_secs(2);
/// Error code the endpoint returns for a profile that does not exist
pub const PROFILE_NOT_FOUND_ERROR_CODE: i64 = 53;
/// Number of pre-generated User-Agent values to rotate through
pub const USER_AGENT_POOL_SIZE: usize = 1000;

// Session lifecycle
/// Sessions idle longer than this are torn down by the reaper
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);
/// Interval between reaper sweeps
pub const REAPER_PERIOD: Duration = Duration::from_secs(1800);

// Outbound messaging
/// Maximum characters per outbound message chunk (Telegram limit is 4096,
/// kept below it for safety)
pub const MESSAGE_CHUNK_LIMIT: usize = 4000;
/// Cooldown between "access denied" notices to the same user, seconds
pub const UNAUTHORIZED_COOLDOWN_SECS: u64 = 1200;
/// Maximum tracked unauthorized users
pub const UNAUTHORIZED_CACHE_MAX_SIZE: u64 = 10_000;

// Telegram API retry policy
/// Initial backoff for retried Telegram API operations, milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling for retried Telegram API operations, milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Retry attempts for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
