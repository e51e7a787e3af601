use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::media::MediaThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Backend
    pub backend_url: String,
    pub backend_timeout: Duration,
    pub status_check_timeout: Duration,

    // Scanning
    pub scan_debounce: Duration,
    pub navigation_poll: Duration,
    pub min_image_size: u32,
    pub min_video_size: u32,

    // Saving
    pub seek_timeout: Duration,
    pub frame_dispatch_delay: Duration,
    pub queue_idle: Duration,

    // Error reporting
    pub log_fallback_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Backend
            backend_url: env_or_default("BACKEND_URL", "http://127.0.0.1:8787"),
            backend_timeout: parse_env_millis("BACKEND_TIMEOUT_MS", 10_000)?,
            status_check_timeout: parse_env_millis("STATUS_CHECK_TIMEOUT_MS", 3_000)?,

            // Scanning
            scan_debounce: parse_env_millis("SCAN_DEBOUNCE_MS", 250)?,
            navigation_poll: parse_env_millis("NAVIGATION_POLL_MS", 1_000)?,
            min_image_size: parse_env_u32("MIN_IMAGE_SIZE", 50)?,
            min_video_size: parse_env_u32("MIN_VIDEO_SIZE", 30)?,

            // Saving
            seek_timeout: parse_env_millis("SEEK_TIMEOUT_MS", 800)?,
            frame_dispatch_delay: parse_env_millis("FRAME_DISPATCH_DELAY_MS", 150)?,
            queue_idle: parse_env_millis("QUEUE_IDLE_MS", 30_000)?,

            // Error reporting
            log_fallback_dir: PathBuf::from(env_or_default("LOG_FALLBACK_DIR", "./data/logs")),
        })
    }

    /// Short timings for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            backend_url: "http://127.0.0.1:0".to_string(),
            backend_timeout: Duration::from_secs(2),
            status_check_timeout: Duration::from_millis(200),
            scan_debounce: Duration::from_millis(20),
            navigation_poll: Duration::from_millis(50),
            min_image_size: 50,
            min_video_size: 30,
            seek_timeout: Duration::from_millis(100),
            frame_dispatch_delay: Duration::from_millis(1),
            queue_idle: Duration::from_millis(200),
            log_fallback_dir: std::env::temp_dir().join("media-save-overlay-logs"),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "BACKEND_URL".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if url::Url::parse(&self.backend_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "BACKEND_URL".to_string(),
                message: format!("not a valid URL: '{}'", self.backend_url),
            });
        }
        if self.navigation_poll.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "NAVIGATION_POLL_MS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.seek_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SEEK_TIMEOUT_MS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.queue_idle.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "QUEUE_IDLE_MS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn thresholds(&self) -> MediaThresholds {
        MediaThresholds {
            min_image: f64::from(self.min_image_size),
            min_video: f64::from(self.min_video_size),
        }
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_millis(name: &str, default: u64) -> Result<Duration, ConfigError> {
    parse_env_u64(name, default).map(Duration::from_millis)
}
