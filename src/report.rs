//! Page-level error reporting.
//!
//! Uncaught script errors and unhandled rejections from the page are
//! filtered for known noise and forwarded to the backend's log sink. When the
//! backend cannot take them they are kept as JSON files in a local directory,
//! one file per entry id.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{BackendChannel, LogEntry};

static NOISY_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^script error\.?$|ResizeObserver loop|Extension context invalidated|Non-Error promise rejection captured|Receiving end does not exist",
    )
    .unwrap()
});

/// Minified third-party and site bundles.
static NOISY_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"abs\.twimg\.com/responsive-web/|/[\w-]+\.[0-9a-f]{6,}\.js(?:$|[?#])|\.min\.js(?:$|[?#])")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorKind {
    Script,
    UnhandledRejection,
}

/// An error raised by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageError {
    pub kind: PageErrorKind,
    pub message: String,
    /// Script URL the error came from.
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stack: Option<String>,
}

impl PageError {
    pub fn script(message: impl Into<String>, source: Option<&str>) -> Self {
        Self {
            kind: PageErrorKind::Script,
            message: message.into(),
            source: source.map(str::to_string),
            line: None,
            column: None,
            stack: None,
        }
    }

    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            kind: PageErrorKind::UnhandledRejection,
            message: message.into(),
            source: None,
            line: None,
            column: None,
            stack: None,
        }
    }

    /// Whether this matches a known-noisy signature.
    #[must_use]
    pub fn is_noisy(&self) -> bool {
        let message = self.message.trim();
        message.is_empty()
            || NOISY_MESSAGE.is_match(message)
            || self.source.as_deref().is_some_and(|s| NOISY_SOURCE.is_match(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Known noise, not reported.
    Suppressed,
    Forwarded,
    /// The backend refused; the entry was written to this file.
    StoredLocally(PathBuf),
    /// Neither the backend nor the local store took the entry.
    Dropped,
}

#[derive(Debug, Clone)]
pub struct ErrorReporter {
    channel: BackendChannel,
    fallback_dir: PathBuf,
}

impl ErrorReporter {
    #[must_use]
    pub fn new(channel: BackendChannel, fallback_dir: PathBuf) -> Self {
        Self {
            channel,
            fallback_dir,
        }
    }

    pub async fn report(&self, error: PageError) -> ReportOutcome {
        if error.is_noisy() {
            debug!(message = %error.message, "Suppressed noisy page error");
            return ReportOutcome::Suppressed;
        }

        let entry = build_entry(&error);
        match self.channel.log_external_entry(&entry).await {
            Ok(()) => ReportOutcome::Forwarded,
            Err(e) => {
                debug!(id = %entry.id, error = %e, "Log forwarding failed, storing locally");
                match store_entry(&self.fallback_dir, &entry).await {
                    Ok(path) => ReportOutcome::StoredLocally(path),
                    Err(e) => {
                        warn!(id = %entry.id, error = %e, "Failed to store log entry");
                        ReportOutcome::Dropped
                    }
                }
            }
        }
    }
}

fn build_entry(error: &PageError) -> LogEntry {
    let now = Utc::now();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    let message = match error.kind {
        PageErrorKind::Script => error.message.clone(),
        PageErrorKind::UnhandledRejection => format!("Unhandled rejection: {}", error.message),
    };
    LogEntry {
        id: format!("log_{}_{suffix}", now.timestamp_millis()),
        timestamp: now,
        level: "error".to_string(),
        message,
        context: serde_json::to_value(error).unwrap_or_default(),
    }
}

async fn store_entry(dir: &Path, entry: &LogEntry) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", entry.id));
    let body = serde_json::to_vec_pretty(entry)?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_filter() {
        assert!(PageError::script("Script error.", None).is_noisy());
        assert!(PageError::script("ResizeObserver loop limit exceeded", None).is_noisy());
        assert!(PageError::rejection("Extension context invalidated.").is_noisy());
        assert!(PageError::script(
            "x is undefined",
            Some("https://abs.twimg.com/responsive-web/client-web/main.0a1b2c3d.js")
        )
        .is_noisy());
        assert!(PageError::script("boom", Some("https://cdn.example.com/lib.min.js")).is_noisy());
        assert!(!PageError::script("Cannot read properties of null", Some("content.js")).is_noisy());
    }

    #[test]
    fn test_entry_shape() {
        let entry = build_entry(&PageError::rejection("timeout"));
        assert!(entry.id.starts_with("log_"));
        assert_eq!(entry.id.split('_').count(), 3);
        assert_eq!(entry.message, "Unhandled rejection: timeout");
        assert_eq!(entry.context["kind"], "unhandled_rejection");
    }
}
