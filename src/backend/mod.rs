//! The storage backend the engine saves media to.
//!
//! The backend sits behind a host-provided channel that can disappear (for
//! instance when the extension is reloaded under a live page). Every call goes
//! through [`BackendChannel`], which checks context validity first so a dead
//! channel surfaces as [`BackendError::ContextInvalidated`] instead of a
//! transport failure.

mod http;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use http::HttpBackend;
pub use types::{
    LogEntry, PingResponse, SaveRequest, SaveResponse, SavedRecord, SavedStatus, StatusQuery,
    VideoFrameMeta,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("extension context invalidated")]
    ContextInvalidated,
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether retrying cannot help until the page is reloaded.
    #[must_use]
    pub fn is_context_invalid(&self) -> bool {
        matches!(self, Self::ContextInvalidated)
    }
}

/// Message contract with the storage backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether the host runtime context is still usable.
    fn context_valid(&self) -> bool {
        true
    }

    async fn check_saved_status(&self, query: &StatusQuery) -> Result<SavedStatus, BackendError>;

    async fn ping(&self) -> Result<PingResponse, BackendError>;

    async fn save_image(&self, request: &SaveRequest) -> Result<SaveResponse, BackendError>;

    async fn log_external_entry(&self, entry: &LogEntry) -> Result<(), BackendError>;
}

/// Context-checked handle to a [`Backend`].
#[derive(Clone)]
pub struct BackendChannel {
    inner: Arc<dyn Backend>,
}

impl BackendChannel {
    #[must_use]
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self { inner }
    }

    fn guard(&self) -> Result<(), BackendError> {
        if self.inner.context_valid() {
            Ok(())
        } else {
            Err(BackendError::ContextInvalidated)
        }
    }

    /// Look up whether media was saved before.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is invalid or the backend fails.
    pub async fn check_saved_status(&self, query: &StatusQuery) -> Result<SavedStatus, BackendError> {
        self.guard()?;
        self.inner.check_saved_status(query).await
    }

    /// Verify the backend answers before sending real work.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unreachable`] if the ping fails or is answered
    /// without success.
    pub async fn ensure_reachable(&self) -> Result<(), BackendError> {
        self.guard()?;
        match self.inner.ping().await {
            Ok(PingResponse { success: true }) => Ok(()),
            Ok(_) => Err(BackendError::Unreachable("ping was not acknowledged".to_string())),
            Err(BackendError::ContextInvalidated) => Err(BackendError::ContextInvalidated),
            Err(e) => {
                debug!(error = %e, "Backend ping failed");
                Err(BackendError::Unreachable(e.to_string()))
            }
        }
    }

    /// Persist one image or frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is invalid or the backend fails.
    pub async fn save_image(&self, request: &SaveRequest) -> Result<SaveResponse, BackendError> {
        self.guard()?;
        self.inner.save_image(request).await
    }

    /// Forward a log record.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is invalid or the backend fails.
    pub async fn log_external_entry(&self, entry: &LogEntry) -> Result<(), BackendError> {
        self.guard()?;
        self.inner.log_external_entry(entry).await
    }
}

impl std::fmt::Debug for BackendChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendChannel")
            .field("context_valid", &self.inner.context_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingBackend {
        invalid: AtomicBool,
        ping_ok: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Backend for CountingBackend {
        fn context_valid(&self) -> bool {
            !self.invalid.load(Ordering::SeqCst)
        }

        async fn check_saved_status(&self, _query: &StatusQuery) -> Result<SavedStatus, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SavedStatus {
                is_saved: false,
                record: None,
            })
        }

        async fn ping(&self) -> Result<PingResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PingResponse {
                success: self.ping_ok.load(Ordering::SeqCst),
            })
        }

        async fn save_image(&self, _request: &SaveRequest) -> Result<SaveResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Rejected("nope".to_string()))
        }

        async fn log_external_entry(&self, _entry: &LogEntry) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_invalid_context_short_circuits() {
        let backend = Arc::new(CountingBackend::default());
        backend.invalid.store(true, Ordering::SeqCst);
        let channel = BackendChannel::new(backend.clone());

        let err = channel.ensure_reachable().await.unwrap_err();
        assert!(err.is_context_invalid());
        let query = StatusQuery::new(
            crate::media::MediaKind::Image,
            None,
            "@a".to_string(),
            None,
            "blob:x".to_string(),
        );
        assert!(channel.check_saved_status(&query).await.unwrap_err().is_context_invalid());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_ping_is_unreachable() {
        let backend = Arc::new(CountingBackend::default());
        let channel = BackendChannel::new(backend.clone());
        assert!(matches!(
            channel.ensure_reachable().await,
            Err(BackendError::Unreachable(_))
        ));

        backend.ping_ok.store(true, Ordering::SeqCst);
        assert!(channel.ensure_reachable().await.is_ok());
    }
}
