//! HTTP transport for the backend message contract.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::{LogEntry, PingResponse, SaveRequest, SaveResponse, SavedStatus, StatusQuery};
use super::{Backend, BackendError};
use crate::config::Config;

/// Backend reached over HTTP, one JSON endpoint per message.
#[derive(Debug)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    valid: AtomicBool,
}

impl HttpBackend {
    /// Create a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.backend_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            valid: AtomicBool::new(true),
        })
    }

    /// Mark the channel dead; every later call fails with
    /// [`BackendError::ContextInvalidated`].
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, BackendError> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(url = %url, "Backend request");
        let response = self.http.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(BackendError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn context_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    async fn check_saved_status(&self, query: &StatusQuery) -> Result<SavedStatus, BackendError> {
        self.post("status", query).await
    }

    async fn ping(&self) -> Result<PingResponse, BackendError> {
        self.post("ping", &serde_json::json!({})).await
    }

    async fn save_image(&self, request: &SaveRequest) -> Result<SaveResponse, BackendError> {
        self.post("save", request).await
    }

    async fn log_external_entry(&self, entry: &LogEntry) -> Result<(), BackendError> {
        let response: PingResponse = self.post("log", entry).await?;
        if response.success {
            Ok(())
        } else {
            Err(BackendError::Rejected("log entry not accepted".to_string()))
        }
    }
}
