//! Media capabilities provided by the host page.
//!
//! The DOM only describes elements. Fetching blob contents, decoding an
//! image off-DOM and driving a `<video>` are host services, modelled here as
//! async traits so the save flows can be exercised without a browser.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;
use thiserror::Error;

use crate::dom::{NodeId, Size};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to read blob {url}: {message}")]
    BlobFetch { url: String, message: String },
    #[error("could not determine image dimensions for {0}")]
    Dimensions(String),
    #[error("no playback handle for video element")]
    NoPlayback,
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Bytes behind a `blob:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    /// MIME type reported by the host, if any.
    pub mime: Option<String>,
}

impl Blob {
    /// Inline `data:` URL for transport to the backend.
    ///
    /// Without a reported MIME type the type is sniffed from the bytes, then
    /// guessed from `name_hint`.
    #[must_use]
    pub fn to_data_url(&self, name_hint: &str) -> String {
        let mime = self
            .mime
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| {
                image::guess_format(&self.bytes)
                    .ok()
                    .map(|format| format.to_mime_type().to_string())
            })
            .unwrap_or_else(|| {
                mime_guess::from_path(name_hint)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
        format!("data:{mime};base64,{}", STANDARD.encode(&self.bytes))
    }
}

/// Host services for media elements.
#[async_trait]
pub trait MediaRuntime: Send + Sync {
    /// Read the contents of a `blob:` URL.
    async fn fetch_blob(&self, url: &str) -> Result<Blob, MediaError>;

    /// Load an image off-DOM and report its natural size.
    async fn measure_image_size(&self, url: &str) -> Result<Size, MediaError>;

    /// Playback handle for a `<video>` element, if the host has one.
    fn video(&self, node: NodeId) -> Option<Arc<dyn VideoPlayback>>;
}

/// A live `<video>` element.
#[async_trait]
pub trait VideoPlayback: Send + Sync {
    /// Duration in seconds; `None` while metadata is unknown.
    fn duration(&self) -> Option<f64>;

    fn current_time(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn pause(&self);

    fn play(&self);

    /// Set the playhead without waiting for the seek to settle.
    fn set_current_time(&self, seconds: f64);

    /// Seek and resolve once the frame at `seconds` is ready.
    async fn seek(&self, seconds: f64) -> Result<(), MediaError>;

    /// Current frame at source resolution.
    fn capture_frame(&self) -> Result<RgbaImage, MediaError>;
}

/// Runtime for headless snapshots: nothing can be fetched or played.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRuntime;

#[async_trait]
impl MediaRuntime for NullRuntime {
    async fn fetch_blob(&self, url: &str) -> Result<Blob, MediaError> {
        Err(MediaError::BlobFetch {
            url: url.to_string(),
            message: "no blob store in a static snapshot".to_string(),
        })
    }

    async fn measure_image_size(&self, url: &str) -> Result<Size, MediaError> {
        Err(MediaError::Dimensions(url.to_string()))
    }

    fn video(&self, _node: NodeId) -> Option<Arc<dyn VideoPlayback>> {
        None
    }
}
