//! Still-frame capture for video saves.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use tokio::time::timeout;
use tracing::debug;

use crate::runtime::{MediaError, VideoPlayback};

/// Videos shorter than this get a single frame.
const SHORT_VIDEO_SECS: f64 = 1.5;

/// Relative positions of the frames taken from longer videos.
const FRAME_POSITIONS: [f64; 3] = [0.1, 0.5, 0.9];

const JPEG_QUALITY: u8 = 95;

/// Where a frame is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameTarget {
    /// Whatever is on screen now.
    Current,
    /// Seek to this many seconds first.
    At(f64),
}

/// Frames to capture for a video of the given duration.
#[must_use]
pub fn plan_frames(duration: Option<f64>) -> Vec<FrameTarget> {
    match duration {
        Some(d) if d.is_finite() && d >= SHORT_VIDEO_SECS => FRAME_POSITIONS
            .iter()
            .map(|fraction| FrameTarget::At(d * fraction))
            .collect(),
        _ => vec![FrameTarget::Current],
    }
}

/// Capture one frame, waiting at most `seek_timeout` for a seek to settle.
///
/// A stalled or failed seek falls back to capturing whatever frame is
/// current.
///
/// # Errors
///
/// Returns an error if the frame itself cannot be read.
pub async fn capture_at(
    playback: &dyn VideoPlayback,
    target: FrameTarget,
    seek_timeout: Duration,
) -> Result<RgbaImage, MediaError> {
    if let FrameTarget::At(seconds) = target {
        match timeout(seek_timeout, playback.seek(seconds)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(seconds, error = %e, "Seek failed, capturing current frame"),
            Err(_) => debug!(seconds, "Seek stalled, capturing current frame"),
        }
    }
    playback.capture_frame()
}

/// Encode a frame as a JPEG `data:` URL.
///
/// # Errors
///
/// Returns an error if the frame cannot be encoded.
pub fn encode_jpeg_data_url(frame: &RgbaImage) -> Result<String, MediaError> {
    let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&bytes)))
}

/// Filename of the `n`th (1-based) frame of a video.
#[must_use]
pub fn frame_filename(video_id: &str, n: usize) -> String {
    format!("{video_id}_frame{n}.jpg")
}
