//! Save flows for images and videos.

mod frames;
mod orchestrator;
mod queue;

use thiserror::Error;

pub use frames::{capture_at, encode_jpeg_data_url, frame_filename, plan_frames, FrameTarget};
pub use orchestrator::Orchestrator;
pub use queue::{SaveQueue, SaveTicket};

use crate::backend::BackendError;
use crate::runtime::MediaError;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("media element is no longer on the page")]
    MediaDetached,
    #[error("media element has no usable source")]
    NoSource,
    #[error("save request was dropped before it completed")]
    Dropped,
}
