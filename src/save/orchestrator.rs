use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::frames::{capture_at, encode_jpeg_data_url, frame_filename, plan_frames};
use super::queue::SaveTicket;
use super::SaveError;
use crate::backend::{BackendError, SaveRequest, SaveResponse, VideoFrameMeta};
use crate::controls::{ClickBinding, ControlState, Controls};
use crate::dom::NodeId;
use crate::media::{normalize_image_url, resolve_author, resolve_tweet_id, resolve_video_source_url, MediaKind};
use crate::notify::{Notice, NoticeLevel};
use crate::runtime::{MediaError, VideoPlayback};
use crate::saver::Services;

const UNREACHABLE_MESSAGE: &str = "Could not connect to the save service";
const CONTEXT_INVALID_MESSAGE: &str = "Extension was reloaded; refresh the page to save";
const IMAGE_DATA_MESSAGE: &str = "Could not read image data";
const FRAME_CAPTURE_MESSAGE: &str = "Could not capture video frame";

/// What a finished save reports to the user.
#[derive(Debug)]
struct Saved {
    message: String,
    warning: Option<String>,
}

/// Post context shared by every request of one save.
struct Context {
    author: String,
    tweet_id: Option<String>,
}

/// Drives saves from a click to the backend and back into the controls.
pub struct Orchestrator {
    services: Arc<Services>,
    controls: Arc<Controls>,
}

impl Orchestrator {
    pub(crate) fn new(services: Arc<Services>, controls: Arc<Controls>) -> Self {
        Self { services, controls }
    }

    /// Run the save a click on `control` asked for.
    pub async fn save(&self, binding: &ClickBinding, control: NodeId) {
        match binding.kind {
            MediaKind::Image => self.save_image(binding, control).await,
            MediaKind::Video | MediaKind::Gif => self.save_video(binding, control).await,
        }
    }

    /// Save one image at original quality.
    pub async fn save_image(&self, binding: &ClickBinding, control: NodeId) {
        let Some(prior) = self.begin(control) else {
            return;
        };
        let result = self.try_save_image(binding).await;
        self.finish(binding, control, prior, result);
    }

    /// Save a video as one or more still frames.
    pub async fn save_video(&self, binding: &ClickBinding, control: NodeId) {
        let Some(prior) = self.begin(control) else {
            return;
        };
        let result = self.try_save_video(binding).await;
        self.finish(binding, control, prior, result);
    }

    /// Enter `saving`, returning the state to restore on a local failure.
    fn begin(&self, control: NodeId) -> Option<ControlState> {
        let prior = self.controls.state(control)?;
        if !prior.accepts_click() {
            return None;
        }
        self.controls
            .set_state(control, ControlState::Saving, None)
            .then_some(prior)
    }

    fn context(&self, media: NodeId) -> Result<Context, SaveError> {
        self.services.page.read(|doc| {
            if !doc.is_attached(media) {
                return Err(SaveError::MediaDetached);
            }
            Ok(Context {
                author: resolve_author(doc, media),
                tweet_id: resolve_tweet_id(doc, media),
            })
        })
    }

    async fn try_save_image(&self, binding: &ClickBinding) -> Result<Saved, SaveError> {
        let media = binding.media;
        let context = self.context(media)?;
        let (raw, natural, rendered) = self.services.page.read(|doc| {
            (
                doc.non_empty_attr(media, "src").map(str::to_string),
                doc.natural_size(media),
                doc.rendered_size(media),
            )
        });
        let raw = raw.ok_or(SaveError::NoSource)?;
        let url = normalize_image_url(&raw);

        let size = match natural {
            Some(size) => size,
            None => match self.services.runtime.measure_image_size(&url).await {
                Ok(size) => size,
                Err(e) => {
                    debug!(url = %url, error = %e, "Dimension lookup failed");
                    rendered.ok_or(e)?
                }
            },
        };

        let image_url = if url.starts_with("blob:") {
            let blob = self.services.runtime.fetch_blob(&url).await?;
            blob.to_data_url(&binding.identity)
        } else {
            url
        };

        self.services.channel.ensure_reachable().await?;

        let request = SaveRequest {
            image_url,
            author: context.author,
            tweet_id: context.tweet_id,
            force_update: binding.force_update,
            width: to_pixels(size.width),
            height: to_pixels(size.height),
            is_placeholder_for_video: false,
            video: None,
        };
        let ticket = self.services.queue.submit(&binding.identity, request);
        let response = accepted(ticket.await.map_err(|_| SaveError::Dropped)??)?;
        Ok(Saved {
            message: response.summary().to_string(),
            warning: response.warning,
        })
    }

    async fn try_save_video(&self, binding: &ClickBinding) -> Result<Saved, SaveError> {
        let media = binding.media;
        let context = self.context(media)?;
        let source = self
            .services
            .page
            .read(|doc| resolve_video_source_url(doc, media))
            .filter(|s| !s.starts_with("blob:"));
        let playback = self
            .services
            .runtime
            .video(media)
            .ok_or(MediaError::NoPlayback)?;

        self.services.channel.ensure_reachable().await?;

        let was_paused = playback.is_paused();
        let start = playback.current_time();
        playback.pause();
        let dispatched = self
            .capture_and_dispatch(playback.as_ref(), binding, &context, source)
            .await;
        playback.set_current_time(start);
        if !was_paused {
            playback.play();
        }
        let tickets = dispatched?;

        let total = tickets.len();
        let mut saved = 0;
        let mut warning = None;
        let mut first_error = None;
        for result in join_all(tickets).await {
            match result.map_err(|_| SaveError::Dropped).and_then(|r| Ok(accepted(r?)?)) {
                Ok(response) => {
                    saved += 1;
                    warning = warning.or(response.warning);
                }
                Err(e) => {
                    debug!(identity = %binding.identity, error = %e, "Frame save failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if saved == 0 => Err(e),
            _ => {
                let noun = if binding.kind == MediaKind::Gif { "GIF" } else { "video" };
                Ok(Saved {
                    message: format!("Saved {saved} of {total} {noun} frames"),
                    warning,
                })
            }
        }
    }

    /// Capture the planned frames in timestamp order and queue each one
    /// without waiting for its save to finish.
    async fn capture_and_dispatch(
        &self,
        playback: &dyn VideoPlayback,
        binding: &ClickBinding,
        context: &Context,
        source: Option<String>,
    ) -> Result<Vec<SaveTicket>, SaveError> {
        let plan = plan_frames(playback.duration());
        let mut tickets = Vec::with_capacity(plan.len());
        for (index, target) in plan.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.services.config.frame_dispatch_delay).await;
            }
            let frame = capture_at(playback, *target, self.services.config.seek_timeout).await?;
            let request = SaveRequest {
                image_url: encode_jpeg_data_url(&frame)?,
                author: context.author.clone(),
                tweet_id: context.tweet_id.clone(),
                force_update: binding.force_update,
                width: frame.width(),
                height: frame.height(),
                is_placeholder_for_video: true,
                video: Some(VideoFrameMeta {
                    original_video_url: source.clone(),
                    video_original_filename: frame_filename(&binding.identity, index + 1),
                    unique_video_element_id: binding.identity.clone(),
                }),
            };
            debug!(identity = %binding.identity, frame = index + 1, "Dispatching frame");
            tickets.push(self.services.queue.submit(&binding.identity, request));
        }
        Ok(tickets)
    }

    /// Apply the outcome of a save to the controls.
    ///
    /// A control that left the document meanwhile is not touched.
    fn finish(
        &self,
        binding: &ClickBinding,
        control: NodeId,
        prior: ControlState,
        result: Result<Saved, SaveError>,
    ) {
        let attached = self.services.page.read(|doc| doc.is_attached(control));
        if !attached {
            warn!(
                identity = %binding.identity,
                succeeded = result.is_ok(),
                "Save finished after its control left the page"
            );
            return;
        }

        let notifier = &self.services.notifier;
        match result {
            Ok(saved) => {
                let updated = self.controls.update_all_controls_for_identity(&binding.identity);
                info!(identity = %binding.identity, controls = updated, "Saved");
                if let Some(warning) = saved.warning {
                    notifier.notify(Notice::new(NoticeLevel::Warning, warning));
                }
                notifier.notify(Notice::new(NoticeLevel::Success, saved.message));
            }
            Err(SaveError::Backend(BackendError::ContextInvalidated)) => {
                self.controls
                    .set_state(control, ControlState::Disabled, Some(CONTEXT_INVALID_MESSAGE));
                notifier.notify(Notice::new(NoticeLevel::Error, CONTEXT_INVALID_MESSAGE));
            }
            Err(SaveError::Backend(BackendError::Unreachable(reason))) => {
                debug!(identity = %binding.identity, reason = %reason, "Backend unreachable");
                self.controls.set_state(control, prior, Some(UNREACHABLE_MESSAGE));
                notifier.notify(Notice::new(NoticeLevel::Error, UNREACHABLE_MESSAGE));
            }
            Err(e @ (SaveError::Media(_) | SaveError::MediaDetached | SaveError::NoSource)) => {
                let message = if binding.kind.is_video() {
                    FRAME_CAPTURE_MESSAGE
                } else {
                    IMAGE_DATA_MESSAGE
                };
                warn!(identity = %binding.identity, error = %e, "Save aborted");
                self.controls.set_state(control, prior, Some(message));
                notifier.notify(Notice::new(NoticeLevel::Error, message));
            }
            Err(e) => {
                warn!(identity = %binding.identity, error = %e, "Save failed");
                self.controls
                    .transition_to_retryable(control, binding.media, binding.kind, &e.to_string());
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

/// Treat an unsuccessful response as a rejection carrying the backend's text.
fn accepted(response: SaveResponse) -> Result<SaveResponse, BackendError> {
    if response.success {
        Ok(response)
    } else {
        Err(BackendError::Rejected(
            response
                .error
                .clone()
                .unwrap_or_else(|| "Save failed".to_string()),
        ))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_pixels(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
