//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;

use media_save_overlay::backend::{
    Backend, BackendError, LogEntry, PingResponse, SaveRequest, SaveResponse, SavedRecord,
    SavedStatus, StatusQuery,
};
use media_save_overlay::config::Config;
use media_save_overlay::constants::CONTROL;
use media_save_overlay::dom::{parse_html, NodeId, Page, Selector, Size};
use media_save_overlay::notify::{Notice, Notifier};
use media_save_overlay::runtime::{Blob, MediaError, MediaRuntime, VideoPlayback};
use media_save_overlay::MediaSaver;

/// In-memory backend with switchable failures.
#[derive(Default)]
pub struct FakeBackend {
    pub invalid: AtomicBool,
    pub ping_fails: AtomicBool,
    pub log_fails: AtomicBool,
    /// Raw URLs the status check reports as saved.
    pub saved_urls: Mutex<HashSet<String>>,
    pub saved_record: Mutex<Option<SavedRecord>>,
    pub status_delay: Mutex<Duration>,
    pub save_delay: Mutex<Duration>,
    /// Error text returned by every save while set.
    pub save_error: Mutex<Option<String>>,
    pub status_queries: Mutex<Vec<StatusQuery>>,
    pub requests: Mutex<Vec<SaveRequest>>,
    pub logs: Mutex<Vec<LogEntry>>,
    pub pings: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_saved(&self, raw_url: &str) {
        self.saved_urls.lock().insert(raw_url.to_string());
    }

    pub fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn context_valid(&self) -> bool {
        !self.invalid.load(Ordering::SeqCst)
    }

    async fn check_saved_status(&self, query: &StatusQuery) -> Result<SavedStatus, BackendError> {
        self.status_queries.lock().push(query.clone());
        let delay = *self.status_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let is_saved = self.saved_urls.lock().contains(&query.original_url_for_id);
        Ok(SavedStatus {
            is_saved,
            record: is_saved.then(|| (*self.saved_record.lock()).unwrap_or(SavedRecord::Image)),
        })
    }

    async fn ping(&self) -> Result<PingResponse, BackendError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("connection refused".to_string()));
        }
        Ok(PingResponse { success: true })
    }

    async fn save_image(&self, request: &SaveRequest) -> Result<SaveResponse, BackendError> {
        let delay = *self.save_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().push(request.clone());
        let error = self.save_error.lock().clone();
        Ok(SaveResponse {
            success: error.is_none(),
            error,
            ..SaveResponse::default()
        })
    }

    async fn log_external_entry(&self, entry: &LogEntry) -> Result<(), BackendError> {
        if self.log_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("no receiver".to_string()));
        }
        self.logs.lock().push(entry.clone());
        Ok(())
    }
}

/// A scripted `<video>`.
pub struct FakeVideo {
    pub duration: Option<f64>,
    pub time: Mutex<f64>,
    pub paused: AtomicBool,
    pub stall_seeks: bool,
    pub fail_capture: bool,
    pub seeks: Mutex<Vec<f64>>,
    pub plays: AtomicUsize,
}

impl FakeVideo {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            time: Mutex::new(0.0),
            paused: AtomicBool::new(false),
            stall_seeks: false,
            fail_capture: false,
            seeks: Mutex::new(Vec::new()),
            plays: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VideoPlayback for FakeVideo {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn current_time(&self) -> f64 {
        *self.time.lock()
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    fn set_current_time(&self, seconds: f64) {
        *self.time.lock() = seconds;
    }

    async fn seek(&self, seconds: f64) -> Result<(), MediaError> {
        self.seeks.lock().push(seconds);
        if self.stall_seeks {
            std::future::pending::<()>().await;
        }
        *self.time.lock() = seconds;
        Ok(())
    }

    fn capture_frame(&self) -> Result<RgbaImage, MediaError> {
        if self.fail_capture {
            return Err(MediaError::Capture("tainted canvas".to_string()));
        }
        Ok(RgbaImage::from_pixel(8, 6, image::Rgba([10, 20, 30, 255])))
    }
}

/// Host media services backed by maps.
#[derive(Default)]
pub struct FakeRuntime {
    pub blobs: Mutex<HashMap<String, Blob>>,
    pub image_size: Mutex<Option<Size>>,
    pub videos: Mutex<HashMap<NodeId, Arc<FakeVideo>>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_video(&self, node: NodeId, video: FakeVideo) -> Arc<FakeVideo> {
        let video = Arc::new(video);
        self.videos.lock().insert(node, Arc::clone(&video));
        video
    }
}

#[async_trait]
impl MediaRuntime for FakeRuntime {
    async fn fetch_blob(&self, url: &str) -> Result<Blob, MediaError> {
        self.blobs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| MediaError::BlobFetch {
                url: url.to_string(),
                message: "revoked".to_string(),
            })
    }

    async fn measure_image_size(&self, url: &str) -> Result<Size, MediaError> {
        (*self.image_size.lock()).ok_or_else(|| MediaError::Dimensions(url.to_string()))
    }

    fn video(&self, node: NodeId) -> Option<Arc<dyn VideoPlayback>> {
        self.videos
            .lock()
            .get(&node)
            .map(|v| Arc::clone(v) as Arc<dyn VideoPlayback>)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.notices.lock().iter().map(|n| n.message.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

pub struct Harness {
    pub saver: Arc<MediaSaver>,
    pub page: Arc<Page>,
    pub backend: Arc<FakeBackend>,
    pub runtime: Arc<FakeRuntime>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(html: &str, location: &str) -> Self {
        Self::with_config(html, location, Config::for_testing())
    }

    pub fn with_config(html: &str, location: &str, config: Config) -> Self {
        let page = Arc::new(Page::new(parse_html(html, location)));
        let backend = FakeBackend::new();
        let runtime = FakeRuntime::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let saver = Arc::new(MediaSaver::new(
            Arc::clone(&page),
            backend.clone(),
            runtime.clone(),
            notifier.clone(),
            config,
        ));
        Self {
            saver,
            page,
            backend,
            runtime,
            notifier,
        }
    }

    pub fn find(&self, selector: &str) -> NodeId {
        let selector = Selector::parse(selector).unwrap();
        self.page
            .read(|doc| doc.select_first(doc.root(), &selector))
            .unwrap_or_else(|| panic!("no element matches {selector:?}"))
    }

    /// Attached controls in document order.
    pub fn controls(&self) -> Vec<NodeId> {
        self.page.read(|doc| doc.select_all(&CONTROL))
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.page.read(|doc| doc.attr(node, name).map(str::to_string))
    }

    pub fn text(&self, node: NodeId) -> String {
        self.page.read(|doc| doc.text_content(node))
    }
}

/// A timeline post with one photo.
pub fn photo_post(id: &str, handle: &str, status: &str, media: &str) -> String {
    format!(
        r#"<article id="{id}" data-testid="tweet">
             <div data-testid="User-Name"><span>Name</span><span>@{handle}</span></div>
             <a href="/{handle}/status/{status}">time</a>
             <a href="/{handle}/status/{status}/photo/1">
               <div data-testid="tweetPhoto"><img src="https://pbs.twimg.com/media/{media}?format=jpg&name=small" width="600" height="400"></div>
             </a>
           </article>"#
    )
}

/// A timeline post with one video player.
pub fn video_post(id: &str, handle: &str, status: &str, video_attrs: &str) -> String {
    format!(
        r#"<article id="{id}" data-testid="tweet">
             <div data-testid="User-Name"><span>@{handle}</span></div>
             <a href="/{handle}/status/{status}">time</a>
             <div data-testid="videoPlayer"><video {video_attrs} width="640" height="360"></video></div>
           </article>"#
    )
}
