//! Integration tests for the per-identity save queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use media_save_overlay::backend::{
    Backend, BackendChannel, BackendError, LogEntry, PingResponse, SaveRequest, SaveResponse,
    SavedStatus, StatusQuery,
};
use media_save_overlay::save::SaveQueue;

/// Records save order and the peak number of saves in flight.
#[derive(Default)]
struct SlowBackend {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    order: Mutex<Vec<String>>,
}

#[async_trait]
impl Backend for SlowBackend {
    async fn check_saved_status(&self, _query: &StatusQuery) -> Result<SavedStatus, BackendError> {
        Ok(SavedStatus {
            is_saved: false,
            record: None,
        })
    }

    async fn ping(&self) -> Result<PingResponse, BackendError> {
        Ok(PingResponse { success: true })
    }

    async fn save_image(&self, request: &SaveRequest) -> Result<SaveResponse, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.order.lock().push(request.image_url.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(SaveResponse {
            success: true,
            ..SaveResponse::default()
        })
    }

    async fn log_external_entry(&self, _entry: &LogEntry) -> Result<(), BackendError> {
        Ok(())
    }
}

fn request(url: &str) -> SaveRequest {
    SaveRequest {
        image_url: url.to_string(),
        author: "@alice".to_string(),
        tweet_id: None,
        force_update: false,
        width: 10,
        height: 10,
        is_placeholder_for_video: false,
        video: None,
    }
}

fn queue_with(backend: &Arc<SlowBackend>, idle: Duration) -> SaveQueue {
    let backend: Arc<dyn Backend> = backend.clone();
    SaveQueue::new(BackendChannel::new(backend), idle)
}

#[tokio::test]
async fn test_same_identity_is_serialized_in_order() {
    let backend = Arc::new(SlowBackend {
        delay: Duration::from_millis(20),
        ..SlowBackend::default()
    });
    let queue = queue_with(&backend, Duration::from_secs(5));

    let tickets: Vec<_> = ["f1", "f2", "f3"]
        .into_iter()
        .map(|url| queue.submit("video_X", request(url)))
        .collect();
    for ticket in tickets {
        assert!(ticket.await.unwrap().unwrap().success);
    }

    assert_eq!(*backend.order.lock(), vec!["f1", "f2", "f3"]);
    assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    assert_eq!(queue.active_lanes(), 1);
}

#[tokio::test]
async fn test_different_identities_run_concurrently() {
    let backend = Arc::new(SlowBackend {
        delay: Duration::from_millis(50),
        ..SlowBackend::default()
    });
    let queue = queue_with(&backend, Duration::from_secs(5));

    let a = queue.submit("A", request("a"));
    let b = queue.submit("B", request("b"));
    let (a, b) = tokio::join!(a, b);
    assert!(a.unwrap().is_ok());
    assert!(b.unwrap().is_ok());

    assert_eq!(backend.peak.load(Ordering::SeqCst), 2);
    assert_eq!(queue.active_lanes(), 2);
}

#[tokio::test]
async fn test_idle_lane_retires_and_restarts() {
    let backend = Arc::new(SlowBackend::default());
    let queue = queue_with(&backend, Duration::from_millis(30));

    queue.submit("A", request("first")).await.unwrap().unwrap();
    assert_eq!(queue.active_lanes(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(queue.active_lanes(), 0);

    queue.submit("A", request("second")).await.unwrap().unwrap();
    assert_eq!(*backend.order.lock(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_invalid_context_fails_queued_request() {
    struct DeadBackend;

    #[async_trait]
    impl Backend for DeadBackend {
        fn context_valid(&self) -> bool {
            false
        }

        async fn check_saved_status(&self, _: &StatusQuery) -> Result<SavedStatus, BackendError> {
            unreachable!()
        }

        async fn ping(&self) -> Result<PingResponse, BackendError> {
            unreachable!()
        }

        async fn save_image(&self, _: &SaveRequest) -> Result<SaveResponse, BackendError> {
            unreachable!()
        }

        async fn log_external_entry(&self, _: &LogEntry) -> Result<(), BackendError> {
            unreachable!()
        }
    }

    let queue = SaveQueue::new(BackendChannel::new(Arc::new(DeadBackend)), Duration::from_secs(1));
    let result = queue.submit("A", request("x")).await.unwrap();
    assert!(matches!(result, Err(BackendError::ContextInvalidated)));
}
