//! Save-request queue, FIFO per media identity.
//!
//! Each identity gets a lane: an mpsc channel drained by one worker task, so
//! requests for the same media reach the backend in submission order while
//! different media proceed independently. A lane worker exits after sitting
//! idle and is re-created by the next submission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::backend::{BackendChannel, BackendError, SaveRequest, SaveResponse};

/// Result of one queued request.
pub type SaveTicket = oneshot::Receiver<Result<SaveResponse, BackendError>>;

struct Job {
    request: SaveRequest,
    reply: oneshot::Sender<Result<SaveResponse, BackendError>>,
}

type Lanes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>>;

#[derive(Clone)]
pub struct SaveQueue {
    channel: BackendChannel,
    lanes: Lanes,
    idle: Duration,
}

impl SaveQueue {
    #[must_use]
    pub fn new(channel: BackendChannel, idle: Duration) -> Self {
        Self {
            channel,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    /// Queue a request behind earlier requests for the same identity.
    ///
    /// Never waits; await the returned ticket for the backend's answer. Must
    /// be called within a tokio runtime.
    pub fn submit(&self, identity: &str, request: SaveRequest) -> SaveTicket {
        let (reply, ticket) = oneshot::channel();
        let mut job = Job { request, reply };

        let mut lanes = self.lanes.lock();
        if let Some(lane) = lanes.get(identity) {
            match lane.send(job) {
                Ok(()) => return ticket,
                // The worker is gone; fall through and start a new lane.
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // A fresh receiver is alive, so this send cannot fail.
        let _ = tx.send(job);
        lanes.insert(identity.to_string(), tx);
        drop(lanes);

        debug!(identity, "Starting save lane");
        tokio::spawn(run_lane(
            identity.to_string(),
            rx,
            self.channel.clone(),
            Arc::clone(&self.lanes),
            self.idle,
        ));
        ticket
    }

    /// Number of lanes with a live worker.
    #[must_use]
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().len()
    }
}

impl std::fmt::Debug for SaveQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveQueue")
            .field("lanes", &self.active_lanes())
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}

async fn run_lane(
    identity: String,
    mut rx: mpsc::UnboundedReceiver<Job>,
    channel: BackendChannel,
    lanes: Lanes,
    idle: Duration,
) {
    loop {
        let job = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(_) => {
                // Retire the lane only if nothing slipped in; submitters send
                // while holding the map lock.
                let mut map = lanes.lock();
                match rx.try_recv() {
                    Ok(job) => {
                        drop(map);
                        job
                    }
                    Err(_) => {
                        map.remove(&identity);
                        trace!(identity = %identity, "Save lane idle, retiring");
                        return;
                    }
                }
            }
        };

        let result = channel.save_image(&job.request).await;
        if job.reply.send(result).is_err() {
            trace!(identity = %identity, "Save result dropped by caller");
        }
    }
}
