//! Scan scheduling: when to look for new media and what to skip.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::constants::{HAS_CONTROL_ATTR, HAS_CONTROL_MARKER};
use crate::controls::Controls;
use crate::discovery::{
    find_image_containers, find_video_containers, relevant_images_in, relevant_videos_in,
};
use crate::dom::{ChangeNotice, NodeId};
use crate::saver::Services;

/// Counts from one completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Containers discovered and not yet processed.
    pub containers: usize,
    /// Containers newly marked processed.
    pub processed: usize,
    /// Controls inserted.
    pub attached: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// Another scan was in flight; this trigger collapsed into it.
    AlreadyRunning,
}

/// Bookkeeping for one logical page, reset on navigation.
#[derive(Debug)]
struct ScanSession {
    location: String,
    processed: HashSet<NodeId>,
}

impl ScanSession {
    fn new(location: String) -> Self {
        Self {
            location,
            processed: HashSet::new(),
        }
    }
}

/// Clears the in-flight flag when a scan ends, however it ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scanner {
    services: Arc<Services>,
    controls: Arc<Controls>,
    scanning: AtomicBool,
    rescan: AtomicBool,
    session: Mutex<ScanSession>,
}

impl Scanner {
    pub(crate) fn new(services: Arc<Services>, controls: Arc<Controls>) -> Self {
        let location = navigation_key(&services.page.location());
        Self {
            services,
            controls,
            scanning: AtomicBool::new(false),
            rescan: AtomicBool::new(false),
            session: Mutex::new(ScanSession::new(location)),
        }
    }

    /// Discover containers and attach controls to their media.
    ///
    /// Returns [`ScanOutcome::AlreadyRunning`] without doing anything if a
    /// scan is in flight.
    pub async fn scan_page(&self) -> ScanOutcome {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("Scan already running, skipping");
            return ScanOutcome::AlreadyRunning;
        }
        let _guard = ScanGuard(&self.scanning);
        self.rescan.store(false, Ordering::SeqCst);
        self.prune_detached();

        let mut report = ScanReport::default();
        loop {
            let pass = self.scan_once().await;
            report.containers += pass.containers;
            report.processed += pass.processed;
            report.attached += pass.attached;
            if !self.rescan.swap(false, Ordering::SeqCst) {
                break;
            }
        }
        if report.attached > 0 {
            info!(
                containers = report.containers,
                attached = report.attached,
                "Scan attached controls"
            );
        }
        ScanOutcome::Completed(report)
    }

    /// Scan now, or make the in-flight scan run another pass.
    pub async fn force_scan(&self) -> ScanOutcome {
        self.rescan.store(true, Ordering::SeqCst);
        self.scan_page().await
    }

    async fn scan_once(&self) -> ScanReport {
        let thresholds = self.services.thresholds;
        let work: Vec<(NodeId, Vec<NodeId>)> = {
            let processed = self.session.lock().processed.clone();
            self.services.page.read(|doc| {
                let mut containers = find_image_containers(doc, &thresholds).into_vec();
                let videos = find_video_containers(doc, &thresholds).into_vec();
                for container in videos {
                    if !containers.contains(&container) {
                        containers.push(container);
                    }
                }
                containers
                    .into_iter()
                    .filter(|container| !processed.contains(container))
                    .map(|container| {
                        let mut media = relevant_images_in(doc, container, &thresholds);
                        media.extend(relevant_videos_in(doc, container, &thresholds));
                        (container, media)
                    })
                    .collect()
            })
        };

        let mut report = ScanReport {
            containers: work.len(),
            ..ScanReport::default()
        };
        for (container, media) in work {
            for &node in &media {
                if self.controls.attach_control(container, node).await {
                    report.attached += 1;
                }
            }
            let complete = self.services.page.read(|doc| {
                media
                    .iter()
                    .all(|node| doc.attr(*node, HAS_CONTROL_ATTR).is_some())
            });
            if complete && self.session.lock().processed.insert(container) {
                report.processed += 1;
            }
        }
        report
    }

    /// Compare the page location with the session's; on a change, forget
    /// every processed container and media marker.
    ///
    /// Returns whether a navigation was detected.
    pub fn check_navigation(&self) -> bool {
        let current = navigation_key(&self.services.page.location());
        {
            let mut session = self.session.lock();
            if session.location == current {
                return false;
            }
            info!(from = %session.location, to = %current, "Navigation detected");
            *session = ScanSession::new(current);
        }
        self.services.page.edit(|doc| {
            for node in doc.select_all(&HAS_CONTROL_MARKER) {
                doc.remove_attr(node, HAS_CONTROL_ATTR);
            }
        });
        self.prune_detached();
        true
    }

    /// Drop bookkeeping for containers, hosts and controls the page removed.
    fn prune_detached(&self) {
        let processed: Vec<NodeId> = self.session.lock().processed.iter().copied().collect();
        let detached: Vec<NodeId> = self.services.page.read(|doc| {
            processed
                .into_iter()
                .filter(|node| !doc.is_attached(*node))
                .collect()
        });
        let containers = detached.len();
        {
            let mut session = self.session.lock();
            for node in &detached {
                session.processed.remove(node);
            }
        }
        let controls = self.controls.prune_detached();
        if containers + controls > 0 {
            debug!(containers, controls, "Pruned detached nodes");
        }
    }

    /// Containers processed in the current session.
    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.session.lock().processed.len()
    }

    /// Scan on load, after each settled burst of changes, and after every
    /// navigation, until `shutdown` fires.
    pub async fn run(
        &self,
        mut changes: mpsc::UnboundedReceiver<ChangeNotice>,
        shutdown: CancellationToken,
    ) {
        let debounce = self.services.config.scan_debounce;
        let mut poll = interval(self.services.config.navigation_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut feed_open = true;
        // Trailing edge of the current burst of changes.
        let mut pending: Option<Instant> = None;

        self.scan_page().await;

        loop {
            let deadline = pending;
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = poll.tick() => {
                    if self.check_navigation() {
                        self.force_scan().await;
                    }
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    pending = None;
                    self.scan_page().await;
                }
                notice = changes.recv(), if feed_open => match notice {
                    Some(ChangeNotice) => pending = Some(Instant::now() + debounce),
                    None => {
                        debug!("Change feed closed");
                        feed_open = false;
                    }
                },
            }
        }
        debug!("Scanner stopped");
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("scanning", &self.scanning.load(Ordering::SeqCst))
            .field("session", &*self.session.lock())
            .finish_non_exhaustive()
    }
}

/// Path plus query; fragments and origin changes within a path are ignored.
fn navigation_key(location: &str) -> String {
    match Url::parse(location) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        },
        Err(_) => location.split('#').next().unwrap_or(location).to_string(),
    }
}
