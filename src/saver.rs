//! The assembled engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{Backend, BackendChannel};
use crate::config::Config;
use crate::controls::Controls;
use crate::dom::{NodeId, Page};
use crate::media::MediaThresholds;
use crate::notify::Notifier;
use crate::report::ErrorReporter;
use crate::runtime::MediaRuntime;
use crate::save::{Orchestrator, SaveQueue};
use crate::scan::{ScanOutcome, Scanner};

/// Collaborators shared by every component.
pub(crate) struct Services {
    pub page: Arc<Page>,
    pub channel: BackendChannel,
    pub runtime: Arc<dyn MediaRuntime>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
    pub thresholds: MediaThresholds,
    pub queue: SaveQueue,
}

/// What became of a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A save ran to completion (successfully or not).
    Handled,
    /// The control was saving, disabled, detached or unknown.
    Ignored,
}

/// Save controls for one page.
pub struct MediaSaver {
    services: Arc<Services>,
    controls: Arc<Controls>,
    orchestrator: Orchestrator,
    scanner: Scanner,
    reporter: ErrorReporter,
}

impl MediaSaver {
    #[must_use]
    pub fn new(
        page: Arc<Page>,
        backend: Arc<dyn Backend>,
        runtime: Arc<dyn MediaRuntime>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        let channel = BackendChannel::new(backend);
        let services = Arc::new(Services {
            page,
            queue: SaveQueue::new(channel.clone(), config.queue_idle),
            thresholds: config.thresholds(),
            channel: channel.clone(),
            runtime,
            notifier,
            config,
        });
        let controls = Arc::new(Controls::new(Arc::clone(&services)));
        let reporter = ErrorReporter::new(channel, services.config.log_fallback_dir.clone());
        Self {
            orchestrator: Orchestrator::new(Arc::clone(&services), Arc::clone(&controls)),
            scanner: Scanner::new(Arc::clone(&services), Arc::clone(&controls)),
            services,
            controls,
            reporter,
        }
    }

    #[must_use]
    pub fn page(&self) -> &Arc<Page> {
        &self.services.page
    }

    #[must_use]
    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    #[must_use]
    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    #[must_use]
    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    #[must_use]
    pub fn queue(&self) -> &SaveQueue {
        &self.services.queue
    }

    pub async fn scan_page(&self) -> ScanOutcome {
        self.scanner.scan_page().await
    }

    /// Detect a navigation and, if there was one, rescan from scratch.
    pub async fn check_navigation(&self) -> bool {
        let navigated = self.scanner.check_navigation();
        if navigated {
            self.scanner.force_scan().await;
        }
        navigated
    }

    /// Handle a click on a save control.
    pub async fn click(&self, control: NodeId) -> ClickOutcome {
        let Some(binding) = self.controls.binding_for_click(control) else {
            debug!(control = ?control, "Click ignored");
            return ClickOutcome::Ignored;
        };
        self.orchestrator.save(&binding, control).await;
        ClickOutcome::Handled
    }

    /// Keep the page scanned until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let changes = self.services.page.subscribe();
        self.scanner.run(changes, shutdown).await;
    }
}

impl std::fmt::Debug for MediaSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSaver")
            .field("controls", &self.controls)
            .field("scanner", &self.scanner)
            .finish_non_exhaustive()
    }
}
