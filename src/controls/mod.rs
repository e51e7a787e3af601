//! Save-control lifecycle.
//!
//! A control moves through `absent -> pending-insert -> idle -> saving ->
//! saved | retryable`, with `disabled` reserved for a dead backend channel.
//! Insertion is idempotent per media element and serialized per host through
//! [`HostLocks`].

mod lock;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

pub use lock::{HostLocks, LockState, PendingLock};
pub use state::ControlState;

use crate::backend::{SavedRecord, SavedStatus, StatusQuery};
use crate::constants::{
    CONTROL, CONTROL_CLASS, CONTROL_IDENTITY_ATTR, CONTROL_KIND_ATTR, CONTROL_STATE_ATTR, DIALOG,
    HAS_CONTROL_ATTR, HOST_WRAPPER, VIDEO_WRAPPER,
};
use crate::dom::{Document, NodeId};
use crate::media::{
    image_identity, normalize_image_url, resolve_author, resolve_tweet_id,
    resolve_video_source_url, video_identity, MediaKind,
};
use crate::notify::{Notice, NoticeLevel};
use crate::saver::Services;

/// What a click on a control saves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickBinding {
    pub media: NodeId,
    pub kind: MediaKind,
    pub identity: String,
    /// Overwrite an existing record (retry or re-save).
    pub force_update: bool,
}

/// Everything decided synchronously before the status check.
struct Prepared {
    lock: PendingLock,
    control: NodeId,
    kind: MediaKind,
    identity: String,
    query: StatusQuery,
}

/// Owner of every save control on the page.
pub struct Controls {
    services: Arc<Services>,
    locks: Arc<HostLocks>,
    bindings: Mutex<HashMap<NodeId, ClickBinding>>,
}

impl Controls {
    pub(crate) fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            locks: Arc::new(HostLocks::new()),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<HostLocks> {
        &self.locks
    }

    /// Number of controls with a click binding.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Forget host locks and click bindings whose node left the document.
    ///
    /// Returns how many entries were dropped.
    pub fn prune_detached(&self) -> usize {
        self.services.page.read(|doc| {
            let hosts = self.locks.retain(|host| doc.is_attached(host));
            let mut bindings = self.bindings.lock();
            let before = bindings.len();
            bindings.retain(|control, _| doc.is_attached(*control));
            hosts + before - bindings.len()
        })
    }

    /// Attach a save control for `media` inside `container`.
    ///
    /// Returns `true` only if a new control was inserted. Never fails: any
    /// abort leaves the document untouched apart from stale-control removal
    /// and clears the host's pending lock.
    pub async fn attach_control(&self, container: NodeId, media: NodeId) -> bool {
        let page = &self.services.page;
        let Some(prepared) = page.edit(|doc| self.prepare(doc, container, media)) else {
            return false;
        };
        let host = prepared.lock.host();

        let status = match timeout(
            self.services.config.status_check_timeout,
            self.services.channel.check_saved_status(&prepared.query),
        )
        .await
        {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                debug!(identity = %prepared.identity, error = %e, "Saved-status check failed");
                None
            }
            Err(_) => {
                debug!(identity = %prepared.identity, "Saved-status check timed out");
                None
            }
        };

        let Prepared {
            lock,
            control,
            kind,
            identity,
            ..
        } = prepared;

        let inserted = page.edit(|doc| {
            if !doc.is_attached(host) || !doc.is_attached(media) {
                debug!(host = ?host, "Host detached before control insertion");
                return false;
            }
            if doc.attr(media, HAS_CONTROL_ATTR).is_some() {
                return false;
            }
            doc.append_child(host, control);
            if let Some(status) = status.as_ref().filter(|s| s.is_saved) {
                apply_state(doc, control, ControlState::Saved, saved_title(status));
            }
            doc.set_attr(media, HAS_CONTROL_ATTR, "true");
            self.bindings.lock().insert(
                control,
                ClickBinding {
                    media,
                    kind,
                    identity: identity.clone(),
                    force_update: false,
                },
            );
            true
        });

        if inserted {
            lock.commit();
            trace!(host = ?host, identity = %identity, "Control attached");
        }
        inserted
    }

    /// Synchronous half of insertion: checks, host lock, cleanup, construction.
    fn prepare(&self, doc: &mut Document, container: NodeId, media: NodeId) -> Option<Prepared> {
        if !doc.is_attached(media) || doc.attr(media, HAS_CONTROL_ATTR).is_some() {
            return None;
        }
        let kind = MediaKind::of(doc, media)?;
        let host = resolve_host(doc, container, media, kind)?;

        let on_host = controls_on_host(doc, host);
        if on_host
            .iter()
            .any(|control| self.bindings.lock().get(control).is_some_and(|b| b.media == media))
        {
            // Marker was cleared (navigation) but this media's control is intact.
            doc.set_attr(media, HAS_CONTROL_ATTR, "true");
            return None;
        }
        let live_on_host = on_host.iter().any(|control| {
            self.bindings
                .lock()
                .get(control)
                .is_some_and(|b| doc.is_attached(b.media))
        });
        if self.locks.state(host) == Some(LockState::Present) && !live_on_host {
            // The guarded control is gone or serves media the page replaced.
            self.locks.release(host);
        }
        let lock = self.locks.try_acquire(host)?;

        let (identity, query) = match kind {
            MediaKind::Image => {
                let raw = doc.non_empty_attr(media, "src")?.to_string();
                let identity = image_identity(&raw);
                let media_url = (!raw.starts_with("blob:")).then(|| normalize_image_url(&raw));
                let query = StatusQuery::new(
                    kind,
                    media_url,
                    resolve_author(doc, media),
                    resolve_tweet_id(doc, media),
                    raw,
                );
                (identity, query)
            }
            MediaKind::Video | MediaKind::Gif => {
                let identity = video_identity(doc, media);
                let source = resolve_video_source_url(doc, media);
                let raw = source
                    .clone()
                    .or_else(|| doc.non_empty_attr(media, "poster").map(str::to_string))
                    .unwrap_or_else(|| identity.clone());
                let query = StatusQuery::new(
                    kind,
                    source.filter(|s| !s.starts_with("blob:")),
                    resolve_author(doc, media),
                    resolve_tweet_id(doc, media),
                    raw,
                );
                (identity, query)
            }
        };

        self.remove_stale_controls(doc, &identity, media);
        for existing in controls_on_host(doc, host) {
            self.discard_control(doc, existing);
        }

        if doc
            .inline_position(host)
            .map_or(true, |p| p.eq_ignore_ascii_case("static"))
        {
            doc.set_inline_position(host, "relative");
        }

        let control = doc.create_element("button");
        doc.set_attr(control, "class", CONTROL_CLASS);
        doc.set_attr(control, "type", "button");
        doc.set_attr(control, CONTROL_IDENTITY_ATTR, &identity);
        doc.set_attr(control, CONTROL_KIND_ATTR, kind.as_str());
        apply_state(doc, control, ControlState::Idle, None);

        Some(Prepared {
            lock,
            control,
            kind,
            identity,
            query,
        })
    }

    /// Remove controls for `identity` whose media is gone or re-rendered.
    ///
    /// Controls bound to another live element with the same identity are
    /// duplicates, not leftovers, and stay.
    fn remove_stale_controls(&self, doc: &mut Document, identity: &str, media: NodeId) {
        let stale: Vec<NodeId> = doc
            .select_all(&CONTROL)
            .into_iter()
            .filter(|control| doc.attr(*control, CONTROL_IDENTITY_ATTR) == Some(identity))
            .filter(|control| match self.bindings.lock().get(control) {
                Some(binding) => binding.media == media || !doc.is_attached(binding.media),
                None => true,
            })
            .collect();
        for control in stale {
            debug!(identity, control = ?control, "Removing stale control");
            self.discard_control(doc, control);
        }
    }

    fn discard_control(&self, doc: &mut Document, control: NodeId) {
        if let Some(host) = doc.parent(control) {
            if self.locks.state(host) == Some(LockState::Present) {
                self.locks.release(host);
            }
        }
        doc.remove(control);
        if let Some(binding) = self.bindings.lock().remove(&control) {
            doc.remove_attr(binding.media, HAS_CONTROL_ATTR);
        }
    }

    /// Set one control's state. Returns `false` (and changes nothing) if the
    /// control is no longer in the document.
    pub fn set_state(&self, control: NodeId, state: ControlState, title: Option<&str>) -> bool {
        self.services.page.edit(|doc| {
            if !doc.is_attached(control) {
                warn!(control = ?control, state = state.as_str(), "Control detached; state change dropped");
                return false;
            }
            apply_state(doc, control, state, title);
            true
        })
    }

    #[must_use]
    pub fn state(&self, control: NodeId) -> Option<ControlState> {
        self.services.page.read(|doc| control_state(doc, control))
    }

    /// Mark every attached control for `identity` as saved. Returns how many
    /// controls were updated.
    pub fn update_all_controls_for_identity(&self, identity: &str) -> usize {
        self.services.page.edit(|doc| {
            let controls: Vec<NodeId> = doc
                .select_all(&CONTROL)
                .into_iter()
                .filter(|control| doc.attr(*control, CONTROL_IDENTITY_ATTR) == Some(identity))
                .collect();
            for control in &controls {
                apply_state(doc, *control, ControlState::Saved, None);
            }
            let mut bindings = self.bindings.lock();
            for control in &controls {
                if let Some(binding) = bindings.get_mut(control) {
                    binding.force_update = false;
                }
            }
            controls.len()
        })
    }

    /// Put a control into the retry affordance and tell the user why.
    pub fn transition_to_retryable(
        &self,
        control: NodeId,
        media: NodeId,
        kind: MediaKind,
        message: &str,
    ) {
        if self.set_state(control, ControlState::Retryable, Some(message)) {
            let mut bindings = self.bindings.lock();
            let identity = bindings
                .get(&control)
                .map(|b| b.identity.clone())
                .unwrap_or_default();
            bindings.insert(
                control,
                ClickBinding {
                    media,
                    kind,
                    identity,
                    force_update: true,
                },
            );
        }
        self.services
            .notifier
            .notify(Notice::new(NoticeLevel::Error, message));
    }

    /// The save a click on `control` should start, if any.
    ///
    /// `None` while the control is saving, disabled, detached or unknown.
    #[must_use]
    pub fn binding_for_click(&self, control: NodeId) -> Option<ClickBinding> {
        let state = self.services.page.read(|doc| {
            doc.is_attached(control)
                .then(|| control_state(doc, control))
                .flatten()
        })?;
        if !state.accepts_click() {
            trace!(control = ?control, state = state.as_str(), "Click ignored");
            return None;
        }
        let mut binding = self.bindings.lock().get(&control).cloned()?;
        binding.force_update |= state.forces_update();
        Some(binding)
    }

    /// Attached controls with their bindings, in document order.
    #[must_use]
    pub fn attached(&self) -> Vec<(NodeId, ClickBinding)> {
        let controls = self.services.page.read(|doc| doc.select_all(&CONTROL));
        let bindings = self.bindings.lock();
        controls
            .into_iter()
            .filter_map(|control| bindings.get(&control).map(|b| (control, b.clone())))
            .collect()
    }
}

impl std::fmt::Debug for Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controls")
            .field("locks", &self.locks.len())
            .field("bindings", &self.bindings.lock().len())
            .finish_non_exhaustive()
    }
}

/// Node the control is physically attached to.
///
/// In a dialog the media's parent is used so stacked items each get their
/// own control; otherwise the innermost known wrapper inside the container,
/// falling back to the container itself.
fn resolve_host(doc: &Document, container: NodeId, media: NodeId, kind: MediaKind) -> Option<NodeId> {
    if !doc.is_attached(container) {
        return None;
    }
    if doc.closest(media, &DIALOG).is_some() {
        return doc.parent_element(media);
    }
    let wrapper = if kind.is_video() { &*VIDEO_WRAPPER } else { &*HOST_WRAPPER };
    doc.closest(media, wrapper)
        .filter(|host| *host == container || doc.contains(container, *host))
        .or(Some(container))
}

fn controls_on_host(doc: &Document, host: NodeId) -> Vec<NodeId> {
    doc.children(host)
        .into_iter()
        .filter(|child| doc.matches(*child, &CONTROL))
        .collect()
}

fn control_state(doc: &Document, control: NodeId) -> Option<ControlState> {
    doc.attr(control, CONTROL_STATE_ATTR).and_then(ControlState::parse)
}

fn apply_state(doc: &mut Document, control: NodeId, state: ControlState, title: Option<&str>) {
    let kind = doc
        .attr(control, CONTROL_KIND_ATTR)
        .and_then(MediaKind::parse)
        .unwrap_or(MediaKind::Image);
    doc.set_attr(control, CONTROL_STATE_ATTR, state.as_str());
    doc.set_text(control, state.label(kind));
    match title {
        Some(title) => doc.set_attr(control, "title", title),
        None => doc.remove_attr(control, "title"),
    }
    if state == ControlState::Disabled {
        doc.set_attr(control, "disabled", "");
    } else {
        doc.remove_attr(control, "disabled");
    }
}

fn saved_title(status: &SavedStatus) -> Option<&'static str> {
    match status.record {
        Some(SavedRecord::FramePlaceholder { .. }) => Some("Saved as still frames"),
        Some(SavedRecord::FullVideo { .. }) => Some("Saved as video"),
        Some(SavedRecord::Image) | None => None,
    }
}
