//! Container discovery.
//!
//! Several independent strategies nominate containers; the union is
//! deduplicated by node identity so a node nominated twice is processed once.

use std::collections::HashSet;
use std::sync::LazyLock;

use tracing::trace;

use crate::constants::{CONTAINER_SHAPES, IMG, POST, VIDEO};
use crate::dom::{Document, NodeId, Selector};
use crate::media::{is_relevant_image, is_relevant_video, MediaThresholds};

/// How a strategy turns a selector match into a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nomination {
    /// The match is the container; it must hold relevant media.
    Itself,
    /// The match is media; its nearest container shape is the container.
    NearestOfMedia,
    /// The match is media in a dialog; its parent is the container.
    ParentOfMedia,
    /// The match is a video; its post (or parent) is the container.
    PostOfMedia,
}

struct Strategy {
    name: &'static str,
    selector: Selector,
    nomination: Nomination,
}

fn strategy(name: &'static str, selector: &str, nomination: Nomination) -> Strategy {
    Strategy {
        name,
        selector: Selector::parse(selector).expect("Invalid selector"),
        nomination,
    }
}

static IMAGE_STRATEGIES: LazyLock<Vec<Strategy>> = LazyLock::new(|| {
    vec![
        strategy("photo", r#"[data-testid="tweetPhoto"]"#, Nomination::Itself),
        strategy(
            "attachment",
            r#"[data-testid="attachments"] img"#,
            Nomination::NearestOfMedia,
        ),
        strategy(
            "photo-link",
            r#"a[href*="/photo/"] img"#,
            Nomination::NearestOfMedia,
        ),
        strategy(
            "modal",
            r#"[aria-modal="true"] img, [role="dialog"] img"#,
            Nomination::ParentOfMedia,
        ),
        strategy(
            "gallery",
            r#"[data-testid="swipe-to-dismiss"], li[role="listitem"]"#,
            Nomination::Itself,
        ),
        strategy(
            "generic",
            r#"img[src*="pbs.twimg.com/media/"], img[src^="blob:"]"#,
            Nomination::NearestOfMedia,
        ),
    ]
});

static VIDEO_STRATEGIES: LazyLock<Vec<Strategy>> = LazyLock::new(|| {
    vec![
        strategy(
            "player",
            r#"article [data-testid="videoPlayer"], [role="dialog"] [data-testid="videoPlayer"], [data-testid="videoComponent"]"#,
            Nomination::Itself,
        ),
        strategy("raw-video", "video", Nomination::PostOfMedia),
    ]
});

/// Containers in discovery order, unique by node identity.
#[derive(Debug, Default)]
pub struct ContainerSet {
    order: Vec<NodeId>,
    seen: HashSet<NodeId>,
}

impl ContainerSet {
    /// Add a container; returns `false` if it was already present.
    pub fn insert(&mut self, node: NodeId) -> bool {
        if self.seen.insert(node) {
            self.order.push(node);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.seen.contains(&node)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<NodeId> {
        self.order
    }
}

/// All containers holding relevant images.
#[must_use]
pub fn find_image_containers(doc: &Document, thresholds: &MediaThresholds) -> ContainerSet {
    let relevant = |node: NodeId| is_relevant_image(doc, node, thresholds);
    run_strategies(doc, &IMAGE_STRATEGIES, &IMG, &relevant)
}

/// All containers holding relevant videos.
#[must_use]
pub fn find_video_containers(doc: &Document, thresholds: &MediaThresholds) -> ContainerSet {
    let relevant = |node: NodeId| is_relevant_video(doc, node, thresholds);
    run_strategies(doc, &VIDEO_STRATEGIES, &VIDEO, &relevant)
}

fn run_strategies(
    doc: &Document,
    strategies: &[Strategy],
    media: &Selector,
    relevant: &dyn Fn(NodeId) -> bool,
) -> ContainerSet {
    let mut set = ContainerSet::default();
    for strategy in strategies {
        for matched in doc.select_all(&strategy.selector) {
            let container = match strategy.nomination {
                Nomination::Itself => holds_relevant(doc, matched, media, relevant).then_some(matched),
                Nomination::NearestOfMedia => {
                    relevant(matched).then(|| find_nearest_container(doc, matched)).flatten()
                }
                Nomination::ParentOfMedia => {
                    relevant(matched).then(|| doc.parent_element(matched)).flatten()
                }
                Nomination::PostOfMedia => relevant(matched)
                    .then(|| doc.closest(matched, &POST).or_else(|| doc.parent_element(matched)))
                    .flatten(),
            };
            if let Some(container) = container {
                if set.insert(container) {
                    trace!(strategy = strategy.name, container = ?container, "Container nominated");
                }
            }
        }
    }
    set
}

fn holds_relevant(
    doc: &Document,
    node: NodeId,
    media: &Selector,
    relevant: &dyn Fn(NodeId) -> bool,
) -> bool {
    (doc.matches(node, media) && relevant(node))
        || doc.select(node, media).into_iter().any(relevant)
}

/// First ancestor matching the ordered container shapes, else the parent.
#[must_use]
pub fn find_nearest_container(doc: &Document, media: NodeId) -> Option<NodeId> {
    let parent = doc.parent_element(media)?;
    CONTAINER_SHAPES
        .iter()
        .find_map(|shape| doc.closest(parent, shape))
        .or(Some(parent))
}

/// Relevant images inside (or equal to) a container.
#[must_use]
pub fn relevant_images_in(
    doc: &Document,
    container: NodeId,
    thresholds: &MediaThresholds,
) -> Vec<NodeId> {
    std::iter::once(container)
        .chain(doc.select(container, &IMG))
        .filter(|node| is_relevant_image(doc, *node, thresholds))
        .collect()
}

/// Relevant videos inside (or equal to) a container.
#[must_use]
pub fn relevant_videos_in(
    doc: &Document,
    container: NodeId,
    thresholds: &MediaThresholds,
) -> Vec<NodeId> {
    std::iter::once(container)
        .chain(doc.select(container, &VIDEO))
        .filter(|node| is_relevant_video(doc, *node, thresholds))
        .collect()
}
