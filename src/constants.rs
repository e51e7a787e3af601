//! Shared constants: page markers and the selectors describing the host
//! page's media structures.

use std::sync::LazyLock;

use crate::dom::Selector;

/// Class carried by every save control.
pub const CONTROL_CLASS: &str = "media-save-btn";

/// Attribute on a control linking it to its media identity.
pub const CONTROL_IDENTITY_ATTR: &str = "data-media-save-id";

/// Attribute on a control holding its visual state.
pub const CONTROL_STATE_ATTR: &str = "data-media-save-state";

/// Attribute on a control holding the media kind it saves.
pub const CONTROL_KIND_ATTR: &str = "data-media-save-kind";

/// Marker on a media element that already has a control.
pub const HAS_CONTROL_ATTR: &str = "data-media-save-attached";

/// Cached identity of a video element, assigned once per node.
pub const VIDEO_ID_ATTR: &str = "data-media-save-video-id";

/// Path fragment of the image CDN.
pub const IMAGE_CDN_PATH: &str = "pbs.twimg.com/media/";

/// Default image format when neither the query nor the path names one.
pub const DEFAULT_IMAGE_FORMAT: &str = "jpg";

/// First path segments that are application routes, not user handles.
pub const RESERVED_ROUTES: &[&str] = &[
    "home",
    "explore",
    "notifications",
    "messages",
    "i",
    "settings",
    "search",
    "compose",
    "login",
    "logout",
    "signup",
    "tos",
    "privacy",
    "hashtag",
    "bookmarks",
    "lists",
    "communities",
    "premium",
    "jobs",
    "intent",
    "share",
];

/// Sentinel author when no handle can be found.
pub const UNKNOWN_AUTHOR: &str = "unknown";

fn selector(source: &str) -> Selector {
    Selector::parse(source).expect("Invalid selector")
}

/// A post (tweet) structure.
pub static POST: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"article[data-testid="tweet"], div[data-testid="tweet"], article"#)
});

/// A dialog or "large view" overlay.
pub static DIALOG: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[role="dialog"], [aria-modal="true"]"#));

/// A timeline cell wrapper.
pub static CELL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[data-testid="cellInnerDiv"]"#));

pub static USER_NAME_SPAN: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[data-testid="User-Name"] span"#));

pub static STATUS_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href*="/status/"]"#));

pub static ROOT_RELATIVE_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href^="/"]"#));

/// Avatar and profile-picture wrappers.
pub static AVATAR: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"[data-testid="Tweet-User-Avatar"], [data-testid^="UserAvatar-Container"]"#)
});

/// Container shapes in the order [`find_nearest_container`] tries them.
///
/// [`find_nearest_container`]: crate::discovery::find_nearest_container
pub static CONTAINER_SHAPES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"[data-testid="tweetPhoto"]"#,
        r#"a[href*="/photo/"]"#,
        r#"[data-testid="swipe-to-dismiss"]"#,
        r#"li[role="listitem"]"#,
        r#"[data-testid="card.layoutLarge.media"], [data-testid="card.layoutSmall.media"]"#,
        r#"[data-testid="attachments"]"#,
    ]
    .into_iter()
    .map(selector)
    .collect()
});

/// Any structure that can hold post media; an image outside all of these
/// (and outside a dialog) is page chrome.
pub static MEDIA_BEARING: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[data-testid="tweetPhoto"], a[href*="/photo/"], [data-testid="attachments"],
           [data-testid="swipe-to-dismiss"], li[role="listitem"],
           [data-testid="card.layoutLarge.media"], [data-testid="card.layoutSmall.media"],
           article, [data-testid="cellInnerDiv"]"#,
    )
});

/// Wrappers a control may be attached to, innermost first by `closest`.
pub static HOST_WRAPPER: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[data-testid="tweetPhoto"], a[href*="/photo/"], [data-testid="videoPlayer"],
           [data-testid="videoComponent"], [data-testid="swipe-to-dismiss"], li[role="listitem"]"#,
    )
});

/// Video player wrappers.
pub static VIDEO_WRAPPER: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"article [data-testid="videoPlayer"], [role="dialog"] [data-testid="videoPlayer"],
           [data-testid="videoComponent"]"#,
    )
});

/// Icon and button controls that may embed decorative video.
pub static ICON_CONTROL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"button, [data-testid$="Icon"], [data-testid$="-icon"]"#));

pub static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));

pub static VIDEO: LazyLock<Selector> = LazyLock::new(|| selector("video"));

pub static SOURCE_WITH_SRC: LazyLock<Selector> = LazyLock::new(|| selector("source[src]"));

pub static CONTROL: LazyLock<Selector> =
    LazyLock::new(|| selector(&format!(".{CONTROL_CLASS}")));

pub static HAS_CONTROL_MARKER: LazyLock<Selector> =
    LazyLock::new(|| selector(&format!("[{HAS_CONTROL_ATTR}]")));
