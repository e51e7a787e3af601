//! Stable media identities and post context (author, post id).
//!
//! Resolvers here never fail: a missing value degrades to `None` or the
//! unknown-author sentinel.

use std::sync::LazyLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use super::normalize::{normalize_image_url, upgrade_protocol_relative};
use crate::constants::{
    CELL, DIALOG, POST, RESERVED_ROUTES, ROOT_RELATIVE_LINK, SOURCE_WITH_SRC, STATUS_LINK,
    UNKNOWN_AUTHOR, USER_NAME_SPAN, VIDEO_ID_ATTR,
};
use crate::dom::{Document, NodeId};

static HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").unwrap());

static HANDLE_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]{1,15})\b").unwrap());

/// Author segment of a status link, relative or absolute.
static STATUS_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://(?:www\.|mobile\.)?(?:x|twitter)\.com)?/([A-Za-z0-9_]{1,15})/status/\d+")
        .unwrap()
});

static STATUS_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/status/(\d+)").unwrap());

static PROFILE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]{1,15})/?$").unwrap());

static TWEET_VIDEO_THUMB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://pbs\.twimg\.com/tweet_video_thumb/([^/?#.]+)\.[A-Za-z0-9]+").unwrap()
});

static EXT_VIDEO_THUMB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https://pbs\.twimg\.com/ext_tw_video_thumb/(\d+)/(?:pu/)?img/([^/?#.]+)\.[A-Za-z0-9]+",
    )
    .unwrap()
});

/// How many ancestor levels the post-id search climbs.
const TWEET_ID_SEARCH_DEPTH: usize = 10;

/// Identity of an image: the last path segment of its normalized URL.
#[must_use]
pub fn image_identity(url: &str) -> String {
    let normalized = normalize_image_url(url);
    match last_segment(&normalized) {
        Some(segment) => segment.to_string(),
        None => format!("img_{}", short_hash(&normalized)),
    }
}

/// Identity of a video element, assigned once and cached on the node.
///
/// Derivation order: source filename, hash of a blob source, poster-derived
/// token, random token.
pub fn video_identity(doc: &mut Document, video: NodeId) -> String {
    if let Some(existing) = doc.non_empty_attr(video, VIDEO_ID_ATTR) {
        return existing.to_string();
    }
    let identity = derive_video_identity(doc, video);
    doc.set_attr(video, VIDEO_ID_ATTR, &identity);
    identity
}

fn derive_video_identity(doc: &Document, video: NodeId) -> String {
    if let Some(source) = resolve_video_source_url(doc, video) {
        if !source.starts_with("blob:") {
            if let Some(stem) = filename_stem(&source) {
                return format!("video_{stem}");
            }
        }
        return format!("video_{}", short_hash(&source));
    }
    if let Some(stem) = doc.non_empty_attr(video, "poster").and_then(filename_stem) {
        return format!("poster_{stem}");
    }
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("video_{token}")
}

/// Best playable source URL of a video element.
///
/// Tries the `src` attribute, a nested `<source>`, the resolved current
/// source, and finally a URL derived from the poster image.
#[must_use]
pub fn resolve_video_source_url(doc: &Document, video: NodeId) -> Option<String> {
    let direct = doc
        .non_empty_attr(video, "src")
        .or_else(|| {
            doc.select_first(video, &SOURCE_WITH_SRC)
                .and_then(|source| doc.non_empty_attr(source, "src"))
        })
        .or_else(|| doc.current_src(video).filter(|s| !s.is_empty()));
    if let Some(url) = direct {
        return Some(upgrade_protocol_relative(url.trim()));
    }
    doc.non_empty_attr(video, "poster")
        .and_then(|poster| poster_to_media_url(poster.trim()))
}

/// Derive a direct media URL from a poster image URL.
#[must_use]
pub fn poster_to_media_url(poster: &str) -> Option<String> {
    let poster = upgrade_protocol_relative(poster);
    if let Some(caps) = TWEET_VIDEO_THUMB.captures(&poster) {
        return Some(format!("https://video.twimg.com/tweet_video/{}.mp4", &caps[1]));
    }
    if let Some(caps) = EXT_VIDEO_THUMB.captures(&poster) {
        return Some(format!(
            "https://video.twimg.com/ext_tw_video/{}/pu/vid/{}.mp4",
            &caps[1], &caps[2]
        ));
    }
    let base = poster.split(['?', '#']).next().unwrap_or(&poster);
    let segment_start = base.rfind('/').map_or(0, |i| i + 1);
    let dot = base[segment_start..].rfind('.')?;
    Some(format!("{}.mp4", &base[..segment_start + dot]))
}

/// Author handle of the post containing `node`, always prefixed with `@`.
#[must_use]
pub fn resolve_author(doc: &Document, node: NodeId) -> String {
    let handle = author_from_post(doc, node)
        .or_else(|| author_from_location(doc.location()))
        .or_else(|| author_from_cell(doc, node))
        .or_else(|| author_from_dialog(doc, node))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    format!("@{handle}")
}

fn author_from_post(doc: &Document, node: NodeId) -> Option<String> {
    let post = doc.closest(node, &POST)?;

    let from_user_name = doc.select(post, &USER_NAME_SPAN).into_iter().find_map(|span| {
        let text = doc.text_content(span);
        let handle = text.trim().strip_prefix('@')?;
        HANDLE.is_match(handle).then(|| handle.to_string())
    });
    if from_user_name.is_some() {
        return from_user_name;
    }

    let from_status_link = doc.select(post, &STATUS_LINK).into_iter().find_map(|link| {
        let href = doc.attr(link, "href")?;
        let handle = STATUS_AUTHOR.captures(href)?.get(1)?.as_str();
        (!is_reserved(handle)).then(|| handle.to_string())
    });
    if from_status_link.is_some() {
        return from_status_link;
    }

    doc.select(post, &ROOT_RELATIVE_LINK)
        .into_iter()
        .filter(|link| doc.attr(*link, "aria-hidden") != Some("true"))
        .find_map(|link| {
            let href = doc.attr(link, "href")?;
            let handle = PROFILE_HREF.captures(href)?.get(1)?.as_str();
            (!is_reserved(handle)).then(|| handle.to_string())
        })
}

fn author_from_location(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let first = url.path_segments()?.next()?;
    (HANDLE.is_match(first) && !is_reserved(first)).then(|| first.to_string())
}

fn author_from_cell(doc: &Document, node: NodeId) -> Option<String> {
    let cell = doc.closest(node, &CELL)?;
    let text = doc.text_content(cell);
    HANDLE_IN_TEXT
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

fn author_from_dialog(doc: &Document, node: NodeId) -> Option<String> {
    let dialog = doc.closest(node, &DIALOG)?;
    doc.descendants(dialog).into_iter().find_map(|id| {
        let handle = doc.text(id)?.trim().strip_prefix('@')?;
        HANDLE.is_match(handle).then(|| handle.to_string())
    })
}

fn is_reserved(segment: &str) -> bool {
    RESERVED_ROUTES
        .iter()
        .any(|route| route.eq_ignore_ascii_case(segment))
}

/// Numeric id of the post containing `node`.
#[must_use]
pub fn resolve_tweet_id(doc: &Document, node: NodeId) -> Option<String> {
    let in_post = doc
        .closest(node, &POST)
        .and_then(|post| first_status_id(doc, post));
    if in_post.is_some() {
        return in_post;
    }

    if let Some(caps) = STATUS_ID.captures(doc.location()) {
        return Some(caps[1].to_string());
    }

    doc.ancestors(node)
        .into_iter()
        .filter(|ancestor| *ancestor != doc.root())
        .take(TWEET_ID_SEARCH_DEPTH)
        .find_map(|ancestor| first_status_id(doc, ancestor))
}

fn first_status_id(doc: &Document, scope: NodeId) -> Option<String> {
    doc.select(scope, &STATUS_LINK).into_iter().find_map(|link| {
        let href = doc.attr(link, "href")?;
        STATUS_ID.captures(href).map(|caps| caps[1].to_string())
    })
}

fn last_segment(url: &str) -> Option<&str> {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    base.rsplit('/').next().filter(|s| !s.is_empty())
}

fn filename_stem(url: &str) -> Option<&str> {
    let segment = last_segment(url)?;
    let stem = segment.rsplit_once('.').map_or(segment, |(stem, _)| stem);
    (!stem.is_empty()).then_some(stem)
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}
