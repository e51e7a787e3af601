//! Relevance predicates for candidate media elements.
//!
//! Both predicates are total: malformed or half-rendered elements simply
//! classify as irrelevant.

use crate::constants::{
    AVATAR, DIALOG, ICON_CONTROL, IMAGE_CDN_PATH, MEDIA_BEARING, POST, VIDEO,
};
use crate::dom::{Document, NodeId, Size};

use super::identity::resolve_video_source_url;

/// Minimum sizes below which media is treated as decoration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaThresholds {
    pub min_image: f64,
    pub min_video: f64,
}

impl Default for MediaThresholds {
    fn default() -> Self {
        Self {
            min_image: 50.0,
            min_video: 30.0,
        }
    }
}

/// Whether an `<img>` is post media that deserves a save control.
#[must_use]
pub fn is_relevant_image(doc: &Document, node: NodeId, thresholds: &MediaThresholds) -> bool {
    if doc.tag(node) != Some("img") {
        return false;
    }
    let Some(src) = doc.non_empty_attr(node, "src") else {
        return false;
    };
    if !(src.contains(IMAGE_CDN_PATH) || src.starts_with("blob:")) {
        return false;
    }
    if is_profile_image(doc, node, src) || is_video_poster(doc, node, src) {
        return false;
    }
    if doc.closest(node, &DIALOG).is_none() && doc.closest(node, &MEDIA_BEARING).is_none() {
        return false;
    }
    meets_size(doc, node, thresholds.min_image)
}

/// Whether a `<video>` is post media that deserves a save control.
#[must_use]
pub fn is_relevant_video(doc: &Document, node: NodeId, thresholds: &MediaThresholds) -> bool {
    if doc.tag(node) != Some("video") {
        return false;
    }
    let playable = resolve_video_source_url(doc, node).is_some()
        || doc.non_empty_attr(node, "poster").is_some();
    if !playable {
        return false;
    }
    if !meets_size(doc, node, thresholds.min_video) {
        return false;
    }
    if doc
        .ancestors(node)
        .into_iter()
        .any(|ancestor| doc.matches(ancestor, &ICON_CONTROL))
    {
        return false;
    }
    doc.closest(node, &POST).is_some() || doc.closest(node, &DIALOG).is_some()
}

fn is_profile_image(doc: &Document, node: NodeId, src: &str) -> bool {
    src.contains("profile_images")
        || src.contains("profile_banners")
        || doc.closest(node, &AVATAR).is_some()
}

/// An image that is the poster frame of a sibling video.
fn is_video_poster(doc: &Document, node: NodeId, src: &str) -> bool {
    if src.contains("_video_thumb/") {
        return true;
    }
    let Some(parent) = doc.parent_element(node) else {
        return false;
    };
    let scope = doc.parent_element(parent).unwrap_or(parent);
    doc.select(scope, &VIDEO)
        .into_iter()
        .any(|video| doc.attr(video, "poster") == Some(src))
}

/// Unknown size never disqualifies.
fn meets_size(doc: &Document, node: NodeId, min: f64) -> bool {
    doc.rendered_size(node)
        .or_else(|| doc.natural_size(node))
        .map_or(true, |size: Size| size.at_least(min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_html, Selector};

    fn first(doc: &Document, sel: &str) -> NodeId {
        doc.select_first(doc.root(), &Selector::parse(sel).unwrap())
            .unwrap()
    }

    fn image_in(html: &str) -> (Document, NodeId) {
        let doc = parse_html(html, "https://x.com/home");
        let img = first(&doc, "img");
        (doc, img)
    }

    #[test]
    fn test_post_photo_is_relevant() {
        let (doc, img) = image_in(
            r#"<article><div data-testid="tweetPhoto"><img src="https://pbs.twimg.com/media/A?format=jpg"></div></article>"#,
        );
        assert!(is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_non_cdn_image_rejected() {
        let (doc, img) = image_in(
            r#"<article><img src="https://abs.twimg.com/emoji/v2/svg/1f600.svg"></article>"#,
        );
        assert!(!is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_avatar_rejected() {
        let (doc, img) = image_in(
            r#"<article><div data-testid="Tweet-User-Avatar"><img src="https://pbs.twimg.com/media/A"></div></article>"#,
        );
        assert!(!is_relevant_image(&doc, img, &MediaThresholds::default()));

        let (doc, img) = image_in(
            r#"<article><img src="https://pbs.twimg.com/profile_images/1/a.jpg"></article>"#,
        );
        assert!(!is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_poster_image_rejected() {
        let (doc, img) = image_in(
            r#"<article><div data-testid="videoPlayer">
                 <video poster="https://pbs.twimg.com/media/P.jpg"></video>
                 <div><img src="https://pbs.twimg.com/media/P.jpg"></div>
               </div></article>"#,
        );
        assert!(!is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_image_outside_media_structures_rejected() {
        let (doc, img) = image_in(r#"<nav><img src="https://pbs.twimg.com/media/A"></nav>"#);
        assert!(!is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_dialog_image_accepted_without_container() {
        let (doc, img) = image_in(
            r#"<div role="dialog"><div><img src="https://pbs.twimg.com/media/A"></div></div>"#,
        );
        assert!(is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_image_size_threshold() {
        let (mut doc, img) = image_in(
            r#"<article><img src="https://pbs.twimg.com/media/A" width="40" height="40"></article>"#,
        );
        assert!(!is_relevant_image(&doc, img, &MediaThresholds::default()));
        doc.set_rendered_size(img, None);
        doc.set_natural_size(img, Some(Size::new(1200.0, 800.0)));
        assert!(is_relevant_image(&doc, img, &MediaThresholds::default()));
    }

    #[test]
    fn test_video_rules() {
        let doc = parse_html(
            r#"<article>
                 <div data-testid="videoPlayer"><video id="ok" src="https://video.twimg.com/tweet_video/X.mp4"></video></div>
                 <button><video id="icon" src="https://video.twimg.com/tweet_video/Y.mp4"></video></button>
                 <video id="tiny" src="https://video.twimg.com/tweet_video/Z.mp4" width="20" height="20"></video>
                 <video id="nosrc"></video>
               </article>
               <video id="loose" src="https://video.twimg.com/tweet_video/W.mp4"></video>"#,
            "https://x.com/home",
        );
        let thresholds = MediaThresholds::default();
        assert!(is_relevant_video(&doc, first(&doc, "#ok"), &thresholds));
        assert!(!is_relevant_video(&doc, first(&doc, "#icon"), &thresholds));
        assert!(!is_relevant_video(&doc, first(&doc, "#tiny"), &thresholds));
        assert!(!is_relevant_video(&doc, first(&doc, "#nosrc"), &thresholds));
        assert!(!is_relevant_video(&doc, first(&doc, "#loose"), &thresholds));
    }

    #[test]
    fn test_poster_only_video_is_relevant() {
        let doc = parse_html(
            r#"<div role="dialog"><video poster="https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/T.jpg"></video></div>"#,
            "https://x.com/home",
        );
        assert!(is_relevant_video(
            &doc,
            first(&doc, "video"),
            &MediaThresholds::default()
        ));
    }
}
