//! Media classification, URL normalization and identity resolution.

mod classifier;
mod identity;
mod normalize;

pub use classifier::{is_relevant_image, is_relevant_video, MediaThresholds};
pub use identity::{
    image_identity, poster_to_media_url, resolve_author, resolve_tweet_id,
    resolve_video_source_url, video_identity,
};
pub use normalize::{normalize_image_url, upgrade_protocol_relative};

use crate::dom::{Document, NodeId};

/// Kind of media a control saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Gif,
}

impl MediaKind {
    /// Kind of a media element, or `None` for anything else.
    #[must_use]
    pub fn of(doc: &Document, node: NodeId) -> Option<Self> {
        match doc.tag(node)? {
            "img" => Some(Self::Image),
            "video" if is_gif_like(doc, node) => Some(Self::Gif),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Idle label of the control.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "Save",
            Self::Video => "Save Video",
            Self::Gif => "Save GIF",
        }
    }

    /// Media type as the backend names it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Gif => "gif",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_video(self) -> bool {
        matches!(self, Self::Video | Self::Gif)
    }
}

/// Looping videos and videos served from the GIF paths are animated GIFs.
#[must_use]
pub fn is_gif_like(doc: &Document, video: NodeId) -> bool {
    if doc.attr(video, "loop").is_some() {
        return true;
    }
    let source = resolve_video_source_url(doc, video).unwrap_or_default();
    let poster = doc.attr(video, "poster").unwrap_or_default();
    source.contains("/tweet_video/") || poster.contains("/tweet_video_thumb/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_html, Selector};

    #[test]
    fn test_kind_of_elements() {
        let doc = parse_html(
            r#"<img src="a">
               <video id="gif" loop src="https://video.twimg.com/tweet_video/XYZ.mp4"></video>
               <video id="gifpath" src="https://video.twimg.com/tweet_video/XYZ.mp4"></video>
               <video id="clip" src="https://video.twimg.com/ext_tw_video/1/pu/vid/A.mp4"></video>
               <p>text</p>"#,
            "https://x.com/home",
        );
        let find = |s: &str| {
            doc.select_first(doc.root(), &Selector::parse(s).unwrap())
                .unwrap()
        };
        assert_eq!(MediaKind::of(&doc, find("img")), Some(MediaKind::Image));
        assert_eq!(MediaKind::of(&doc, find("#gif")), Some(MediaKind::Gif));
        assert_eq!(MediaKind::of(&doc, find("#gifpath")), Some(MediaKind::Gif));
        assert_eq!(MediaKind::of(&doc, find("#clip")), Some(MediaKind::Video));
        assert_eq!(MediaKind::of(&doc, find("p")), None);
        assert_eq!(MediaKind::Gif.label(), "Save GIF");
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [MediaKind::Image, MediaKind::Video, MediaKind::Gif] {
            assert_eq!(MediaKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MediaKind::parse("audio"), None);
    }
}
