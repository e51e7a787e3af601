use tracing::debug;
use url::Url;

use crate::constants::DEFAULT_IMAGE_FORMAT;

/// Image formats recognised as a path extension.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif", "bmp"];

/// Rewrite a CDN image URL so it requests the original-resolution variant.
///
/// The result always carries `name=orig` and a `format` parameter. The format
/// comes from an explicit `format` parameter, else from the path extension
/// (which is dropped from the path), else defaults to `jpg`. `jpeg` is
/// spelled `jpg`. URLs that do not parse are rewritten textually with the
/// same rules. Blob URLs are returned unchanged.
#[must_use]
pub fn normalize_image_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("blob:") {
        return raw.to_string();
    }
    let absolute = upgrade_protocol_relative(raw);
    match Url::parse(&absolute) {
        Ok(url) => normalize_parsed(url),
        Err(e) => {
            debug!(url = %absolute, error = %e, "Image URL did not parse, using textual normalization");
            normalize_textual(&absolute)
        }
    }
}

/// Turn a protocol-relative `//host/path` URL into an explicit `https:` one.
#[must_use]
pub fn upgrade_protocol_relative(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

fn normalize_parsed(mut url: Url) -> String {
    let explicit = url
        .query_pairs()
        .find(|(key, value)| key == "format" && !value.is_empty())
        .map(|(_, value)| value.into_owned());
    let path = url.path().to_string();
    let (stem, extension) = split_extension(&path);
    let format = pick_format(explicit.as_deref(), extension);
    let stem = stem.to_string();

    url.set_path(&stem);
    url.set_query(Some(&format!("name=orig&format={format}")));
    url.set_fragment(None);
    url.to_string()
}

fn normalize_textual(raw: &str) -> String {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (without_fragment, None),
    };
    let explicit = query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.strip_prefix("format="))
            .find(|value| !value.is_empty())
    });
    let (stem, extension) = split_extension(base);
    let format = pick_format(explicit, extension);
    format!("{stem}?name=orig&format={format}")
}

fn pick_format(explicit: Option<&str>, extension: Option<&str>) -> String {
    let format = explicit
        .or(extension)
        .map_or_else(|| DEFAULT_IMAGE_FORMAT.to_string(), str::to_ascii_lowercase);
    if format == "jpeg" {
        "jpg".to_string()
    } else {
        format
    }
}

/// Split a recognised image extension off the last path segment.
fn split_extension(path: &str) -> (&str, Option<&str>) {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let Some(dot) = path[segment_start..].rfind('.') else {
        return (path, None);
    };
    let dot = segment_start + dot;
    let extension = &path[dot + 1..];
    if IMAGE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(extension))
    {
        (&path[..dot], Some(extension))
    } else {
        (path, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_format_and_size() {
        assert_eq!(
            normalize_image_url("https://pbs.twimg.com/media/ABC123?format=png&name=small"),
            "https://pbs.twimg.com/media/ABC123?name=orig&format=png"
        );
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            normalize_image_url("https://pbs.twimg.com/media/ABC123.jpeg?name=900x900"),
            "https://pbs.twimg.com/media/ABC123?name=orig&format=jpg"
        );
        assert_eq!(
            normalize_image_url("https://pbs.twimg.com/media/ABC123.webp"),
            "https://pbs.twimg.com/media/ABC123?name=orig&format=webp"
        );
    }

    #[test]
    fn test_jpeg_param_is_spelled_jpg() {
        assert_eq!(
            normalize_image_url("https://pbs.twimg.com/media/ABC123?format=jpeg"),
            "https://pbs.twimg.com/media/ABC123?name=orig&format=jpg"
        );
    }

    #[test]
    fn test_default_format() {
        assert_eq!(
            normalize_image_url("https://pbs.twimg.com/media/ABC123"),
            "https://pbs.twimg.com/media/ABC123?name=orig&format=jpg"
        );
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "https://pbs.twimg.com/media/ABC123?format=png&name=small",
            "https://pbs.twimg.com/media/XYZ.jpg",
            "pbs.twimg.com/media/NOSCHEME",
            "//pbs.twimg.com/media/REL?format=webp",
        ] {
            let once = normalize_image_url(input);
            assert_eq!(normalize_image_url(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_malformed_url_uses_textual_fallback() {
        let out = normalize_image_url("pbs.twimg.com/media/XYZ");
        assert_eq!(out, "pbs.twimg.com/media/XYZ?name=orig&format=jpg");

        let out = normalize_image_url("not a url/media/Q.png?name=small#frag");
        assert_eq!(out, "not a url/media/Q?name=orig&format=png");
    }

    #[test]
    fn test_protocol_relative() {
        assert_eq!(
            normalize_image_url("//pbs.twimg.com/media/ABC?format=gif"),
            "https://pbs.twimg.com/media/ABC?name=orig&format=gif"
        );
    }

    #[test]
    fn test_blob_unchanged() {
        let blob = "blob:https://x.com/0b7c1c4e-2a54-4f5b-9a3e-1c0d3f2e8a11";
        assert_eq!(normalize_image_url(blob), blob);
    }

    #[test]
    fn test_unknown_extension_kept() {
        assert_eq!(
            normalize_image_url("https://pbs.twimg.com/media/v1.2"),
            "https://pbs.twimg.com/media/v1.2?name=orig&format=jpg"
        );
    }
}
