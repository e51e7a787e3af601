use scraper::Html;

use super::{Document, NodeId, Size};

/// Build a [`Document`] from an HTML page snapshot.
///
/// `width`/`height` attributes on elements seed their rendered size, which is
/// the only layout information a static snapshot carries.
#[must_use]
pub fn parse_html(html: &str, location: &str) -> Document {
    let mut doc = Document::from_html(Html::parse_document(html), location);
    doc.drop_blank_text();
    let root = doc.root();
    for id in doc.descendants(root) {
        if let Some(size) = declared_size(&doc, id) {
            doc.set_rendered_size(id, Some(size));
        }
    }
    doc
}

fn declared_size(doc: &Document, node: NodeId) -> Option<Size> {
    let width = doc.attr(node, "width")?.trim().parse::<f64>().ok()?;
    let height = doc.attr(node, "height")?.trim().parse::<f64>().ok()?;
    Some(Size::new(width, height))
}
