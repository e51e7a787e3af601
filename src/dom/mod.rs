//! In-memory model of the host page.
//!
//! The page is a [`scraper::Html`] tree; nodes are addressed by
//! [`ego_tree::NodeId`]. A node id is the node's identity: two ids are the
//! same node exactly when they compare equal, which is what container
//! deduplication and the host lock table key on. Removed nodes stay in the
//! tree (detached) so late callbacks holding an id can still ask whether it
//! is attached.

mod page;
mod parse;

use std::collections::HashMap;

use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{CaseSensitivity, ElementRef, Html, Node, StrTendril};

pub use ego_tree::NodeId;
pub use page::{ChangeNotice, Page};
pub use parse::parse_html;
pub use scraper::Selector;

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Width and height in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether both sides reach `min`.
    #[must_use]
    pub fn at_least(&self, min: f64) -> bool {
        self.width >= min && self.height >= min
    }
}

/// Live media properties the markup does not carry.
#[derive(Debug, Clone, Default)]
struct MediaState {
    /// Resolved source of a media element (the DOM `currentSrc` property).
    current_src: Option<String>,
    rendered: Option<Size>,
    natural: Option<Size>,
}

/// A mutable page document.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    media: HashMap<NodeId, MediaState>,
    location: String,
}

impl Document {
    /// Create an empty document at `location`.
    #[must_use]
    pub fn new(location: &str) -> Self {
        Self::from_html(Html::new_document(), location)
    }

    fn from_html(html: Html, location: &str) -> Self {
        Self {
            html,
            media: HashMap::new(),
            location: location.to_string(),
        }
    }

    /// Parse an HTML page snapshot.
    #[must_use]
    pub fn parse_html(html: &str, location: &str) -> Self {
        parse_html(html, location)
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.html.tree.root().id()
    }

    /// Current page URL.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = location.to_string();
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let name = QualName::new(
            None,
            Namespace::from(HTML_NS),
            LocalName::from(tag.to_ascii_lowercase()),
        );
        self.html
            .tree
            .orphan(Node::Element(Element::new(name, Vec::new())))
            .id()
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.html
            .tree
            .orphan(Node::Text(Text {
                text: StrTendril::from(text),
            }))
            .id()
    }

    /// Append `child` to `parent`, moving it out of any previous parent.
    ///
    /// Appending the root or appending a node below itself is ignored.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if child == self.root()
            || child == parent
            || self.contains(child, parent)
            || self.html.tree.get(child).is_none()
        {
            return;
        }
        if let Some(mut parent) = self.html.tree.get_mut(parent) {
            parent.append_id(child);
        }
    }

    /// Detach a node (and its subtree) from its parent.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root() {
            return;
        }
        if let Some(mut node) = self.html.tree.get_mut(node) {
            node.detach();
        }
    }

    /// Whether the node is reachable from the document root.
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root() || self.ancestors(node).last().copied() == Some(self.root())
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.html.tree.get(node)?.parent().map(|p| p.id())
    }

    /// Parent, unless the parent is the document root.
    #[must_use]
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|p| *p != self.root())
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    /// Ancestors from the parent upwards, ending at the root when attached.
    #[must_use]
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node)
            .map(|n| n.ancestors().map(|a| a.id()).collect())
            .unwrap_or_default()
    }

    /// Descendants in document order, excluding `node` itself.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node)
            .map(|n| n.descendants().skip(1).map(|d| d.id()).collect())
            .unwrap_or_default()
    }

    /// Whether `node` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.html
            .tree
            .get(node)
            .is_some_and(|n| n.ancestors().any(|a| a.id() == ancestor))
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.html.tree.get(node)?.value().as_element()
    }

    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    /// Lowercase tag name of an element.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(Element::name)
    }

    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attr(name)
    }

    /// Attribute value, treating an empty value as absent.
    #[must_use]
    pub fn non_empty_attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attr(node, name).filter(|v| !v.trim().is_empty())
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        self.edit_attrs(node, |attrs| {
            if let Some(slot) = attrs.iter_mut().find(|(k, _)| *k == name) {
                slot.1 = value.to_string();
            } else {
                attrs.push((name, value.to_string()));
            }
        });
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        self.edit_attrs(node, |attrs| attrs.retain(|(k, _)| k != name));
    }

    /// Rebuild an element with edited attributes.
    ///
    /// `Element` caches its id and class list on first use, so attributes are
    /// never patched in place.
    fn edit_attrs(&mut self, node: NodeId, edit: impl FnOnce(&mut Vec<(String, String)>)) {
        let Some(element) = self.element(node) else {
            return;
        };
        let name = element.name.clone();
        let mut attrs: Vec<(String, String)> = element
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        edit(&mut attrs);
        let attributes = attrs
            .into_iter()
            .map(|(k, v)| Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(k)),
                value: v.into(),
            })
            .collect();
        if let Some(mut node) = self.html.tree.get_mut(node) {
            *node.value() = Node::Element(Element::new(name, attributes));
        }
    }

    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .is_some_and(|e| e.has_class(class, CaseSensitivity::CaseSensitive))
    }

    /// Text of a text node.
    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.html.tree.get(node)?.value().as_text().map(|t| &**t)
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        if let Some(text) = self.text(node) {
            return text.to_string();
        }
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Make `text` the only content of `node`.
    ///
    /// A lone text child is rewritten in place; anything else is replaced by
    /// one new text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let [only] = self.children(node).as_slice() {
            if let Some(mut child) = self.html.tree.get_mut(*only) {
                if let Node::Text(existing) = child.value() {
                    existing.text = StrTendril::from(text);
                    return;
                }
            }
        }
        for child in self.children(node) {
            self.remove(child);
        }
        let text_node = self.create_text(text);
        self.append_child(node, text_node);
    }

    #[must_use]
    pub fn current_src(&self, node: NodeId) -> Option<&str> {
        self.media.get(&node)?.current_src.as_deref()
    }

    pub fn set_current_src(&mut self, node: NodeId, src: Option<&str>) {
        if let Some(state) = self.media_mut(node) {
            state.current_src = src.map(str::to_string);
        }
    }

    /// Laid-out size, if the host has reported one.
    #[must_use]
    pub fn rendered_size(&self, node: NodeId) -> Option<Size> {
        self.media.get(&node)?.rendered
    }

    pub fn set_rendered_size(&mut self, node: NodeId, size: Option<Size>) {
        if let Some(state) = self.media_mut(node) {
            state.rendered = size;
        }
    }

    /// Intrinsic media size, if loaded.
    #[must_use]
    pub fn natural_size(&self, node: NodeId) -> Option<Size> {
        self.media.get(&node)?.natural
    }

    pub fn set_natural_size(&mut self, node: NodeId, size: Option<Size>) {
        if let Some(state) = self.media_mut(node) {
            state.natural = size;
        }
    }

    fn media_mut(&mut self, node: NodeId) -> Option<&mut MediaState> {
        if !self.is_element(node) {
            return None;
        }
        Some(self.media.entry(node).or_default())
    }

    /// Value of the `position` declaration in the inline style, if any.
    #[must_use]
    pub fn inline_position(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "style")?
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .find(|(prop, _)| prop.trim().eq_ignore_ascii_case("position"))
            .map(|(_, value)| value.trim())
    }

    /// Add a `position` declaration to the inline style.
    pub fn set_inline_position(&mut self, node: NodeId, position: &str) {
        let kept: Vec<String> = self
            .attr(node, "style")
            .unwrap_or("")
            .split(';')
            .map(str::trim)
            .filter(|decl| !decl.is_empty())
            .filter(|decl| {
                decl.split_once(':')
                    .map_or(true, |(prop, _)| !prop.trim().eq_ignore_ascii_case("position"))
            })
            .map(str::to_string)
            .collect();
        let mut style = kept.join("; ");
        if !style.is_empty() {
            style.push_str("; ");
        }
        style.push_str("position: ");
        style.push_str(position);
        self.set_attr(node, "style", &style);
    }

    /// All elements under `scope` matching `selector`, in document order.
    #[must_use]
    pub fn select(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(*id, selector))
            .collect()
    }

    /// All attached elements matching `selector`.
    #[must_use]
    pub fn select_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.select(self.root(), selector)
    }

    /// First element under `scope` matching `selector`.
    #[must_use]
    pub fn select_first(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| self.matches(*id, selector))
    }

    #[must_use]
    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.html
            .tree
            .get(node)
            .and_then(ElementRef::wrap)
            .is_some_and(|element| selector.matches(&element))
    }

    /// Nearest inclusive ancestor matching `selector`.
    #[must_use]
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find(|id| self.matches(*id, selector))
    }

    /// Detach whitespace-only text nodes left behind by markup indentation.
    fn drop_blank_text(&mut self) {
        let blank: Vec<NodeId> = self
            .html
            .tree
            .nodes()
            .filter(|n| n.value().as_text().is_some_and(|t| t.trim().is_empty()))
            .map(|n| n.id())
            .collect();
        for id in blank {
            self.remove(id);
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.html.tree.nodes().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new("https://x.com/home");
        let root = doc.root();
        let article = doc.create_element("article");
        let div = doc.create_element("div");
        let img = doc.create_element("img");
        doc.append_child(root, article);
        doc.append_child(article, div);
        doc.append_child(div, img);
        (doc, article, div, img)
    }

    #[test]
    fn test_attach_and_remove() {
        let (mut doc, article, div, img) = sample();
        assert!(doc.is_attached(img));
        doc.remove(div);
        assert!(!doc.is_attached(img));
        assert!(!doc.is_attached(div));
        assert!(doc.is_attached(article));
        assert!(doc.is_attached(doc.root()));
        assert_eq!(doc.parent(img), Some(div));
    }

    #[test]
    fn test_orphan_is_not_attached() {
        let mut doc = Document::new("https://x.com/home");
        let span = doc.create_element("span");
        assert!(!doc.is_attached(span));
        doc.append_child(doc.root(), span);
        assert!(doc.is_attached(span));
    }

    #[test]
    fn test_append_moves_node() {
        let (mut doc, article, div, img) = sample();
        doc.append_child(article, img);
        assert_eq!(doc.parent(img), Some(article));
        assert!(doc.children(div).is_empty());
        assert_eq!(doc.children(article), vec![div, img]);
    }

    #[test]
    fn test_append_rejects_cycles() {
        let (mut doc, article, _div, img) = sample();
        doc.append_child(img, article);
        assert_eq!(doc.parent(article), Some(doc.root()));
        doc.append_child(img, img);
        assert_eq!(doc.parent(img).map(|p| doc.tag(p)), Some(Some("div")));
    }

    #[test]
    fn test_attributes() {
        let (mut doc, _article, div, _img) = sample();
        doc.set_attr(div, "class", "a b");
        assert!(doc.has_class(div, "b"));
        assert!(!doc.has_class(div, "c"));
        doc.set_attr(div, "class", "c");
        assert_eq!(doc.attr(div, "class"), Some("c"));
        doc.remove_attr(div, "class");
        assert_eq!(doc.attr(div, "class"), None);
    }

    #[test]
    fn test_selectors_see_attribute_edits() {
        let (mut doc, article, div, _img) = sample();
        let marked = Selector::parse("div.media-save-btn").unwrap();
        let by_id = Selector::parse("#host").unwrap();
        assert!(!doc.matches(div, &marked));

        doc.set_attr(div, "class", "media-save-btn");
        doc.set_attr(div, "id", "host");
        assert!(doc.matches(div, &marked));
        assert_eq!(doc.select_first(article, &by_id), Some(div));

        doc.set_attr(div, "class", "media-save-btn--saved");
        doc.remove_attr(div, "id");
        assert!(!doc.matches(div, &marked));
        assert_eq!(doc.select_first(article, &by_id), None);
    }

    #[test]
    fn test_media_state_is_kept_across_attribute_edits() {
        let (mut doc, _article, _div, img) = sample();
        doc.set_rendered_size(img, Some(Size::new(600.0, 400.0)));
        doc.set_current_src(img, Some("blob:https://x.com/1"));
        doc.set_attr(img, "src", "https://pbs.twimg.com/media/A.jpg");
        assert_eq!(doc.rendered_size(img), Some(Size::new(600.0, 400.0)));
        assert_eq!(doc.current_src(img), Some("blob:https://x.com/1"));
        assert_eq!(doc.tag(img), Some("img"));
    }

    #[test]
    fn test_inline_position() {
        let (mut doc, _article, div, _img) = sample();
        doc.set_attr(div, "style", "color: red; position: static");
        assert_eq!(doc.inline_position(div), Some("static"));
        doc.set_inline_position(div, "relative");
        assert_eq!(doc.inline_position(div), Some("relative"));
        assert_eq!(doc.attr(div, "style"), Some("color: red; position: relative"));
    }

    #[test]
    fn test_text_content() {
        let (mut doc, article, div, _img) = sample();
        let span = doc.create_element("span");
        doc.append_child(div, span);
        doc.set_text(span, "@alice");
        assert_eq!(doc.text_content(article), "@alice");
        doc.set_text(span, "@bob");
        assert_eq!(doc.text_content(article), "@bob");
    }

    #[test]
    fn test_set_text_reuses_text_node() {
        let (mut doc, _article, div, _img) = sample();
        let label = doc.create_element("span");
        doc.append_child(div, label);
        doc.set_text(label, "Save");
        let text = doc.children(label);
        let count = doc.node_count();

        for state in ["Saving...", "Saved", "Retry", "Save"] {
            doc.set_text(label, state);
        }
        assert_eq!(doc.children(label), text);
        assert_eq!(doc.node_count(), count);
        assert_eq!(doc.text_content(label), "Save");
    }

    #[test]
    fn test_set_text_replaces_element_children() {
        let (mut doc, article, div, img) = sample();
        doc.set_text(div, "gone");
        assert!(!doc.is_attached(img));
        assert_eq!(doc.children(div).len(), 1);
        assert_eq!(doc.text_content(article), "gone");
    }

    #[test]
    fn test_closest_is_inclusive() {
        let (doc, article, div, img) = sample();
        let sel = Selector::parse("div").unwrap();
        assert_eq!(doc.closest(img, &sel), Some(div));
        assert_eq!(doc.closest(div, &sel), Some(div));
        let sel = Selector::parse("section").unwrap();
        assert_eq!(doc.closest(img, &sel), None);
        let sel = Selector::parse("article").unwrap();
        assert_eq!(doc.closest(img, &sel), Some(article));
    }
}
