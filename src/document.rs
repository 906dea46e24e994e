//! Normalized, region-classified document tree.
//!
//! Both fetch paths end up here: static HTML is parsed with `scraper`
//! (html5ever), rendered pages arrive as a flattened [`SnapshotNode`] tree.
//! Non-content elements are dropped while building and every remaining node
//! carries its [`Region`].

use scraper::{ElementRef, Html};

use crate::regions::{classify, ElementView, Region};
use crate::render::SnapshotNode;

/// Index of a node in its [`Document`].
pub type NodeId = usize;

/// Elements whose subtree never carries readable content.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "object", "embed", "canvas",
    "meta", "link",
];

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// An element with its lower-case tag name and attributes.
    Element {
        /// Tag name.
        tag: String,
        /// Attributes in document order.
        attrs: Vec<(String, String)>,
    },
    /// A text node.
    Text(String),
}

/// A structural node.
#[derive(Debug, Clone)]
pub struct Node {
    /// Payload.
    pub kind: NodeKind,
    /// Parent node, `None` for the root.
    pub parent: Option<NodeId>,
    /// Children in document order.
    pub children: Vec<NodeId>,
    /// Region classification.
    pub region: Region,
}

impl Node {
    /// Tag name, for elements.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Attribute value, for elements.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Text, for text nodes.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }
}

/// An in-memory document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    title: Option<String>,
    base_href: Option<String>,
}

impl Document {
    /// Parse raw HTML.
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut builder = Builder::default();
        let root = parsed.root_element();

        // Pending (scraper node, parent in our arena). Children are pushed in
        // reverse so the stack pops them in document order.
        let mut stack = vec![(*root, None::<NodeId>)];

        while let Some((node, parent)) = stack.pop() {
            match node.value() {
                scraper::Node::Element(element) => {
                    let tag = element.name().to_ascii_lowercase();
                    if tag == "head" {
                        if let Some(head) = ElementRef::wrap(node) {
                            builder.read_head(head);
                        }
                        continue;
                    }
                    let attrs = element
                        .attrs()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                        .collect();
                    if let Some(id) = builder.element(parent, tag, attrs) {
                        for child in node.children().rev() {
                            stack.push((child, Some(id)));
                        }
                    }
                }
                scraper::Node::Text(text) => {
                    if let Some(parent) = parent {
                        builder.text(parent, text);
                    }
                }
                _ => {}
            }
        }

        builder.finish()
    }

    /// Build from a rendered DOM snapshot whose shadow roots were already
    /// flattened into the light tree.
    pub fn from_snapshot(root: &SnapshotNode) -> Self {
        let mut builder = Builder::default();
        let mut stack: Vec<(&SnapshotNode, Option<NodeId>)> = vec![(root, None)];

        while let Some((node, parent)) = stack.pop() {
            match node {
                SnapshotNode::Element {
                    tag,
                    attrs,
                    children,
                    ..
                } => {
                    let tag = tag.to_ascii_lowercase();
                    if tag == "head" {
                        builder.read_snapshot_head(children);
                        continue;
                    }
                    if tag == "title" && builder.title.is_none() {
                        builder.title = Some(collapse_whitespace(&node.text_content()));
                        continue;
                    }
                    let attrs = attrs
                        .iter()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                        .collect();
                    if let Some(id) = builder.element(parent, tag, attrs) {
                        for child in children.iter().rev() {
                            stack.push((child, Some(id)));
                        }
                    }
                }
                SnapshotNode::Text { text } => {
                    if let Some(parent) = parent {
                        builder.text(parent, text);
                    }
                }
            }
        }

        builder.finish()
    }

    /// Root node id. Always `0` for non-empty documents.
    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(0)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// All nodes, in document (pre-)order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    /// Contents of `<title>`, if declared.
    pub fn title_meta(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    /// `href` of `<base>`, if declared.
    pub fn base_href(&self) -> Option<&str> {
        self.base_href.as_deref()
    }

    /// Pre-order descendants of `id`, excluding `id` itself.
    ///
    /// Nodes are stored in pre-order, so a subtree is a contiguous range.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let end = self.subtree_end(id);
        (id + 1)..end
    }

    /// One past the last node of the subtree rooted at `id`.
    pub fn subtree_end(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            match self.nodes[current].children.last() {
                Some(&last) => current = last,
                None => return current + 1,
            }
        }
    }

    /// Whether `ancestor` contains `node` (or is it).
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node >= ancestor && node < self.subtree_end(ancestor)
    }

    /// Ids of elements with the given tag, in document order.
    pub fn elements_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes()
            .filter(move |(_, n)| n.tag() == Some(tag))
            .map(|(id, _)| id)
    }

    /// Concatenated raw text of a subtree, whitespace collapsed.
    pub fn text_of(&self, id: NodeId) -> String {
        let raw: String = std::iter::once(id)
            .chain(self.descendants(id))
            .filter_map(|n| self.nodes[n].text())
            .collect();
        collapse_whitespace(&raw)
    }
}

/// Arena builder shared by the HTML and snapshot paths.
///
/// Nodes are appended in pre-order, which [`Document::descendants`] relies on.
#[derive(Default)]
struct Builder {
    nodes: Vec<Node>,
    title: Option<String>,
    base_href: Option<String>,
}

impl Builder {
    fn element(
        &mut self,
        parent: Option<NodeId>,
        tag: String,
        attrs: Vec<(String, String)>,
    ) -> Option<NodeId> {
        if STRIPPED_TAGS.contains(&tag.as_str()) || tag == "head" {
            return None;
        }
        if tag == "title" {
            // A stray <title> in the body is metadata, not content.
            return None;
        }
        if attrs
            .iter()
            .any(|(k, v)| k == "hidden" || (k == "aria-hidden" && v == "true"))
        {
            return None;
        }

        let parent_region = parent.map_or(Region::Unknown, |p| self.nodes[p].region);
        let own = classify(&ElementView::new(&tag, &attrs));
        let region = Region::resolve(parent_region, own);

        Some(self.push(parent, NodeKind::Element { tag, attrs }, region))
    }

    fn text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        let region = self.nodes[parent].region;
        self.push(Some(parent), NodeKind::Text(text.to_string()), region);
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind, region: Region) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            region,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    fn read_head(&mut self, head: ElementRef<'_>) {
        for element in head.descendants().filter_map(ElementRef::wrap) {
            match element.value().name() {
                "title" if self.title.is_none() => {
                    self.title = Some(collapse_whitespace(&element.text().collect::<String>()));
                }
                "base" if self.base_href.is_none() => {
                    self.base_href = element.value().attr("href").map(str::to_string);
                }
                _ => {}
            }
        }
    }

    fn read_snapshot_head(&mut self, children: &[SnapshotNode]) {
        for child in children {
            if let SnapshotNode::Element { tag, attrs, .. } = child {
                match tag.to_ascii_lowercase().as_str() {
                    "title" if self.title.is_none() => {
                        self.title = Some(collapse_whitespace(&child.text_content()));
                    }
                    "base" if self.base_href.is_none() => {
                        self.base_href = attrs
                            .iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case("href"))
                            .map(|(_, v)| v.clone());
                    }
                    _ => {}
                }
            }
        }
    }

    fn finish(self) -> Document {
        Document {
            nodes: self.nodes,
            title: self.title,
            base_href: self.base_href,
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_reads_head() {
        let doc = Document::parse_html(
            "<html><head><title> My  Page </title><base href=\"/root/\"></head>\
             <body><script>var x = 1;</script><p>Hello</p></body></html>",
        );
        assert_eq!(doc.title_meta(), Some("My Page"));
        assert_eq!(doc.base_href(), Some("/root/"));
        assert!(doc.elements_by_tag("script").next().is_none());
        let body = doc.elements_by_tag("body").next().unwrap();
        assert_eq!(doc.text_of(body), "Hello");
    }

    #[test]
    fn classification_propagates_to_descendants() {
        let doc = Document::parse_html(
            "<body><div class=\"site-footer\"><div class=\"main\"><p>Legal</p></div></div>\
             <main><nav><a href=\"/x\">X</a></nav><p>Story</p></main></body>",
        );
        let legal = doc.elements_by_tag("p").next().unwrap();
        assert_eq!(doc.node(legal).region, Region::Footer);

        let anchor = doc.elements_by_tag("a").next().unwrap();
        assert_eq!(doc.node(anchor).region, Region::Nav);

        let story = doc.elements_by_tag("p").nth(1).unwrap();
        assert_eq!(doc.node(story).region, Region::Main);
    }

    #[test]
    fn unclassified_document_is_all_candidate_content() {
        let doc = Document::parse_html("<div><p>Only text</p></div>");
        assert!(doc.nodes().all(|(_, n)| !n.region.is_boilerplate()));
    }

    #[test]
    fn descendants_are_contiguous() {
        let doc = Document::parse_html("<body><div><p>a</p><p>b</p></div><p>c</p></body>");
        let div = doc.elements_by_tag("div").next().unwrap();
        let inside: Vec<_> = doc.descendants(div).collect();
        assert_eq!(inside.len(), 4);
        let outside = doc.elements_by_tag("p").nth(2).unwrap();
        assert!(!doc.contains(div, outside));
    }
}
