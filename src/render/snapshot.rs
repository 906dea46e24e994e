//! DOM snapshots of rendered pages and shadow-root flattening.
//!
//! A browser backend reports the live DOM as a flat, pre-ordered list of
//! [`RawNode`]s, shadow-root content included and marked as such. The list
//! is assembled into a [`SnapshotNode`] tree, then
//! [`flatten_shadow_roots`] inlines every shadow root at its host so the
//! normalizer sees a single light tree.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Handle of a live element, valid until the next snapshot of the same page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(pub u64);

/// One node of a flat snapshot. Parents always precede their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    /// Index of the parent in the node list; `None` for the root.
    pub parent: Option<usize>,
    /// Whether this node lives in the parent's shadow root.
    #[serde(default)]
    pub shadow: bool,
    /// Tag name, for elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Attributes, for elements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<(String, String)>,
    /// Text, for text nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Live handle, for elements.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeRef>,
}

impl RawNode {
    /// An element node.
    pub fn element(parent: Option<usize>, tag: &str, attrs: &[(&str, &str)]) -> Self {
        Self {
            parent,
            shadow: false,
            tag: Some(tag.to_string()),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: None,
            node_ref: None,
        }
    }

    /// A text node.
    pub fn text(parent: usize, text: &str) -> Self {
        Self {
            parent: Some(parent),
            shadow: false,
            tag: None,
            attrs: Vec::new(),
            text: Some(text.to_string()),
            node_ref: None,
        }
    }

    /// Mark the node as living in its parent's shadow root.
    pub fn in_shadow(mut self) -> Self {
        self.shadow = true;
        self
    }

    /// Attach a live handle.
    pub fn with_ref(mut self, node_ref: u64) -> Self {
        self.node_ref = Some(NodeRef(node_ref));
        self
    }
}

/// Deepest nesting kept when a snapshot is assembled. Nodes below it are
/// lifted to become following siblings at this depth, the way browser HTML
/// parsers treat runaway nesting, so every tree walk stays shallow.
pub const MAX_DEPTH: usize = 256;

/// A flat DOM snapshot as produced by a browser backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Document URL at capture time, after redirects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Nodes in pre-order.
    pub nodes: Vec<RawNode>,
}

impl RawSnapshot {
    /// A snapshot of `nodes` with no recorded URL.
    pub fn new(nodes: Vec<RawNode>) -> Self {
        Self { url: None, nodes }
    }

    /// Assemble the flat list into a tree.
    ///
    /// A list that does not describe a single pre-ordered tree cannot be
    /// extracted from at all and is reported as an extraction error.
    pub fn into_tree(mut self) -> Result<SnapshotNode> {
        clamp_depth(&mut self.nodes);
        let count = self.nodes.len();
        let mut light: Vec<Vec<SnapshotNode>> = (0..count).map(|_| Vec::new()).collect();
        let mut shadow: Vec<Option<Vec<SnapshotNode>>> = (0..count).map(|_| None).collect();
        let mut root = None;

        // Children have larger indices than their parents, so walking
        // backwards always finds a node's children already built.
        for (index, raw) in self.nodes.into_iter().enumerate().rev() {
            let node = match (raw.tag, raw.text) {
                (Some(tag), _) => {
                    let mut children = std::mem::take(&mut light[index]);
                    children.reverse();
                    let shadow_children = shadow[index].take().map(|mut nodes| {
                        nodes.reverse();
                        nodes
                    });
                    SnapshotNode::Element {
                        tag,
                        attrs: raw.attrs,
                        children,
                        shadow: shadow_children,
                        node_ref: raw.node_ref,
                    }
                }
                (None, Some(text)) => SnapshotNode::Text { text },
                (None, None) => {
                    return Err(Error::Extraction(format!(
                        "snapshot node {index} has neither tag nor text"
                    )))
                }
            };

            match raw.parent {
                None if root.is_none() => root = Some(node),
                None => {
                    return Err(Error::Extraction("snapshot has more than one root".into()));
                }
                Some(parent) if parent < index => {
                    if raw.shadow {
                        shadow[parent].get_or_insert_with(Vec::new).push(node);
                    } else {
                        light[parent].push(node);
                    }
                }
                Some(parent) => {
                    return Err(Error::Extraction(format!(
                        "snapshot node {index} refers to parent {parent} out of order"
                    )));
                }
            }
        }

        root.ok_or_else(|| Error::Extraction("snapshot is empty".into()))
    }
}

fn clamp_depth(nodes: &mut [RawNode]) {
    let mut depth = vec![0usize; nodes.len()];
    for index in 0..nodes.len() {
        let Some(parent) = nodes[index].parent.filter(|&p| p < index) else {
            continue;
        };
        if depth[parent] + 1 < MAX_DEPTH {
            depth[index] = depth[parent] + 1;
        } else {
            nodes[index].parent = nodes[parent].parent;
            nodes[index].shadow = nodes[parent].shadow;
            depth[index] = depth[parent];
        }
    }
}

/// A node of an assembled snapshot tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotNode {
    /// An element.
    Element {
        /// Tag name.
        tag: String,
        /// Attributes.
        attrs: Vec<(String, String)>,
        /// Light-DOM children.
        children: Vec<SnapshotNode>,
        /// Shadow-root children, when the element hosts a shadow root.
        shadow: Option<Vec<SnapshotNode>>,
        /// Live handle.
        node_ref: Option<NodeRef>,
    },
    /// A text node.
    Text {
        /// Text content.
        text: String,
    },
}

impl SnapshotNode {
    /// Attribute value, for elements.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            SnapshotNode::Element { attrs, .. } => attr(attrs, name),
            SnapshotNode::Text { .. } => None,
        }
    }

    /// Whether any shadow root remains in the tree.
    pub fn has_shadow_roots(&self) -> bool {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let SnapshotNode::Element {
                children, shadow, ..
            } = node
            {
                if shadow.is_some() {
                    return true;
                }
                stack.extend(children);
            }
        }
        false
    }

    /// Concatenated text of the subtree, shadow content before light
    /// children.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                SnapshotNode::Text { text: t } => text.push_str(t),
                SnapshotNode::Element {
                    children, shadow, ..
                } => {
                    stack.extend(children.iter().rev());
                    stack.extend(shadow.iter().flatten().rev());
                }
            }
        }
        text
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Inline every shadow root at the position of its host.
///
/// Recursion is bounded by [`MAX_DEPTH`], which [`RawSnapshot::into_tree`]
/// enforces.
///
/// A host's flattened children are its shadow content with each `<slot>`
/// replaced by the light children assigned to it (or the slot's fallback
/// content). Shadow roots without any slot keep their light children after
/// the shadow content.
pub fn flatten_shadow_roots(node: SnapshotNode) -> SnapshotNode {
    match node {
        SnapshotNode::Element {
            tag,
            attrs,
            children,
            shadow,
            node_ref,
        } => {
            let light: Vec<SnapshotNode> =
                children.into_iter().map(flatten_shadow_roots).collect();
            let children = match shadow {
                Some(shadow) => {
                    let shadow = shadow.into_iter().map(flatten_shadow_roots).collect();
                    project_slots(shadow, light)
                }
                None => light,
            };
            SnapshotNode::Element {
                tag,
                attrs,
                children,
                shadow: None,
                node_ref,
            }
        }
        text @ SnapshotNode::Text { .. } => text,
    }
}

/// Light children of a shadow host grouped by the slot they target.
struct SlotAssignments {
    named: Vec<(String, Vec<SnapshotNode>)>,
    default: Option<Vec<SnapshotNode>>,
    saw_slot: bool,
}

impl SlotAssignments {
    fn new(light: Vec<SnapshotNode>) -> Self {
        let mut named: Vec<(String, Vec<SnapshotNode>)> = Vec::new();
        let mut default = Vec::new();
        for node in light {
            match node.attr("slot").map(str::to_string) {
                Some(name) => match named.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, nodes)) => nodes.push(node),
                    None => named.push((name, vec![node])),
                },
                None => default.push(node),
            }
        }
        Self {
            named,
            default: Some(default),
            saw_slot: false,
        }
    }

    fn take(&mut self, name: Option<&str>) -> Option<Vec<SnapshotNode>> {
        self.saw_slot = true;
        let assigned = match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                let position = self.named.iter().position(|(n, _)| n == name)?;
                Some(self.named.remove(position).1)
            }
            None => self.default.take(),
        };
        assigned.filter(|nodes| !nodes.is_empty())
    }

    fn leftovers(self) -> Vec<SnapshotNode> {
        let mut nodes = self.default.unwrap_or_default();
        nodes.extend(self.named.into_iter().flat_map(|(_, n)| n));
        nodes
    }
}

fn project_slots(shadow: Vec<SnapshotNode>, light: Vec<SnapshotNode>) -> Vec<SnapshotNode> {
    let mut slots = SlotAssignments::new(light);
    let mut projected = project(shadow, &mut slots);
    if !slots.saw_slot {
        projected.extend(slots.leftovers());
    }
    projected
}

fn project(nodes: Vec<SnapshotNode>, slots: &mut SlotAssignments) -> Vec<SnapshotNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            SnapshotNode::Element {
                tag,
                attrs,
                children,
                shadow,
                node_ref,
            } => {
                if tag.eq_ignore_ascii_case("slot") {
                    match slots.take(attr(&attrs, "name")) {
                        Some(assigned) => out.extend(assigned),
                        None => out.extend(project(children, slots)),
                    }
                } else {
                    out.push(SnapshotNode::Element {
                        tag,
                        attrs,
                        children: project(children, slots),
                        shadow,
                        node_ref,
                    });
                }
            }
            text @ SnapshotNode::Text { .. } => out.push(text),
        }
    }
    out
}

/// Script run in the page to produce a [`RawSnapshot`] as a JSON string.
///
/// It also keeps the visited elements in `window.__scraperNodes` so a
/// [`NodeRef`] can be resolved for clicks; shadow-root elements are not
/// reachable through `document.querySelector`.
pub const SNAPSHOT_SCRIPT: &str = r#"
(() => {
    const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'META', 'LINK']);
    const registry = [];
    const nodes = [];
    const stack = [[document.documentElement, null, false]];
    while (stack.length > 0) {
        const [node, parent, shadow] = stack.pop();
        if (node.nodeType === Node.TEXT_NODE) {
            if (node.textContent) {
                nodes.push({ parent, shadow, text: node.textContent });
            }
            continue;
        }
        if (node.nodeType !== Node.ELEMENT_NODE || SKIP.has(node.tagName)) {
            continue;
        }
        const index = nodes.length;
        registry.push(node);
        nodes.push({
            parent,
            shadow,
            ref: registry.length - 1,
            tag: node.tagName.toLowerCase(),
            attrs: Array.from(node.attributes, (a) => [a.name, a.value]),
        });
        const light = Array.from(node.childNodes);
        for (let i = light.length - 1; i >= 0; i--) {
            stack.push([light[i], index, false]);
        }
        if (node.shadowRoot) {
            const inner = Array.from(node.shadowRoot.childNodes);
            for (let i = inner.length - 1; i >= 0; i--) {
                stack.push([inner[i], index, true]);
            }
        }
    }
    window.__scraperNodes = registry;
    return JSON.stringify({ url: location.href, nodes });
})()
"#;
