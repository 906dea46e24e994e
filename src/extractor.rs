//! Main-content extraction.
//!
//! Readability-style scoring over the normalized tree: every paragraph-level
//! unit credits its visible text length to the container holding it and
//! half of that to the next container up. The best container is serialized
//! to plain text, one blank line between blocks.

use crate::config::ExtractorOptions;
use crate::document::{collapse_whitespace, Document, Node, NodeId, NodeKind};

/// Elements whose text is one paragraph.
const PARAGRAPH_TAGS: &[&str] = &[
    "p", "pre", "blockquote", "li", "h1", "h2", "h3", "h4", "h5", "h6", "td", "th", "dt", "dd",
    "figcaption", "address",
];

/// Elements that can be selected as the article.
const CONTAINER_TAGS: &[&str] = &["div", "section", "article", "main", "body", "td", "center"];

/// Elements that start a new block when serialized.
const BLOCK_TAGS: &[&str] = &[
    "p", "pre", "blockquote", "li", "h1", "h2", "h3", "h4", "h5", "h6", "td", "th", "dt", "dd",
    "figcaption", "address", "div", "section", "article", "main", "body", "center", "ul", "ol",
    "dl", "table", "thead", "tbody", "tfoot", "tr", "figure", "aside", "form", "fieldset",
    "header", "footer", "nav", "hr", "details", "summary",
];

/// Title and body selected from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Page title.
    pub title: String,
    /// Main text, paragraphs separated by one blank line.
    pub body_text: String,
}

/// Extract the title and main text of `doc`.
pub fn extract(doc: &Document, options: &ExtractorOptions) -> Extraction {
    let title_node = title_heading(doc);
    let title = title_node
        .map(|id| doc.text_of(id))
        .or_else(|| doc.title_meta().map(str::to_string))
        .unwrap_or_default();

    let Some(root) = doc.root() else {
        return Extraction {
            title,
            body_text: String::new(),
        };
    };

    let scorer = Scorer { doc, title_node };
    let scores = scorer.score();
    let candidates: Vec<NodeId> = doc
        .nodes()
        .filter(|(id, node)| {
            scores[*id] > 0.0
                && !node.region.is_boilerplate()
                && node.tag().is_some_and(|t| CONTAINER_TAGS.contains(&t))
        })
        .map(|(id, _)| id)
        .collect();

    let body_text = match select(doc, &candidates, &scores, options.tie_break_band) {
        Some(selected) => {
            let text = scorer.serialize(&[selected]);
            if text.chars().count() < options.min_content_chars {
                let limit = options.fallback_containers;
                let joined = scorer.serialize(&top_containers(doc, &candidates, &scores, limit));
                if joined.chars().count() > text.chars().count() {
                    joined
                } else {
                    text
                }
            } else {
                text
            }
        }
        None => scorer.serialize(&[root]),
    };

    Extraction { title, body_text }
}

/// Visible text of the whole document, boilerplate regions included, one
/// line per block.
pub fn visible_text(doc: &Document) -> String {
    match doc.root() {
        Some(root) => blocks(doc, root, |_, _| false).join("\n"),
        None => String::new(),
    }
}

/// First `h1` outside boilerplate regions with non-empty text.
fn title_heading(doc: &Document) -> Option<NodeId> {
    doc.elements_by_tag("h1")
        .find(|&id| !doc.node(id).region.is_boilerplate() && !doc.text_of(id).is_empty())
}

fn is_primary(node: &Node) -> bool {
    matches!(node.tag(), Some("main" | "article"))
        || node
            .attr("role")
            .is_some_and(|r| r.eq_ignore_ascii_case("main"))
}

/// The leader, unless a primary-content container scores within the band.
fn select(doc: &Document, candidates: &[NodeId], scores: &[f64], band: f64) -> Option<NodeId> {
    let leader = best(candidates.iter().copied(), scores)?;
    let threshold = scores[leader] * (1.0 - band);
    let primary = best(
        candidates
            .iter()
            .copied()
            .filter(|&id| scores[id] >= threshold && is_primary(doc.node(id))),
        scores,
    );
    Some(primary.unwrap_or(leader))
}

/// Highest score, first in document order on ties.
fn best(ids: impl Iterator<Item = NodeId>, scores: &[f64]) -> Option<NodeId> {
    ids.fold(None, |best: Option<NodeId>, id| match best {
        Some(current) if scores[current] >= scores[id] => Some(current),
        _ => Some(id),
    })
}

/// Up to `limit` best-scoring containers that do not nest, in document order.
fn top_containers(
    doc: &Document,
    candidates: &[NodeId],
    scores: &[f64],
    limit: usize,
) -> Vec<NodeId> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b)));

    let mut picked: Vec<NodeId> = Vec::with_capacity(limit);
    for id in ranked {
        if picked.len() == limit {
            break;
        }
        if picked
            .iter()
            .all(|&p| !doc.contains(p, id) && !doc.contains(id, p))
        {
            picked.push(id);
        }
    }
    picked.sort_unstable();
    picked
}

struct Scorer<'a> {
    doc: &'a Document,
    title_node: Option<NodeId>,
}

impl Scorer<'_> {
    fn score(&self) -> Vec<f64> {
        let doc = self.doc;
        let mut scores = vec![0.0; doc.len()];
        let mut id = 0;

        while id < doc.len() {
            let node = doc.node(id);
            if node.region.is_boilerplate() || Some(id) == self.title_node {
                id = doc.subtree_end(id);
                continue;
            }
            match node.tag() {
                Some(tag) if self.is_unit(id, tag) => {
                    let len = doc.text_of(id).chars().count() as f64;
                    if let Some(parent) = self.container_of(id) {
                        self.credit(parent, len, &mut scores);
                    }
                    id = doc.subtree_end(id);
                    continue;
                }
                Some(tag) if CONTAINER_TAGS.contains(&tag) => {
                    let len = self.loose_text(id).chars().count() as f64;
                    if len > 0.0 {
                        self.credit(id, len, &mut scores);
                    }
                }
                _ => {}
            }
            id += 1;
        }

        scores
    }

    fn credit(&self, container: NodeId, len: f64, scores: &mut [f64]) {
        scores[container] += len;
        if let Some(grandparent) = self.container_of(container) {
            scores[grandparent] += len / 2.0;
        }
    }

    /// A paragraph-level element without nested blocks of its own.
    fn is_unit(&self, id: NodeId, tag: &str) -> bool {
        PARAGRAPH_TAGS.contains(&tag)
            && !self.doc.descendants(id).any(|d| {
                self.doc
                    .node(d)
                    .tag()
                    .is_some_and(|t| PARAGRAPH_TAGS.contains(&t) || CONTAINER_TAGS.contains(&t))
            })
    }

    /// Nearest container ancestor.
    fn container_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.doc.node(id).parent;
        while let Some(parent) = current {
            let node = self.doc.node(parent);
            if node.tag().is_some_and(|t| CONTAINER_TAGS.contains(&t)) {
                return Some(parent);
            }
            current = node.parent;
        }
        None
    }

    /// Text held directly by a container: its text children and inline
    /// elements, not its blocks.
    fn loose_text(&self, id: NodeId) -> String {
        let mut text = String::new();
        for &child in &self.doc.node(id).children {
            let node = self.doc.node(child);
            match &node.kind {
                NodeKind::Text(t) => text.push_str(t),
                NodeKind::Element { tag, .. } if !BLOCK_TAGS.contains(&tag.as_str()) => {
                    text.push(' ');
                    text.push_str(&self.doc.text_of(child));
                    text.push(' ');
                }
                NodeKind::Element { .. } => {}
            }
        }
        collapse_whitespace(&text)
    }

    /// Serialize containers to text, skipping boilerplate and the title heading.
    fn serialize(&self, roots: &[NodeId]) -> String {
        roots
            .iter()
            .flat_map(|&root| {
                blocks(self.doc, root, |id, node| {
                    node.region.is_boilerplate() || Some(id) == self.title_node
                })
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

enum Visit {
    Enter(NodeId),
    Leave,
}

/// Block-separated text of the subtree at `root`, whitespace collapsed
/// within each block. Subtrees for which `exclude` holds are skipped.
fn blocks(
    doc: &Document,
    root: NodeId,
    exclude: impl Fn(NodeId, &Node) -> bool,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut buffer = String::new();
    let mut stack = vec![Visit::Enter(root)];

    while let Some(visit) = stack.pop() {
        let id = match visit {
            Visit::Leave => {
                flush(&mut buffer, &mut out);
                continue;
            }
            Visit::Enter(id) => id,
        };
        let node = doc.node(id);
        if exclude(id, node) {
            continue;
        }
        match &node.kind {
            NodeKind::Text(text) => buffer.push_str(text),
            NodeKind::Element { tag, .. } if tag == "br" => buffer.push(' '),
            NodeKind::Element { tag, .. } => {
                if BLOCK_TAGS.contains(&tag.as_str()) {
                    flush(&mut buffer, &mut out);
                    stack.push(Visit::Leave);
                }
                for &child in node.children.iter().rev() {
                    stack.push(Visit::Enter(child));
                }
            }
        }
    }
    flush(&mut buffer, &mut out);
    out
}

fn flush(buffer: &mut String, out: &mut Vec<String>) {
    let text = collapse_whitespace(buffer);
    if !text.is_empty() {
        out.push(text);
    }
    buffer.clear();
}
