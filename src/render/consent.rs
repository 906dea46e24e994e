//! Consent-overlay detection.
//!
//! Cookie and consent banners are recognized by a signature table checked
//! in order. The first signature with a match in the snapshot wins; within
//! a signature the first match in document order is used.

use std::sync::LazyLock;

use regex::Regex;

use super::snapshot::{NodeRef, SnapshotNode};
use crate::document::collapse_whitespace;

/// Longest button label still considered a consent action.
const MAX_LABEL_CHARS: usize = 40;

/// A candidate element seen while walking the snapshot.
#[derive(Debug)]
struct Candidate<'a> {
    node_ref: NodeRef,
    tag: &'a str,
    attrs: &'a [(String, String)],
    label: String,
    in_consent_container: bool,
}

impl Candidate<'_> {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|t| t == class))
    }

    fn is_clickable(&self) -> bool {
        match self.tag {
            "button" | "a" => true,
            "input" => self
                .attr("type")
                .is_some_and(|t| matches!(t.to_ascii_lowercase().as_str(), "button" | "submit")),
            _ => self.attr("role").is_some_and(|r| r.eq_ignore_ascii_case("button")),
        }
    }

    fn button_label(&self) -> Option<&str> {
        (self.is_clickable() && self.label.chars().count() <= MAX_LABEL_CHARS)
            .then_some(self.label.as_str())
    }
}

static CONSENT_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cookie|consent|gdpr|privacy|cmp|usercentrics|onetrust")
        .expect("consent container pattern")
});

static ENGLISH_ACCEPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:accept|accept all|accept all cookies|accept cookies|i accept|agree|i agree|allow all|allow cookies|allow all cookies)$")
        .expect("english accept pattern")
});

/// A consent signature.
type Signature = (&'static str, fn(&Candidate<'_>) -> bool);

static SIGNATURES: &[Signature] = &[
    ("id=accept", |c| c.attr("id") == Some("accept")),
    ("usercentrics accept button", |c| {
        c.has_class("accept") && c.has_class("uc-accept-button")
    }),
    ("data-action=consent", |c| {
        c.attr("data-action") == Some("consent") && c.attr("data-action-type") == Some("accept")
    }),
    ("onetrust accept button", |c| {
        c.attr("id") == Some("onetrust-accept-btn-handler")
    }),
    ("すべて受け入れる", |c| c.button_label() == Some("すべて受け入れる")),
    ("同意", |c| {
        c.button_label()
            .is_some_and(|l| l.contains("同意") && !l.contains("しない") && !l.contains("拒否"))
    }),
    ("accept/agree/allow all", |c| {
        c.button_label().is_some_and(|l| ENGLISH_ACCEPT.is_match(l))
    }),
    ("OK in consent container", |c| {
        c.in_consent_container && c.button_label().is_some_and(|l| l.eq_ignore_ascii_case("ok"))
    }),
];

/// A matched consent control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentTarget {
    /// Live handle to click.
    pub node_ref: NodeRef,
    /// Name of the matching signature.
    pub signature: &'static str,
}

/// Find the consent control to dismiss, if any.
pub fn find_consent_target(root: &SnapshotNode) -> Option<ConsentTarget> {
    let candidates = collect(root);

    SIGNATURES.iter().find_map(|(signature, matches)| {
        candidates
            .iter()
            .find(|c| matches(*c))
            .map(|c| ConsentTarget {
                node_ref: c.node_ref,
                signature: *signature,
            })
    })
}

/// Element candidates in document order, shadow content before light
/// children.
fn collect(root: &SnapshotNode) -> Vec<Candidate<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![(root, false)];

    while let Some((node, in_container)) = stack.pop() {
        let SnapshotNode::Element {
            tag,
            attrs,
            children,
            shadow,
            node_ref,
        } = node
        else {
            continue;
        };

        let in_container = in_container
            || attrs.iter().any(|(k, v)| {
                (k.eq_ignore_ascii_case("id") || k.eq_ignore_ascii_case("class"))
                    && CONSENT_CONTAINER.is_match(v)
            });

        if let Some(node_ref) = node_ref {
            out.push(Candidate {
                node_ref: *node_ref,
                tag: tag.as_str(),
                attrs,
                label: collapse_whitespace(&node.text_content()),
                in_consent_container: in_container,
            });
        }

        for child in shadow.iter().flatten().chain(children).rev() {
            stack.push((child, in_container));
        }
    }

    out
}
