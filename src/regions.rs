//! Region classification rules.
//!
//! Classification is a fixed, ordered table of `(predicate, region)` pairs
//! evaluated top-down; the first matching rule labels the element. Semantic
//! tags come first, then ARIA landmark roles, then id/class token patterns
//! for the usual theme conventions.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structural region of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Site banner.
    Header,
    /// Site footer.
    Footer,
    /// Navigation menus and breadcrumbs.
    Nav,
    /// Declared primary content.
    Main,
    /// Anything else; candidate content.
    Unknown,
}

impl Region {
    /// Header, footer and nav are boilerplate and never reach extracted text.
    pub fn is_boilerplate(self) -> bool {
        matches!(self, Region::Header | Region::Footer | Region::Nav)
    }

    /// Resolve a node's region from its own rule match and its parent's region.
    ///
    /// Boilerplate is sticky: once inside a header, footer or nav, every
    /// descendant keeps that label regardless of its own attributes.
    pub fn resolve(parent: Region, own: Option<Region>) -> Region {
        if parent.is_boilerplate() {
            return parent;
        }
        own.unwrap_or(parent)
    }
}

/// The parts of an element the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct ElementView<'a> {
    /// Lower-case tag name.
    pub tag: &'a str,
    /// Attributes in document order.
    pub attrs: &'a [(String, String)],
}

impl<'a> ElementView<'a> {
    /// Create a view over a tag and its attributes.
    pub fn new(tag: &'a str, attrs: &'a [(String, String)]) -> Self {
        Self { tag, attrs }
    }

    fn attr(&self, name: &str) -> Option<&'a str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn has_role(&self, role: &str) -> bool {
        self.attr("role")
            .is_some_and(|r| r.split_whitespace().any(|t| t.eq_ignore_ascii_case(role)))
    }

    /// Whether the id or any class token matches `pattern`.
    fn has_token(&self, pattern: &Regex) -> bool {
        let id = self.attr("id").into_iter();
        let classes = self.attr("class").into_iter().flat_map(str::split_whitespace);
        id.chain(classes)
            .any(|token| pattern.is_match(&token.to_ascii_lowercase()))
    }
}

static HEADER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:site|global|main|top|common|l|g|c|p)[-_])?header(?:[-_](?:wrap|wrapper|inner|area|container|top|bar))?$|^masthead$|^(?:site[-_])?banner$",
    )
    .expect("header token pattern")
});

static FOOTER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:site|global|main|page|common|l|g|c|p)[-_])?footer(?:[-_](?:wrap|wrapper|inner|area|container|bottom|nav|menu|links|widgets))?$|^colophon$|^copyright$",
    )
    .expect("footer token pattern")
});

static NAV_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:site|global|main|primary|top|header|side|sub|g|l|c)[-_]?)?(?:nav|navi|navbar|navigation|gnav)(?:[-_](?:wrap|wrapper|inner|area|container|bar|list|menu))?$|^(?:global|main|primary|site|header)[-_]?menu$|^(?:breadcrumbs?|bread[-_]crumbs?|pankuzu|topic[-_]?path)$",
    )
    .expect("nav token pattern")
});

static MAIN_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:main|main[-_]?content|content[-_]main|maincontent|page[-_]content)$")
        .expect("main token pattern")
});

/// A classification rule.
pub type Rule = (fn(&ElementView<'_>) -> bool, Region);

/// The rule table, evaluated top-down.
pub static RULES: &[Rule] = &[
    (|e| e.tag == "header", Region::Header),
    (|e| e.tag == "footer", Region::Footer),
    (|e| e.tag == "nav", Region::Nav),
    (|e| e.tag == "main", Region::Main),
    (|e| e.has_role("banner"), Region::Header),
    (|e| e.has_role("contentinfo"), Region::Footer),
    (|e| e.has_role("navigation"), Region::Nav),
    (|e| e.has_role("main"), Region::Main),
    (|e| e.has_token(&HEADER_TOKEN), Region::Header),
    (|e| e.has_token(&FOOTER_TOKEN), Region::Footer),
    (|e| e.has_token(&NAV_TOKEN), Region::Nav),
    (|e| e.has_token(&MAIN_TOKEN), Region::Main),
];

/// Classify an element by the first matching rule.
///
/// The document root and `body` are never classified; a theme class on
/// `body` must not swallow the whole page.
pub fn classify(element: &ElementView<'_>) -> Option<Region> {
    if matches!(element.tag, "html" | "body") {
        return None;
    }
    RULES
        .iter()
        .find(|(matches, _)| matches(element))
        .map(|(_, region)| *region)
}
