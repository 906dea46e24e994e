//! Sitemap collection from header, nav and footer links.
//!
//! The collector reads a single normalized document and never fetches.
//! Headings of target pages come from a [`FetchedPages`] batch the caller
//! filled beforehand, if any.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::LinkOptions;
use crate::document::{Document, NodeId};
use crate::regions::Region;
use crate::urls::{dedup_key, normalize, permalink_pattern, same_host};

/// A same-host link found in a structural region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteLink {
    /// Absolute, normalized URL.
    pub url: String,
    /// Visible anchor text.
    pub anchor_text: String,
    /// First h2/h3 of the target page, when it was fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearby_heading: Option<String>,
    /// Unique h2/h3 texts of the target page, when it was fetched.
    pub content_headings: Vec<String>,
    /// Region the link was found in.
    pub region: Region,
    #[serde(skip)]
    key: String,
}

impl SiteLink {
    /// Deduplication key of the target.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Raw link counts per region, before deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkSections {
    /// Links inside header regions.
    pub header_links: usize,
    /// Links inside nav regions.
    pub nav_links: usize,
    /// Links inside footer regions.
    pub footer_links: usize,
}

/// Links tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMap {
    /// Page the links were collected from.
    pub base_url: String,
    /// Links after deduplication.
    pub total_links: usize,
    /// Links after repeated-pattern removal.
    pub filtered_links: usize,
    /// The links: header first, then nav, then footer.
    pub links: Vec<SiteLink>,
    /// Per-region counts.
    pub sections: LinkSections,
}

impl SiteMap {
    /// Fill in headings for every link whose target is in `pages`.
    pub fn annotate(&mut self, pages: &FetchedPages) {
        for link in &mut self.links {
            if let Some(headings) = pages.headings(&link.key) {
                link.nearby_heading = headings.first().cloned();
                link.content_headings = headings.to_vec();
            }
        }
    }
}

/// Headings of target pages fetched in the same batch, keyed by the
/// target's deduplication key.
#[derive(Debug, Clone, Default)]
pub struct FetchedPages {
    pages: HashMap<String, Vec<String>>,
}

impl FetchedPages {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the headings of a fetched target.
    pub fn insert(&mut self, url: &Url, doc: &Document, max_headings: usize) {
        self.pages
            .insert(dedup_key(url), page_headings(doc, max_headings));
    }

    /// Headings recorded for a deduplication key.
    pub fn headings(&self, key: &str) -> Option<&[String]> {
        self.pages.get(key).map(Vec::as_slice)
    }

    /// Number of pages in the batch.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Unique non-empty h2/h3 texts of `doc` in document order.
pub fn page_headings(doc: &Document, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    doc.nodes()
        .filter(|(_, node)| matches!(node.tag(), Some("h2" | "h3")))
        .map(|(id, _)| doc.text_of(id))
        .filter(|text| !text.is_empty() && seen.insert(text.clone()))
        .take(max)
        .collect()
}

/// Collect the sitemap of `doc`, which was loaded from `page_url`.
pub fn collect(doc: &Document, page_url: &Url, options: &LinkOptions) -> SiteMap {
    let base = doc
        .base_href()
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    let mut sections = LinkSections::default();
    let mut by_region: [Vec<SiteLink>; 3] = Default::default();

    for (id, node) in doc.nodes() {
        if node.tag() != Some("a") {
            continue;
        }
        let slot = match node.region {
            Region::Header => 0,
            Region::Nav => 1,
            Region::Footer => 2,
            Region::Main | Region::Unknown => continue,
        };
        let Some(link) = site_link(doc, id, &base, page_url) else {
            continue;
        };
        match link.region {
            Region::Header => sections.header_links += 1,
            Region::Nav => sections.nav_links += 1,
            _ => sections.footer_links += 1,
        }
        by_region[slot].push(link);
    }

    let mut seen = HashSet::new();
    let links: Vec<SiteLink> = by_region
        .into_iter()
        .flatten()
        .filter(|link| seen.insert(link.key.clone()))
        .collect();
    let total_links = links.len();

    let links = drop_repeated_patterns(links, page_url, options.repeated_pattern_threshold);
    debug!(
        total = total_links,
        kept = links.len(),
        "collected site links"
    );

    SiteMap {
        base_url: page_url.to_string(),
        total_links,
        filtered_links: links.len(),
        links,
        sections,
    }
}

fn site_link(doc: &Document, id: NodeId, base: &Url, origin: &Url) -> Option<SiteLink> {
    let node = doc.node(id);
    let href = node.attr("href")?.trim();
    if is_non_navigational(href) {
        return None;
    }

    let anchor_text = doc.text_of(id);
    if anchor_text.is_empty() {
        return None;
    }

    let target = base.join(href).ok()?;
    if !matches!(target.scheme(), "http" | "https") || !same_host(origin, &target) {
        return None;
    }

    Some(SiteLink {
        url: normalize(&target).to_string(),
        anchor_text,
        nearby_heading: None,
        content_headings: Vec::new(),
        region: node.region,
        key: dedup_key(&target),
    })
}

fn is_non_navigational(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return true;
    }
    let lower = href.to_ascii_lowercase();
    ["mailto:", "tel:", "javascript:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Drop links whose permalink pattern occurs `threshold` times or more.
fn drop_repeated_patterns(links: Vec<SiteLink>, base: &Url, threshold: usize) -> Vec<SiteLink> {
    let patterns: Vec<String> = links
        .iter()
        .map(|link| match Url::parse(&link.url) {
            Ok(url) => permalink_pattern(&url, base),
            Err(_) => link.url.clone(),
        })
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for pattern in &patterns {
        *counts.entry(pattern.as_str()).or_default() += 1;
    }

    let repeated: HashSet<&str> = counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(pattern, _)| pattern)
        .collect();
    if !repeated.is_empty() {
        debug!(patterns = ?repeated, "dropping repeated permalink patterns");
    }

    links
        .into_iter()
        .zip(patterns.iter())
        .filter(|(_, pattern)| !repeated.contains(pattern.as_str()))
        .map(|(link, _)| link)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str) -> SiteMap {
        let doc = Document::parse_html(html);
        let url = Url::parse("https://example.com/").unwrap();
        collect(&doc, &url, &LinkOptions::default())
    }

    fn urls(map: &SiteMap) -> Vec<&str> {
        map.links.iter().map(|l| l.url.as_str()).collect()
    }

    #[test]
    fn duplicate_targets_collapse() {
        let map = run("<nav><a href=\"/a\">A</a><a href=\"/a/\">A dup</a></nav>");
        assert_eq!(urls(&map), vec!["https://example.com/a"]);
        assert_eq!(map.links[0].anchor_text, "A");
        assert_eq!(map.total_links, 1);
        assert_eq!(map.sections.nav_links, 2);
    }

    #[test]
    fn output_is_ordered_header_nav_footer() {
        let map = run(
            "<footer><a href=\"/privacy\">Privacy</a></footer>\
             <nav><a href=\"/blog\">Blog</a></nav>\
             <header><a href=\"/\">Home</a></header>",
        );
        assert_eq!(
            urls(&map),
            vec![
                "https://example.com/",
                "https://example.com/blog",
                "https://example.com/privacy"
            ]
        );
        assert_eq!(map.links[0].region, Region::Header);
    }

    #[test]
    fn skips_foreign_hosts_and_non_navigational_hrefs() {
        let map = run(
            "<header><a href=\"https://www.example.com/x\">Sub</a>\
             <a href=\"https://other.org/\">Other</a><a href=\"mailto:a@example.com\">Mail</a>\
             <a href=\"tel:0312345678\">Call</a><a href=\"javascript:void(0)\">JS</a>\
             <a href=\"#top\">Top</a><a href=\"/empty\"> </a><a href=\"/ok\">OK</a></header>",
        );
        assert_eq!(urls(&map), vec!["https://example.com/ok"]);
    }

    #[test]
    fn body_links_are_ignored() {
        let map = run("<main><a href=\"/story\">Story</a></main><p><a href=\"/x\">X</a></p>");
        assert!(map.links.is_empty());
    }

    #[test]
    fn respects_base_href() {
        let map = run(
            "<html><head><base href=\"/docs/\"></head><body>\
             <nav><a href=\"intro\">Intro</a></nav></body></html>",
        );
        assert_eq!(urls(&map), vec!["https://example.com/docs/intro"]);
    }

    #[test]
    fn repeated_permalinks_are_removed() {
        let mut html = String::from("<footer><a href=\"/about\">About</a>");
        for i in 0..10 {
            html.push_str(&format!("<a href=\"/news/item-{i}\">News {i}</a>"));
        }
        html.push_str("</footer>");

        let map = run(&html);
        assert_eq!(map.total_links, 11);
        assert_eq!(map.filtered_links, 1);
        assert_eq!(urls(&map), vec!["https://example.com/about"]);
    }

    #[test]
    fn annotation_uses_fetched_pages_only() {
        let mut map = run("<nav><a href=\"/a\">A</a><a href=\"/b\">B</a></nav>");
        let target = Document::parse_html(
            "<h2>Services</h2><h3>Pricing</h3><h2>Services</h2><h2> </h2>",
        );
        let mut pages = FetchedPages::new();
        pages.insert(&Url::parse("https://example.com/a/#x").unwrap(), &target, 100);

        map.annotate(&pages);
        assert_eq!(map.links[0].nearby_heading.as_deref(), Some("Services"));
        assert_eq!(map.links[0].content_headings, vec!["Services", "Pricing"]);
        assert_eq!(map.links[1].nearby_heading, None);
        assert!(map.links[1].content_headings.is_empty());
    }
}
