//! Static and rendered scraping flows.
//!
//! Static: validate, fetch once, normalize, extract (or collect links).
//! Rendered: validate, render under the session cap, flatten the snapshot,
//! then the same normalize/extract path plus contact extraction.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::contact::{extract_contacts, ContactInfo};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::extractor::{extract, Extraction};
use crate::fetch::{FetchedPage, PageFetcher};
use crate::links::{collect, FetchedPages, SiteMap};
use crate::render::{flatten_shadow_roots, RenderedPage, Renderer};
use crate::urls::{validate_render_target, validate_target};

/// Static extraction output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedContent {
    /// Page title.
    pub title: String,
    /// Main text, paragraphs separated by one blank line.
    pub body_text: String,
    /// Requested URL.
    pub source_url: String,
    /// Characters in `body_text`.
    pub char_count: usize,
}

impl ExtractedContent {
    fn new(extraction: Extraction, source_url: &Url) -> Self {
        Self {
            char_count: extraction.body_text.chars().count(),
            title: extraction.title,
            body_text: extraction.body_text,
            source_url: source_url.to_string(),
        }
    }
}

/// Rendered extraction output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedContent {
    /// The extracted page.
    #[serde(flatten)]
    pub content: ExtractedContent,
    /// Contact details found anywhere on the page.
    pub contacts: ContactInfo,
    /// How the page was loaded.
    pub method: &'static str,
    /// Consent signature that was dismissed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_dismissed: Option<&'static str>,
    /// Set when the extracted text is suspiciously short.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// The four scraping flows over shared fetch and render backends.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Renderer,
    config: Arc<ScraperConfig>,
}

impl Pipeline {
    /// Create a pipeline.
    pub fn new(fetcher: Arc<dyn PageFetcher>, renderer: Renderer, config: ScraperConfig) -> Self {
        Self {
            fetcher,
            renderer,
            config: Arc::new(config),
        }
    }

    /// The renderer, with its session pool.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// The active configuration.
    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Fetch `url` over plain HTTP and extract its main content.
    pub async fn fetch_static(&self, url: &str) -> Result<ExtractedContent> {
        let url = validate_target(url)?;
        let page = self.fetcher.fetch(&url).await?;
        let doc = parse_page(&page)?;

        let extraction = extract(&doc, &self.config.extractor);
        let content = ExtractedContent::new(extraction, &url);
        info!(%url, chars = content.char_count, "extracted static page");
        Ok(content)
    }

    /// Render `url` in a headless browser and extract its main content and
    /// contact details.
    pub async fn fetch_rendered(&self, url: &str) -> Result<RenderedContent> {
        let url = validate_render_target(url)?;
        let rendered = self.renderer.render(&url).await?;
        let consent_dismissed = rendered.consent_dismissed;
        let (_, doc) = rendered_document(rendered)?;

        let extraction = extract(&doc, &self.config.extractor);
        let contacts = extract_contacts(&doc);
        let content = ExtractedContent::new(extraction, &url);

        let warning = (content.char_count < self.config.low_content_chars).then(|| {
            warn!(%url, chars = content.char_count, "rendered page has little text");
            format!(
                "only {} characters were extracted; the page may need interaction, \
                 block automated access, or load its content from elsewhere",
                content.char_count
            )
        });
        info!(
            %url,
            chars = content.char_count,
            emails = contacts.emails.len(),
            phones = contacts.phones.len(),
            "extracted rendered page"
        );

        Ok(RenderedContent {
            content,
            contacts,
            method: "headless-browser",
            consent_dismissed,
            warning,
        })
    }

    /// Collect header/nav/footer links of `url` over plain HTTP, with
    /// headings of the first same-host targets.
    pub async fn site_links_static(&self, url: &str) -> Result<SiteMap> {
        let url = validate_target(url)?;
        let page = self.fetcher.fetch(&url).await?;
        let doc = parse_page(&page)?;

        let mut map = collect(&doc, &page.url, &self.config.links);
        let targets: Vec<Url> = map
            .links
            .iter()
            .take(self.config.links.heading_fetch_limit)
            .filter_map(|link| Url::parse(&link.url).ok())
            .collect();
        let pages = self.prefetch_headings(targets).await;
        map.annotate(&pages);

        info!(%url, links = map.filtered_links, annotated = pages.len(), "collected site links");
        Ok(map)
    }

    /// Collect header/nav/footer links of the rendered `url`. Targets are
    /// not fetched.
    pub async fn site_links_rendered(&self, url: &str) -> Result<SiteMap> {
        let url = validate_render_target(url)?;
        let rendered = self.renderer.render(&url).await?;
        let (final_url, doc) = rendered_document(rendered)?;

        let map = collect(&doc, &final_url, &self.config.links);
        info!(%url, links = map.filtered_links, "collected rendered site links");
        Ok(map)
    }

    /// Fetch targets for heading annotation. Single attempt each; failures
    /// are skipped.
    async fn prefetch_headings(&self, targets: Vec<Url>) -> FetchedPages {
        let options = &self.config.links;
        let fetched: Vec<Option<(Url, Document)>> = stream::iter(targets)
            .map(|target| async move {
                match timeout(options.heading_fetch_timeout, self.fetcher.fetch(&target)).await {
                    Ok(Ok(page)) if page.is_markup() => {
                        let doc = Document::parse_html(&page.body);
                        Some((target, doc))
                    }
                    Ok(Ok(_)) => None,
                    Ok(Err(e)) => {
                        debug!(%target, error = %e, "heading fetch failed");
                        None
                    }
                    Err(_) => {
                        debug!(%target, "heading fetch timed out");
                        None
                    }
                }
            })
            .buffer_unordered(options.heading_fetch_concurrency.max(1))
            .collect()
            .await;

        let mut pages = FetchedPages::new();
        for (target, doc) in fetched.into_iter().flatten() {
            pages.insert(&target, &doc, options.max_headings);
        }
        pages
    }
}

fn parse_page(page: &FetchedPage) -> Result<Document> {
    if !page.is_markup() {
        return Err(Error::Extraction(format!(
            "cannot extract text from {} content",
            page.content_type.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(Document::parse_html(&page.body))
}

/// Flatten a rendered snapshot into a document, with the URL it ended up at.
fn rendered_document(rendered: RenderedPage) -> Result<(Url, Document)> {
    let final_url = rendered
        .snapshot
        .url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or_else(|| rendered.url.clone());
    let tree = rendered.snapshot.into_tree()?;
    let doc = Document::from_snapshot(&flatten_shadow_roots(tree));
    debug!(session = %rendered.session_id, nodes = doc.len(), "normalized snapshot");
    Ok((final_url, doc))
}
