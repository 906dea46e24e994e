//! End-to-end tests of the four scraping flows over fake backends.

mod common;

use std::sync::Arc;

use scraper_mcp::regions::Region;
use scraper_mcp::render::{NodeRef, RawNode, RawSnapshot};
use scraper_mcp::Error;

use common::{page_snapshot, pipeline, FakeFetcher, ScriptedBrowser, BODY};

fn empty_browser() -> ScriptedBrowser {
    ScriptedBrowser::new(RawSnapshot::default())
}

// ============================================================================
// Static content
// ============================================================================

#[tokio::test]
async fn extracts_main_content_without_boilerplate() {
    let fetcher = Arc::new(FakeFetcher::new().page(
        "https://example.com/",
        "<header>Home</header><main><h1>Title</h1><p>Body text.</p></main><footer>Copyright</footer>",
    ));
    let pipeline = pipeline(fetcher.clone(), empty_browser(), 5);

    let content = pipeline.fetch_static("https://example.com/").await.unwrap();
    assert_eq!(content.title, "Title");
    assert_eq!(content.body_text, "Body text.");
    assert_eq!(content.char_count, 10);
    assert_eq!(content.source_url, "https://example.com/");
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn footer_marked_by_attribute_never_leaks_into_body() {
    let fetcher = Arc::new(FakeFetcher::new().page(
        "https://example.com/news",
        "<html><head><title>News</title></head><body>\
         <div class=\"content\"><h1>Spring opening</h1>\
         <p>The new workshop opens its doors on the first Saturday of April.</p>\
         <p>Visitors can try the tools and meet the people who use them every day.</p></div>\
         <div class=\"site-footer\"><p>Footer secret text about the company and its many \
         offices, long enough to win on length alone if it were ever counted.</p></div>\
         </body></html>",
    ));
    let pipeline = pipeline(fetcher, empty_browser(), 5);

    let content = pipeline.fetch_static("https://example.com/news").await.unwrap();
    assert_eq!(content.title, "Spring opening");
    assert!(content.body_text.contains("first Saturday of April"));
    assert!(!content.body_text.contains("Footer secret"), "{}", content.body_text);
}

#[tokio::test]
async fn identical_html_gives_identical_content() {
    let fetcher = Arc::new(FakeFetcher::new().page(
        "https://example.com/",
        "<article><h1>Same</h1><p>One paragraph.</p><ul><li>a</li><li>b</li></ul></article>",
    ));
    let pipeline = pipeline(fetcher, empty_browser(), 5);

    let first = pipeline.fetch_static("https://example.com/").await.unwrap();
    let second = pipeline.fetch_static("https://example.com/").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn malformed_urls_fail_before_any_fetch() {
    let fetcher = Arc::new(FakeFetcher::new());
    let browser = empty_browser();
    let stats = browser.stats();
    let pipeline = pipeline(fetcher.clone(), browser, 5);

    for input in ["not-a-url", "", "ftp://example.com/", "/relative/path"] {
        assert!(matches!(
            pipeline.fetch_static(input).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            pipeline.site_links_static(input).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            pipeline.fetch_rendered(input).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            pipeline.site_links_rendered(input).await,
            Err(Error::Validation(_))
        ));
    }

    assert_eq!(fetcher.calls(), 0);
    assert_eq!(stats.launched(), 0);
}

#[tokio::test]
async fn http_failures_carry_status() {
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), empty_browser(), 5);

    match pipeline.fetch_static("https://example.com/missing").await {
        Err(Error::Fetch { url, status, .. }) => {
            assert_eq!(url, "https://example.com/missing");
            assert_eq!(status, Some(404));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_markup_bodies_are_extraction_errors() {
    let fetcher = Arc::new(FakeFetcher::new().with_content_type(
        "https://example.com/report",
        "application/pdf",
        "%PDF-1.7",
    ));
    let pipeline = pipeline(fetcher, empty_browser(), 5);

    assert!(matches!(
        pipeline.fetch_static("https://example.com/report").await,
        Err(Error::Extraction(_))
    ));
}

// ============================================================================
// Static links
// ============================================================================

#[tokio::test]
async fn collects_deduplicated_same_host_links_with_headings() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page(
                "https://example.com/",
                "<header><a href=\"/\">Home</a></header>\
                 <nav><a href=\"/a\">A</a><a href=\"/a/\">A dup</a>\
                 <a href=\"https://other.org/x\">Other</a></nav>\
                 <main><a href=\"/in-body\">Body link</a></main>\
                 <footer><a href=\"/contact\">Contact</a></footer>",
            )
            .page(
                "https://example.com/a",
                "<h1>A</h1><h2>Services</h2><h3>Pricing</h3><h2>Services</h2>",
            ),
    );
    let pipeline = pipeline(fetcher.clone(), empty_browser(), 5);

    let map = pipeline.site_links_static("https://example.com/").await.unwrap();

    let urls: Vec<&str> = map.links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/",
            "https://example.com/a",
            "https://example.com/contact"
        ]
    );
    assert_eq!(map.base_url, "https://example.com/");
    assert_eq!(map.total_links, 3);
    assert_eq!(map.filtered_links, 3);
    assert_eq!(map.sections.header_links, 1);
    assert_eq!(map.sections.nav_links, 2);
    assert_eq!(map.sections.footer_links, 1);

    let a = &map.links[1];
    assert_eq!(a.anchor_text, "A");
    assert_eq!(a.region, Region::Nav);
    assert_eq!(a.nearby_heading.as_deref(), Some("Services"));
    assert_eq!(a.content_headings, vec!["Services", "Pricing"]);

    // The 404 target is skipped, not fatal.
    assert_eq!(map.links[2].nearby_heading, None);
    assert!(map.links[2].content_headings.is_empty());

    // The page itself plus one fetch per link target.
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(fetcher.requested()[0], "https://example.com/");
}

#[tokio::test]
async fn heading_prefetch_is_capped() {
    let mut html = String::from("<nav>");
    for i in 0..30 {
        html.push_str(&format!("<a href=\"/section-{i}\">Section {i}</a>"));
    }
    html.push_str("</nav>");
    let fetcher = Arc::new(FakeFetcher::new().page("https://example.com/", &html));
    let pipeline = pipeline(fetcher.clone(), empty_browser(), 5);

    let map = pipeline.site_links_static("https://example.com/").await.unwrap();
    assert_eq!(map.filtered_links, 30);
    assert_eq!(fetcher.calls(), 1 + 20);
}

// ============================================================================
// Rendered content
// ============================================================================

const ABOUT: &str = "We design quiet, durable furniture in a small workshop by the river \
                     and ship it across the country.";
const CONTACT: &str = "Write to hello [at] aurora-studio [dot] jp or call 03-1234-5678.";

struct Nodes(Vec<RawNode>);

impl Nodes {
    fn push(&mut self, node: RawNode) -> usize {
        self.0.push(node);
        BODY + self.0.len()
    }
}

/// A studio page whose profile lives in a shadow root, optionally behind a
/// cookie banner.
fn studio_page(with_banner: bool) -> RawSnapshot {
    let mut n = Nodes(Vec::new());
    if with_banner {
        let banner = n.push(RawNode::element(
            Some(BODY),
            "div",
            &[("id", "cookie-notice"), ("class", "cookie-banner")],
        ));
        let button = n.push(RawNode::element(Some(banner), "button", &[("type", "button")]).with_ref(41));
        n.push(RawNode::text(button, "Accept all"));
    }

    let main = n.push(RawNode::element(Some(BODY), "main", &[]));
    let h1 = n.push(RawNode::element(Some(main), "h1", &[]));
    n.push(RawNode::text(h1, "Studio Aurora"));

    let host = n.push(RawNode::element(Some(main), "x-profile", &[]));
    let card = n.push(RawNode::element(Some(host), "div", &[("class", "card")]).in_shadow());
    let about = n.push(RawNode::element(Some(card), "p", &[]));
    n.push(RawNode::text(about, ABOUT));
    n.push(RawNode::element(Some(card), "slot", &[]));
    let contact = n.push(RawNode::element(Some(host), "p", &[]));
    n.push(RawNode::text(contact, CONTACT));

    let footer = n.push(RawNode::element(Some(BODY), "footer", &[]));
    let mail = n.push(RawNode::element(
        Some(footer),
        "a",
        &[("href", "mailto:Press@Aurora-Studio.JP")],
    ));
    n.push(RawNode::text(mail, "Press"));

    page_snapshot("https://aurora.example/", "Aurora", n.0)
}

#[tokio::test(start_paused = true)]
async fn rendered_pages_are_flattened_and_unblocked() {
    let browser = ScriptedBrowser::new(studio_page(true)).after_click(studio_page(false));
    let stats = browser.stats();
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), browser, 5);

    let rendered = pipeline
        .fetch_rendered("https://aurora.example/")
        .await
        .unwrap();

    assert_eq!(rendered.content.title, "Studio Aurora");
    assert!(rendered.content.body_text.contains("quiet, durable furniture"));
    assert!(rendered.content.body_text.contains("03-1234-5678"));
    assert!(!rendered.content.body_text.contains("Accept all"));
    assert_eq!(rendered.method, "headless-browser");
    assert_eq!(rendered.consent_dismissed, Some("accept/agree/allow all"));
    assert_eq!(rendered.warning, None);

    assert!(rendered.contacts.emails.contains("hello@aurora-studio.jp"));
    assert!(rendered.contacts.emails.contains("Press@aurora-studio.jp"));
    assert!(rendered.contacts.phones.contains("03-1234-5678"));

    assert_eq!(stats.clicks(), vec![NodeRef(41)]);
    assert_eq!(stats.active(), 0);
    assert_eq!(stats.released(), 1);
    assert_eq!(pipeline.renderer().pool().available(), 5);
}

#[tokio::test(start_paused = true)]
async fn pages_without_a_banner_are_not_clicked() {
    let browser = ScriptedBrowser::new(studio_page(false));
    let stats = browser.stats();
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), browser, 5);

    let rendered = pipeline
        .fetch_rendered("https://aurora.example/")
        .await
        .unwrap();
    assert_eq!(rendered.consent_dismissed, None);
    assert!(stats.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sparse_rendered_pages_carry_a_warning() {
    let snapshot = page_snapshot(
        "https://spa.example/",
        "Loading",
        vec![
            RawNode::element(Some(BODY), "div", &[("id", "app")]),
            RawNode::text(5, "Loading..."),
        ],
    );
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), ScriptedBrowser::new(snapshot), 5);

    let rendered = pipeline.fetch_rendered("https://spa.example/").await.unwrap();
    assert_eq!(rendered.content.title, "Loading");
    assert_eq!(rendered.content.body_text, "Loading...");
    assert!(rendered.warning.is_some());
    assert!(rendered.contacts.is_empty());
}

#[tokio::test]
async fn pdf_targets_are_not_rendered() {
    let browser = empty_browser();
    let stats = browser.stats();
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), browser, 5);

    assert!(matches!(
        pipeline.fetch_rendered("https://example.com/brochure.PDF").await,
        Err(Error::Validation(_))
    ));
    assert_eq!(stats.launched(), 0);
}

// ============================================================================
// Rendered links
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rendered_links_follow_redirects_and_never_prefetch() {
    let mut n = Nodes(Vec::new());
    let nav = n.push(RawNode::element(Some(BODY), "nav", &[]));
    let works = n.push(RawNode::element(Some(nav), "a", &[("href", "/works")]));
    n.push(RawNode::text(works, "Works"));
    let apex = n.push(RawNode::element(
        Some(nav),
        "a",
        &[("href", "https://aurora.example/shop")],
    ));
    n.push(RawNode::text(apex, "Shop"));
    let snapshot = page_snapshot("https://www.aurora.example/home", "Aurora", n.0);

    let fetcher = Arc::new(FakeFetcher::new());
    let pipeline = pipeline(fetcher.clone(), ScriptedBrowser::new(snapshot), 5);

    let map = pipeline
        .site_links_rendered("https://aurora.example/")
        .await
        .unwrap();

    let urls: Vec<&str> = map.links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls, vec!["https://www.aurora.example/works"]);
    assert_eq!(map.base_url, "https://www.aurora.example/home");
    assert_eq!(fetcher.calls(), 0);
}
