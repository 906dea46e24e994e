//! Render lifecycle, session cap and cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use url::Url;

use scraper_mcp::config::RenderOptions;
use scraper_mcp::render::{
    RawNode, RenderFailure, RenderPhase, RenderState, Renderer, SessionPool,
};
use scraper_mcp::Error;

use common::{page_snapshot, pipeline, FakeFetcher, Navigation, ScriptedBrowser, BODY};

fn article() -> scraper_mcp::render::RawSnapshot {
    page_snapshot(
        "https://example.com/",
        "Example",
        vec![
            RawNode::element(Some(BODY), "main", &[]),
            RawNode::element(Some(5), "p", &[]),
            RawNode::text(6, "Rendered paragraph."),
        ],
    )
}

fn renderer(browser: &ScriptedBrowser, sessions: usize) -> Renderer {
    let options = RenderOptions {
        max_sessions: sessions,
        ..RenderOptions::default()
    };
    Renderer::new(Arc::new(browser.clone()), SessionPool::new(sessions), options)
}

fn url() -> Url {
    Url::parse("https://example.com/").unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrent_renders_respect_the_session_cap() {
    let browser = ScriptedBrowser::new(article())
        .navigation(Navigation::After(Duration::from_millis(300)));
    let stats = browser.stats();
    let renderer = renderer(&browser, 5);

    let target = url();
    let renders = (0..8).map(|_| renderer.render(&target));
    let results = join_all(renders).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(stats.launched(), 8);
    assert!(stats.max_active() <= 5, "max active {}", stats.max_active());
    assert_eq!(stats.max_active(), 5);
    assert_eq!(stats.active(), 0);
    assert_eq!(renderer.pool().available(), 5);
}

#[tokio::test(start_paused = true)]
async fn concurrent_tool_flows_share_one_pool() {
    let browser = ScriptedBrowser::new(article())
        .navigation(Navigation::After(Duration::from_millis(300)));
    let stats = browser.stats();
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), browser, 5);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    pipeline.fetch_rendered("https://example.com/").await.map(|_| ())
                } else {
                    pipeline.site_links_rendered("https://example.com/").await.map(|_| ())
                }
            })
        })
        .collect();

    for task in join_all(tasks).await {
        task.unwrap().unwrap();
    }
    assert!(stats.max_active() <= 5);
    assert_eq!(stats.launched(), 8);
    assert_eq!(pipeline.renderer().pool().available(), 5);
}

#[tokio::test(start_paused = true)]
async fn navigation_timeout_fails_in_navigate_pending() {
    let browser = ScriptedBrowser::new(article()).navigation(Navigation::Hang);
    let stats = browser.stats();
    let renderer = renderer(&browser, 5);

    let error = renderer.render(&url()).await.unwrap_err();
    assert_eq!(error.state, RenderState::NavigatePending);
    assert_eq!(
        error.failure,
        RenderFailure::Timeout {
            phase: RenderPhase::Navigation,
            after: Duration::from_secs(15),
        }
    );

    assert_eq!(renderer.pool().available(), 5);
    assert_eq!(stats.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn navigation_errors_surface_as_render_errors() {
    let browser = ScriptedBrowser::new(article()).navigation(Navigation::Fail);
    let pipeline = pipeline(Arc::new(FakeFetcher::new()), browser, 5);

    let error = pipeline
        .fetch_rendered("https://example.com/")
        .await
        .unwrap_err();
    assert!(error.is_tool_failure());

    let Error::Render(render) = &error else {
        panic!("expected render error, got {error:?}");
    };
    assert_eq!(render.state, RenderState::NavigatePending);
    assert_eq!(render.failure.label(), "navigation");

    let payload = error.to_tool_payload();
    assert_eq!(payload["error"]["kind"], "RenderError");
    assert_eq!(payload["error"]["state"], "NavigatePending");
    assert_eq!(pipeline.renderer().pool().available(), 5);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_render_releases_its_slot() {
    let browser = ScriptedBrowser::new(article()).navigation(Navigation::Hang);
    let stats = browser.stats();
    let renderer = renderer(&browser, 1);

    let task = tokio::spawn({
        let renderer = renderer.clone();
        async move { renderer.render(&url()).await }
    });

    // Let the render get past launch into navigation.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(renderer.pool().available(), 0);
    assert_eq!(stats.active(), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(renderer.pool().available(), 1);
    assert_eq!(stats.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn waiters_proceed_once_a_slot_frees() {
    let slow = ScriptedBrowser::new(article())
        .navigation(Navigation::After(Duration::from_secs(2)));
    let stats = slow.stats();
    let renderer = renderer(&slow, 1);

    let first = tokio::spawn({
        let renderer = renderer.clone();
        async move { renderer.render(&url()).await }
    });
    let second = tokio::spawn({
        let renderer = renderer.clone();
        async move { renderer.render(&url()).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(stats.launched(), 1);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(stats.launched(), 2);
    assert_eq!(stats.max_active(), 1);
}
