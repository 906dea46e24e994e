//! Fakes shared by the integration tests: a scripted HTTP fetcher and a
//! scripted browser.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use scraper_mcp::config::ScraperConfig;
use scraper_mcp::fetch::{FetchedPage, PageFetcher};
use scraper_mcp::render::{
    BrowserLauncher, BrowserPage, NodeRef, RawNode, RawSnapshot, RenderFailure, Renderer,
    SessionPool,
};
use scraper_mcp::{Error, Pipeline, Result};

/// Fetcher serving canned pages and counting every request.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, (Option<String>, String)>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    pub fn page(self, url: &str, html: &str) -> Self {
        self.with_content_type(url, "text/html; charset=utf-8", html)
    }

    pub fn with_content_type(mut self, url: &str, content_type: &str, body: &str) -> Self {
        let key = Url::parse(url).expect("test url").to_string();
        self.pages
            .insert(key, (Some(content_type.to_string()), body.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());

        match self.pages.get(url.as_str()) {
            Some((content_type, body)) => Ok(FetchedPage {
                url: url.clone(),
                status: 200,
                content_type: content_type.clone(),
                body: body.clone(),
            }),
            None => Err(Error::Fetch {
                url: url.to_string(),
                status: Some(404),
                message: "HTTP 404 Not Found".into(),
            }),
        }
    }
}

/// Counters shared between a launcher and the pages it opened.
#[derive(Debug, Clone, Default)]
pub struct BrowserStats {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    launched: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    clicks: Arc<Mutex<Vec<NodeRef>>>,
}

impl BrowserStats {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> Vec<NodeRef> {
        self.clicks.lock().unwrap().clone()
    }

    fn open(&self) {
        self.launched.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a scripted page behaves on navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Loads after the given delay.
    After(Duration),
    /// Never finishes loading.
    Hang,
    /// The browser reports an error.
    Fail,
}

/// Launcher of scripted pages.
#[derive(Clone)]
pub struct ScriptedBrowser {
    snapshot: RawSnapshot,
    after_click: Option<RawSnapshot>,
    navigation: Navigation,
    stats: BrowserStats,
}

impl ScriptedBrowser {
    /// Pages that load instantly and show `snapshot`.
    pub fn new(snapshot: RawSnapshot) -> Self {
        Self {
            snapshot,
            after_click: None,
            navigation: Navigation::After(Duration::ZERO),
            stats: BrowserStats::default(),
        }
    }

    /// Show `snapshot` once anything was clicked.
    pub fn after_click(mut self, snapshot: RawSnapshot) -> Self {
        self.after_click = Some(snapshot);
        self
    }

    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn stats(&self) -> BrowserStats {
        self.stats.clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self) -> std::result::Result<Box<dyn BrowserPage>, RenderFailure> {
        self.stats.open();
        Ok(Box::new(ScriptedPage {
            current: self.snapshot.clone(),
            after_click: self.after_click.clone(),
            navigation: self.navigation,
            stats: self.stats.clone(),
            open: true,
        }))
    }
}

struct ScriptedPage {
    current: RawSnapshot,
    after_click: Option<RawSnapshot>,
    navigation: Navigation,
    stats: BrowserStats,
    open: bool,
}

impl ScriptedPage {
    fn release(&mut self) {
        if std::mem::take(&mut self.open) {
            self.stats.release();
        }
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn goto(&mut self, _url: &Url) -> std::result::Result<(), RenderFailure> {
        match self.navigation {
            Navigation::After(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Navigation::Hang => std::future::pending().await,
            Navigation::Fail => Err(RenderFailure::Navigation("net::ERR_NAME_NOT_RESOLVED".into())),
        }
    }

    async fn resource_count(&mut self) -> std::result::Result<u64, RenderFailure> {
        Ok(12)
    }

    async fn snapshot(&mut self) -> std::result::Result<RawSnapshot, RenderFailure> {
        Ok(self.current.clone())
    }

    async fn click(&mut self, target: NodeRef) -> std::result::Result<bool, RenderFailure> {
        self.stats.clicks.lock().unwrap().push(target);
        if let Some(next) = self.after_click.take() {
            self.current = next;
        }
        Ok(true)
    }

    async fn close(&mut self) -> std::result::Result<(), RenderFailure> {
        self.release();
        Ok(())
    }
}

impl Drop for ScriptedPage {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pipeline over the fakes, with `sessions` browser slots.
pub fn pipeline(fetcher: Arc<FakeFetcher>, browser: ScriptedBrowser, sessions: usize) -> Pipeline {
    let mut config = ScraperConfig::default();
    config.render.max_sessions = sessions;
    let renderer = Renderer::new(
        Arc::new(browser),
        SessionPool::new(sessions),
        config.render.clone(),
    );
    Pipeline::new(fetcher, renderer, config)
}

/// A snapshot of `<html><head><title>` plus a `body` element at [`BODY`].
/// Caller nodes start at index 5 and hang off [`BODY`] or each other.
pub fn page_snapshot(url: &str, title: &str, body: Vec<RawNode>) -> RawSnapshot {
    let mut nodes = vec![
        RawNode::element(None, "html", &[]),
        RawNode::element(Some(0), "head", &[]),
        RawNode::element(Some(1), "title", &[]),
        RawNode::text(2, title),
        RawNode::element(Some(0), "body", &[]),
    ];
    nodes.extend(body);
    RawSnapshot {
        url: Some(url.to_string()),
        nodes,
    }
}

/// Index of the `body` element in [`page_snapshot`] output.
pub const BODY: usize = 4;
