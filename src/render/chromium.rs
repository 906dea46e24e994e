//! Chromium backend via `chromiumoxide`.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::snapshot::{NodeRef, RawSnapshot, SNAPSHOT_SCRIPT};
use super::{BrowserLauncher, BrowserPage, RenderFailure};
use crate::config::DEFAULT_ACCEPT_LANGUAGE;

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

/// Starts one Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    user_agent: String,
}

impl ChromiumLauncher {
    /// Create a launcher.
    pub fn new(headless: bool, user_agent: &str) -> Self {
        Self {
            headless,
            user_agent: user_agent.to_string(),
        }
    }

    fn config(&self) -> Result<BrowserConfig, RenderFailure> {
        let language = DEFAULT_ACCEPT_LANGUAGE
            .split(',')
            .next()
            .unwrap_or("en-US");
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--lang={language}"))
            .arg(format!("--user-agent={}", self.user_agent));
        if !self.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(RenderFailure::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>, RenderFailure> {
        let (browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(|e| RenderFailure::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser connection closed");
                    break;
                }
            }
        });

        let mut session = ChromiumPage {
            browser,
            page: None,
            events,
        };
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| session.failure(RenderFailure::Launch(e.to_string())))?;
        session.page = Some(page);
        Ok(Box::new(session))
    }
}

/// A Chromium process with one page.
struct ChromiumPage {
    browser: Browser,
    page: Option<Page>,
    events: JoinHandle<()>,
}

impl ChromiumPage {
    fn page(&self) -> Result<Page, RenderFailure> {
        self.page
            .clone()
            .ok_or_else(|| RenderFailure::Crash("page already closed".into()))
    }

    /// A dead event loop means the browser went away, whatever the call
    /// itself reported.
    fn failure(&self, reported: RenderFailure) -> RenderFailure {
        if self.events.is_finished() {
            RenderFailure::Crash(reported.to_string())
        } else {
            reported
        }
    }

    async fn evaluate<T>(&mut self, script: &str) -> Result<T, RenderFailure>
    where
        T: serde::de::DeserializeOwned,
    {
        let page = self.page()?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| self.failure(RenderFailure::Script(e.to_string())))?;
        result
            .into_value()
            .map_err(|e| RenderFailure::Script(e.to_string()))
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&mut self, url: &Url) -> Result<(), RenderFailure> {
        let page = self.page()?;
        page.goto(url.as_str())
            .await
            .map_err(|e| self.failure(RenderFailure::Navigation(e.to_string())))?;
        Ok(())
    }

    async fn resource_count(&mut self) -> Result<u64, RenderFailure> {
        self.evaluate(RESOURCE_COUNT_SCRIPT).await
    }

    async fn snapshot(&mut self) -> Result<RawSnapshot, RenderFailure> {
        let json: String = self.evaluate(SNAPSHOT_SCRIPT).await?;
        serde_json::from_str(&json).map_err(|e| RenderFailure::Script(e.to_string()))
    }

    async fn click(&mut self, target: NodeRef) -> Result<bool, RenderFailure> {
        let script = format!(
            "(() => {{ const el = (window.__scraperNodes || [])[{}]; \
             if (!el || !el.isConnected) return false; el.click(); return true; }})()",
            target.0
        );
        self.evaluate(&script).await
    }

    async fn close(&mut self) -> Result<(), RenderFailure> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "page close failed");
            }
        }
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "waiting for browser exit failed");
        }
        self.events.abort();
        closed
            .map(|_| ())
            .map_err(|e| RenderFailure::Crash(e.to_string()))
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        // `Browser` kills its child process on drop; the event loop would
        // otherwise outlive it.
        self.events.abort();
    }
}
