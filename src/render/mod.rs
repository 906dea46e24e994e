//! Headless-browser rendering backend.
//!
//! A render session walks a fixed lifecycle:
//!
//! ```text
//! Launching -> Launched -> NavigatePending -> Loaded -> SnapshotTaken -> Closed
//!     \                          \               \
//!      `-------------------------`---------------`--> Failed
//! ```
//!
//! The browser itself sits behind the [`BrowserLauncher`] and
//! [`BrowserPage`] capability traits; the default implementation drives
//! Chromium through `chromiumoxide`. Sessions are capped process-wide by a
//! [`SessionPool`].

pub mod consent;
pub mod pool;
pub mod snapshot;

#[cfg(feature = "chromium")]
pub mod chromium;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::config::RenderOptions;

pub use consent::{find_consent_target, ConsentTarget};
pub use pool::{SessionPermit, SessionPool};
pub use snapshot::{flatten_shadow_roots, NodeRef, RawNode, RawSnapshot, SnapshotNode};

/// Lifecycle state of a render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderState {
    /// Waiting for a slot and starting the browser.
    Launching,
    /// Browser and page are up.
    Launched,
    /// Navigation issued, load event not yet seen.
    NavigatePending,
    /// Page loaded; waiting for the network to go idle.
    Loaded,
    /// Final DOM snapshot captured.
    SnapshotTaken,
    /// Page closed after a successful render.
    Closed,
    /// Terminal failure.
    Failed,
}

impl RenderState {
    /// Stable name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            RenderState::Launching => "Launching",
            RenderState::Launched => "Launched",
            RenderState::NavigatePending => "NavigatePending",
            RenderState::Loaded => "Loaded",
            RenderState::SnapshotTaken => "SnapshotTaken",
            RenderState::Closed => "Closed",
            RenderState::Failed => "Failed",
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded step of a render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Browser start.
    Launch,
    /// Page navigation.
    Navigation,
    /// Consent-control click.
    Consent,
    /// DOM snapshot.
    Snapshot,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RenderPhase::Launch => "launch",
            RenderPhase::Navigation => "navigation",
            RenderPhase::Consent => "consent click",
            RenderPhase::Snapshot => "snapshot",
        })
    }
}

/// Why a render session failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderFailure {
    /// A bounded step ran out of time.
    #[error("{phase} timed out after {after:?}")]
    Timeout {
        /// Step that timed out.
        phase: RenderPhase,
        /// Bound that was exceeded.
        after: Duration,
    },

    /// The browser process or its connection died.
    #[error("browser crashed: {0}")]
    Crash(String),

    /// The browser reported a navigation error.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// An in-page script failed or returned garbage.
    #[error("page script failed: {0}")]
    Script(String),

    /// The browser could not be started.
    #[error("browser launch failed: {0}")]
    Launch(String),
}

impl RenderFailure {
    /// Short machine-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            RenderFailure::Timeout { .. } => "timeout",
            RenderFailure::Crash(_) => "crash",
            RenderFailure::Navigation(_) => "navigation",
            RenderFailure::Script(_) => "script",
            RenderFailure::Launch(_) => "launch",
        }
    }
}

/// A failed render with the last lifecycle state reached before failing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("render failed in state {state}: {failure}")]
pub struct RenderError {
    /// State the session was in when it failed.
    pub state: RenderState,
    /// Cause.
    pub failure: RenderFailure,
}

/// Starts browser pages.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser (or reuse one) and open a blank page.
    async fn launch(&self) -> Result<Box<dyn BrowserPage>, RenderFailure>;
}

/// One open browser page.
///
/// Dropping a page without calling [`BrowserPage::close`] must still
/// release its browser resources.
#[async_trait]
pub trait BrowserPage: Send {
    /// Navigate and wait for the load event.
    async fn goto(&mut self, url: &Url) -> Result<(), RenderFailure>;

    /// Number of network resources the page has requested so far.
    async fn resource_count(&mut self) -> Result<u64, RenderFailure>;

    /// Capture the live DOM, shadow roots included.
    async fn snapshot(&mut self) -> Result<RawSnapshot, RenderFailure>;

    /// Click the element behind `target`, as captured by the latest
    /// snapshot. Returns `false` when the element is gone.
    async fn click(&mut self, target: NodeRef) -> Result<bool, RenderFailure>;

    /// Close the page and its browser.
    async fn close(&mut self) -> Result<(), RenderFailure>;
}

/// Launcher used when no browser backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLauncher;

#[async_trait]
impl BrowserLauncher for UnavailableLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>, RenderFailure> {
        Err(RenderFailure::Launch(
            "no browser backend available; build with the `chromium` feature".into(),
        ))
    }
}

/// The launcher for this build.
pub fn default_launcher(options: &RenderOptions, user_agent: &str) -> Arc<dyn BrowserLauncher> {
    #[cfg(feature = "chromium")]
    {
        Arc::new(chromium::ChromiumLauncher::new(options.headless, user_agent))
    }
    #[cfg(not(feature = "chromium"))]
    {
        let _ = (options, user_agent);
        Arc::new(UnavailableLauncher)
    }
}

/// A successfully rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Session id, as logged.
    pub session_id: Uuid,
    /// Requested URL.
    pub url: Url,
    /// Final DOM snapshot.
    pub snapshot: RawSnapshot,
    /// Signature of the consent control that was clicked, if any.
    pub consent_dismissed: Option<&'static str>,
}

/// Drives render sessions under the session cap.
#[derive(Clone)]
pub struct Renderer {
    launcher: Arc<dyn BrowserLauncher>,
    pool: SessionPool,
    options: RenderOptions,
}

impl Renderer {
    /// Create a renderer over a launcher and a shared pool.
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        pool: SessionPool,
        options: RenderOptions,
    ) -> Self {
        Self {
            launcher,
            pool,
            options,
        }
    }

    /// The session pool.
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Render `url` and capture its final DOM.
    ///
    /// The page is closed and the session slot released on every path,
    /// including when the returned future is dropped.
    pub async fn render(&self, url: &Url) -> Result<RenderedPage, RenderError> {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("render_session", session = %session_id, url = %url);
        self.run(session_id, url).instrument(span).await
    }

    async fn run(&self, session_id: Uuid, url: &Url) -> Result<RenderedPage, RenderError> {
        let mut lifecycle = Lifecycle::new();

        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|failure| lifecycle.fail(failure))?;
        debug!(in_use = self.pool.in_use(), "session slot acquired");

        let launch = bounded(
            RenderPhase::Launch,
            self.options.launch_timeout,
            self.launcher.launch(),
        );
        let mut page = launch.await.map_err(|failure| lifecycle.fail(failure))?;
        lifecycle.advance(RenderState::Launched);

        let outcome = self.drive(page.as_mut(), url, &mut lifecycle).await;

        match timeout(self.options.launch_timeout, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => warn!(%failure, "closing page failed"),
            Err(_) => warn!("closing page timed out"),
        }

        match outcome {
            Ok((snapshot, consent_dismissed)) => {
                lifecycle.advance(RenderState::Closed);
                Ok(RenderedPage {
                    session_id,
                    url: url.clone(),
                    snapshot,
                    consent_dismissed,
                })
            }
            Err(failure) => Err(lifecycle.fail(failure)),
        }
    }

    async fn drive(
        &self,
        page: &mut dyn BrowserPage,
        url: &Url,
        lifecycle: &mut Lifecycle,
    ) -> Result<(RawSnapshot, Option<&'static str>), RenderFailure> {
        lifecycle.advance(RenderState::NavigatePending);
        bounded(
            RenderPhase::Navigation,
            self.options.navigation_timeout,
            page.goto(url),
        )
        .await?;
        lifecycle.advance(RenderState::Loaded);

        self.wait_for_network_idle(page).await?;
        sleep(self.options.settle_delay).await;

        let consent = self.dismiss_consent(page).await;

        let snapshot = bounded(
            RenderPhase::Snapshot,
            self.options.snapshot_timeout,
            page.snapshot(),
        )
        .await?;
        lifecycle.advance(RenderState::SnapshotTaken);

        Ok((snapshot, consent))
    }

    /// Wait until the resource count stays unchanged for the idle window,
    /// or until the idle timeout. Running out of time is not a failure.
    async fn wait_for_network_idle(
        &self,
        page: &mut dyn BrowserPage,
    ) -> Result<(), RenderFailure> {
        let deadline = Instant::now() + self.options.idle_timeout;
        let mut last_count = None;
        let mut stable_since = Instant::now();

        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!("network idle wait timed out; continuing");
                return Ok(());
            }

            let count = match timeout(deadline - now, page.resource_count()).await {
                Ok(count) => count?,
                Err(_) => {
                    debug!("network idle probe timed out; continuing");
                    return Ok(());
                }
            };

            let now = Instant::now();
            if last_count != Some(count) {
                last_count = Some(count);
                stable_since = now;
            } else if now.duration_since(stable_since) >= self.options.idle_window {
                debug!(resources = count, "network idle");
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(now);
            sleep(self.options.idle_poll.min(remaining)).await;
        }
    }

    /// Try once to dismiss a consent overlay. Nothing found, or a failed
    /// click, leaves the page as it is.
    async fn dismiss_consent(&self, page: &mut dyn BrowserPage) -> Option<&'static str> {
        let probe = bounded(
            RenderPhase::Snapshot,
            self.options.snapshot_timeout,
            page.snapshot(),
        )
        .await;
        let tree = match probe.map(RawSnapshot::into_tree) {
            Ok(Ok(tree)) => tree,
            Ok(Err(e)) => {
                debug!(error = %e, "consent probe unreadable");
                return None;
            }
            Err(failure) => {
                debug!(%failure, "consent probe failed");
                return None;
            }
        };

        let target = find_consent_target(&tree)?;
        let click = bounded(
            RenderPhase::Consent,
            self.options.snapshot_timeout,
            page.click(target.node_ref),
        );
        match click.await {
            Ok(true) => {
                info!(signature = target.signature, "dismissed consent overlay");
                sleep(self.options.consent_delay).await;
                Some(target.signature)
            }
            Ok(false) => {
                debug!(signature = target.signature, "consent control vanished before click");
                None
            }
            Err(failure) => {
                debug!(%failure, "consent click failed");
                None
            }
        }
    }
}

/// Current lifecycle state, with transitions logged.
struct Lifecycle {
    state: RenderState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: RenderState::Launching,
        }
    }

    fn advance(&mut self, next: RenderState) {
        debug!(from = %self.state, to = %next, "render state");
        self.state = next;
    }

    fn fail(&mut self, failure: RenderFailure) -> RenderError {
        warn!(state = %self.state, %failure, "render failed");
        let error = RenderError {
            state: self.state,
            failure,
        };
        self.state = RenderState::Failed;
        error
    }
}

async fn bounded<T>(
    phase: RenderPhase,
    limit: Duration,
    step: impl Future<Output = Result<T, RenderFailure>>,
) -> Result<T, RenderFailure> {
    timeout(limit, step)
        .await
        .map_err(|_| RenderFailure::Timeout {
            phase,
            after: limit,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_by_name() {
        assert_eq!(
            serde_json::to_value(RenderState::NavigatePending).unwrap(),
            serde_json::json!("NavigatePending")
        );
        assert_eq!(RenderState::SnapshotTaken.to_string(), "SnapshotTaken");
    }

    #[test]
    fn failures_carry_labels() {
        let timeout = RenderFailure::Timeout {
            phase: RenderPhase::Navigation,
            after: Duration::from_secs(15),
        };
        assert_eq!(timeout.label(), "timeout");
        assert_eq!(timeout.to_string(), "navigation timed out after 15s");
        assert_eq!(RenderFailure::Crash("gone".into()).label(), "crash");
    }

    #[tokio::test]
    async fn unavailable_backend_fails_at_launch() {
        let renderer = Renderer::new(
            Arc::new(UnavailableLauncher),
            SessionPool::new(1),
            RenderOptions::default(),
        );
        let url = Url::parse("https://example.com/").unwrap();
        let error = renderer.render(&url).await.unwrap_err();
        assert_eq!(error.state, RenderState::Launching);
        assert_eq!(error.failure.label(), "launch");
        assert_eq!(renderer.pool().available(), 1);
    }
}
