//! Runtime configuration shared by every tool invocation.

use std::time::Duration;

/// Browser-like request headers sent on static fetches and rendered page loads.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default `Accept-Language` header.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ja,en-US;q=0.7,en;q=0.3";

/// Thresholds used by the main-content extractor.
///
/// None of these are load-bearing invariants; they are heuristics tuned
/// against typical corporate and studio sites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorOptions {
    /// Candidates within this fraction of the leading score compete on tag preference.
    pub tie_break_band: f64,
    /// Selected text shorter than this (in chars) triggers the top-three fallback.
    pub min_content_chars: usize,
    /// Number of containers concatenated by the fallback.
    pub fallback_containers: usize,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            tie_break_band: 0.10,
            min_content_chars: 100,
            fallback_containers: 3,
        }
    }
}

/// Timeouts and limits for the rendering backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Maximum concurrently open browser sessions.
    pub max_sessions: usize,
    /// Bound on browser launch.
    pub launch_timeout: Duration,
    /// Bound on page navigation.
    pub navigation_timeout: Duration,
    /// Upper bound on the network-idle wait. Expiry is not a failure.
    pub idle_timeout: Duration,
    /// Resource count must stay unchanged this long to count as idle.
    pub idle_window: Duration,
    /// Interval between network-idle probes.
    pub idle_poll: Duration,
    /// Extra wait after the page is declared ready.
    pub settle_delay: Duration,
    /// Wait after a consent dialog was dismissed.
    pub consent_delay: Duration,
    /// Bound on DOM snapshot extraction.
    pub snapshot_timeout: Duration,
    /// Run the browser without a window.
    pub headless: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            launch_timeout: Duration::from_secs(20),
            navigation_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(10),
            idle_window: Duration::from_millis(500),
            idle_poll: Duration::from_millis(100),
            settle_delay: Duration::from_millis(500),
            consent_delay: Duration::from_secs(1),
            snapshot_timeout: Duration::from_secs(10),
            headless: true,
        }
    }
}

/// Limits for the sitemap collector and the heading prefetch done by the
/// static links tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkOptions {
    /// Links sharing one permalink pattern this many times are dropped.
    pub repeated_pattern_threshold: usize,
    /// Maximum same-host targets fetched for heading annotation.
    pub heading_fetch_limit: usize,
    /// Concurrent heading fetches.
    pub heading_fetch_concurrency: usize,
    /// Timeout for one heading fetch.
    pub heading_fetch_timeout: Duration,
    /// Maximum headings kept per target page.
    pub max_headings: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            repeated_pattern_threshold: 10,
            heading_fetch_limit: 20,
            heading_fetch_concurrency: 5,
            heading_fetch_timeout: Duration::from_secs(15),
            max_headings: 100,
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    /// Total timeout of a static fetch.
    pub fetch_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Bodies shorter than this get a low-content warning in rendered output.
    pub low_content_chars: usize,
    /// Extractor thresholds.
    pub extractor: ExtractorOptions,
    /// Rendering backend limits.
    pub render: RenderOptions,
    /// Link collection limits.
    pub links: LinkOptions,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            low_content_chars: 100,
            extractor: ExtractorOptions::default(),
            render: RenderOptions::default(),
            links: LinkOptions::default(),
        }
    }
}
