//! scraper-mcp - MCP server for web page scraping
//!
//! This binary serves the scraping tools over stdio to AI assistants such
//! as GitHub Copilot and Claude Desktop.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use scraper_mcp::config::{ScraperConfig, DEFAULT_USER_AGENT};
use scraper_mcp::render::{default_launcher, Renderer, SessionPool};
use scraper_mcp::{HttpFetcher, McpServer, Pipeline, ToolContext};

/// MCP server for static and JavaScript-rendered web page scraping.
#[derive(Parser, Debug)]
#[command(name = "scraper-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, env = "SCRAPER_MCP_VERBOSE")]
    verbose: bool,

    /// Log output file (default: stderr).
    #[arg(long, env = "SCRAPER_MCP_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SCRAPER_MCP_JSON_LOGS")]
    json_logs: bool,

    /// Static fetch timeout, in seconds.
    #[arg(long, env = "SCRAPER_MCP_FETCH_TIMEOUT", default_value_t = 20)]
    fetch_timeout: u64,

    /// Page navigation timeout, in seconds.
    #[arg(long, env = "SCRAPER_MCP_NAVIGATION_TIMEOUT", default_value_t = 15)]
    navigation_timeout: u64,

    /// Upper bound on the network-idle wait, in seconds.
    #[arg(long, env = "SCRAPER_MCP_IDLE_TIMEOUT", default_value_t = 10)]
    idle_timeout: u64,

    /// DOM snapshot timeout, in seconds.
    #[arg(long, env = "SCRAPER_MCP_SNAPSHOT_TIMEOUT", default_value_t = 10)]
    snapshot_timeout: u64,

    /// Maximum concurrent browser sessions.
    #[arg(long, env = "SCRAPER_MCP_MAX_SESSIONS", default_value_t = 5)]
    max_sessions: usize,

    /// Maximum link targets fetched for heading annotation.
    #[arg(long, env = "SCRAPER_MCP_HEADING_FETCH_LIMIT", default_value_t = 20)]
    heading_fetch_limit: usize,

    /// Show the browser window (non-headless mode).
    #[arg(long, env = "SCRAPER_MCP_HEADED")]
    headed: bool,

    /// User-Agent sent on fetches and page loads.
    #[arg(long, env = "SCRAPER_MCP_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
}

impl Args {
    fn config(&self) -> ScraperConfig {
        let mut config = ScraperConfig {
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            user_agent: self.user_agent.clone(),
            ..ScraperConfig::default()
        };
        config.render.navigation_timeout = Duration::from_secs(self.navigation_timeout);
        config.render.idle_timeout = Duration::from_secs(self.idle_timeout);
        config.render.snapshot_timeout = Duration::from_secs(self.snapshot_timeout);
        config.render.max_sessions = self.max_sessions;
        config.render.headless = !self.headed;
        config.links.heading_fetch_limit = self.heading_fetch_limit;
        config
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Never stdout: it carries the MCP protocol.
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            if args.json_logs {
                layer.json().boxed()
            } else {
                layer.boxed()
            }
        }
        None => {
            let layer = fmt::layer().with_writer(std::io::stderr);
            if args.json_logs {
                layer.json().boxed()
            } else {
                layer.boxed()
            }
        }
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .context("installing the tracing subscriber")?;
    Ok(())
}

fn build_server(config: ScraperConfig) -> anyhow::Result<McpServer> {
    let fetcher = HttpFetcher::new(&config).context("building the HTTP client")?;
    let launcher = default_launcher(&config.render, &config.user_agent);
    let pool = SessionPool::new(config.render.max_sessions);
    let renderer = Renderer::new(launcher, pool, config.render.clone());
    let pipeline = Pipeline::new(Arc::new(fetcher), renderer, config);
    Ok(McpServer::new(ToolContext::new(pipeline)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("scraper-mcp: {e:#}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        "Starting {} v{}",
        scraper_mcp::server::SERVER_NAME,
        scraper_mcp::server::SERVER_VERSION
    );

    let config = args.config();
    tracing::info!(
        max_sessions = config.render.max_sessions,
        headless = config.render.headless,
        fetch_timeout = ?config.fetch_timeout,
        "Configured"
    );

    let server = match build_server(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Startup failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match server.run_stdio().await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
