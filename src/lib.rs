//! # scraper-mcp
//!
//! MCP (Model Context Protocol) server that scrapes web pages for AI
//! assistants.
//!
//! Pages are loaded either with a plain HTTP request or in a headless
//! browser (for JavaScript-rendered sites), normalized into one document
//! model, and then reduced to their main content or to the site links found
//! in their header, navigation and footer.
//!
//! ## Features
//!
//! - **MCP-compliant**: JSON-RPC 2.0 over stdio (standard MCP transport),
//!   with concurrent tool calls and `notifications/cancelled` support
//! - **Main-content extraction**: density scoring with boilerplate removal
//! - **Rendered pages**: shadow DOM flattening, cookie-consent dismissal,
//!   email and phone extraction, capped at a fixed number of browser sessions
//! - **Virtual sitemap**: deduplicated same-host links from structural regions
//!
//! ## Available Tools
//!
//! - `fetch_page_content`: main text of a page fetched over HTTP
//! - `fetch_page_content_with_playwright`: main text and contacts of a rendered page
//! - `extract_site_links`: header/nav/footer links, with target headings
//! - `extract_site_links_with_playwright`: header/nav/footer links of a rendered page
//!
//! ## Usage with VS Code
//!
//! Add to your `.vscode/mcp.json`:
//!
//! ```json
//! {
//!   "servers": {
//!     "scraper": {
//!       "command": "scraper-mcp",
//!       "args": [],
//!       "env": { "SCRAPER_MCP_LOG_FILE": "/tmp/scraper-mcp.log" }
//!     }
//!   }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod contact;
pub mod document;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod links;
pub mod pipeline;
pub mod protocol;
pub mod regions;
pub mod render;
pub mod server;
pub mod tools;
pub mod urls;

pub use config::ScraperConfig;
pub use error::{Error, Result};
pub use fetch::{HttpFetcher, PageFetcher};
pub use pipeline::{ExtractedContent, Pipeline, RenderedContent};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use render::{Renderer, SessionPool};
pub use server::McpServer;
pub use tools::{Tool, ToolContext, ToolRegistry};
