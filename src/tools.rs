//! Tool definitions and registry for the MCP server.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::protocol::{ToolCallResult, ToolDefinition};

/// Tool trait for implementing MCP tools.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult>;
}

/// Context passed to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Scraping flows, with the shared fetcher and session pool.
    pub pipeline: Pipeline,
}

impl ToolContext {
    /// Create a new tool context.
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Arc<ToolContext>,
}

impl ToolRegistry {
    /// Create a registry with the built-in scraping tools.
    pub fn new(context: ToolContext) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
            context: Arc::new(context),
        };

        registry.register(Arc::new(FetchPageContentTool));
        registry.register(Arc::new(RenderedPageContentTool));
        registry.register(Arc::new(ExtractSiteLinksTool));
        registry.register(Arc::new(RenderedSiteLinksTool));

        registry
    }

    /// Get tool definitions, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        tool.execute(arguments, &self.context).await
    }

    /// Register a custom tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.insert(name, tool);
    }

    /// The shared tool context.
    pub fn context(&self) -> &ToolContext {
        &self.context
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

#[derive(Debug, Deserialize)]
struct UrlArgs {
    /// Absolute http(s) URL to scrape.
    url: Option<String>,
}

impl UrlArgs {
    fn parse(arguments: serde_json::Value) -> Result<String> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let args: UrlArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::Validation(format!("invalid arguments: {e}")))?;
        match args.url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(Error::Validation("url is required".into())),
        }
    }
}

fn url_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "format": "uri",
                "description": description
            }
        },
        "required": ["url"]
    })
}

/// Turn a flow outcome into a tool result. Domain failures are reported to
/// the caller as `isError` results; protocol failures propagate.
fn respond<T: Serialize>(tool: &str, outcome: Result<T>) -> Result<ToolCallResult> {
    match outcome {
        Ok(value) => ToolCallResult::json(&value),
        Err(e) if e.is_tool_failure() => {
            warn!(tool, kind = e.kind(), error = %e, "tool call failed");
            Ok(ToolCallResult::failure(&e))
        }
        Err(e) => Err(e),
    }
}

/// Static main-content extraction.
pub struct FetchPageContentTool;

#[async_trait::async_trait]
impl Tool for FetchPageContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_page_content".into(),
            description: "Fetch a web page over HTTP and return its title and main text, \
                          without headers, navigation or footers."
                .into(),
            input_schema: url_schema("Page to fetch"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let outcome = match UrlArgs::parse(arguments) {
            Ok(url) => {
                debug!(%url, "fetch_page_content");
                context.pipeline.fetch_static(&url).await
            }
            Err(e) => Err(e),
        };
        respond("fetch_page_content", outcome)
    }
}

/// Rendered main-content extraction with contact details.
pub struct RenderedPageContentTool;

#[async_trait::async_trait]
impl Tool for RenderedPageContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_page_content_with_playwright".into(),
            description: "Load a page in a headless browser (for JavaScript-rendered sites), \
                          dismiss cookie banners, and return its title, main text, emails \
                          and phone numbers."
                .into(),
            input_schema: url_schema("Page to render"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let outcome = match UrlArgs::parse(arguments) {
            Ok(url) => {
                debug!(%url, "fetch_page_content_with_playwright");
                context.pipeline.fetch_rendered(&url).await
            }
            Err(e) => Err(e),
        };
        respond("fetch_page_content_with_playwright", outcome)
    }
}

/// Static sitemap collection.
pub struct ExtractSiteLinksTool;

#[async_trait::async_trait]
impl Tool for ExtractSiteLinksTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "extract_site_links".into(),
            description: "Collect the same-site links in a page's header, navigation and \
                          footer, with the headings of the linked pages."
                .into(),
            input_schema: url_schema("Page whose links to collect"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let outcome = match UrlArgs::parse(arguments) {
            Ok(url) => {
                debug!(%url, "extract_site_links");
                context.pipeline.site_links_static(&url).await
            }
            Err(e) => Err(e),
        };
        respond("extract_site_links", outcome)
    }
}

/// Rendered sitemap collection.
pub struct RenderedSiteLinksTool;

#[async_trait::async_trait]
impl Tool for RenderedSiteLinksTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "extract_site_links_with_playwright".into(),
            description: "Render a page in a headless browser and collect the same-site \
                          links in its header, navigation and footer."
                .into(),
            input_schema: url_schema("Page whose links to collect"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let outcome = match UrlArgs::parse(arguments) {
            Ok(url) => {
                debug!(%url, "extract_site_links_with_playwright");
                context.pipeline.site_links_rendered(&url).await
            }
            Err(e) => Err(e),
        };
        respond("extract_site_links_with_playwright", outcome)
    }
}
