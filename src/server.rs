//! MCP server implementation.
//!
//! Requests are read line by line. `tools/call` requests run as their own
//! tasks so a slow render never blocks `ping` or a cancellation; every other
//! method is answered inline. Responses funnel through a single writer task.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::AbortHandle;

use crate::error::{codes, Error, Result};
use crate::protocol::{
    CancelledParams, InitializeParams, InitializeResult, JsonRpcId, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, McpMessage, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolsCapability,
};
use crate::tools::{ToolContext, ToolRegistry};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name.
pub const SERVER_NAME: &str = "scraper-mcp";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const JSONRPC_VERSION: &str = "2.0";

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialization.
    Uninitialized,
    /// Server is initialized and ready.
    Ready,
    /// Server is shutting down.
    ShuttingDown,
}

/// MCP server for page scraping.
#[derive(Clone)]
pub struct McpServer {
    state: Arc<RwLock<ServerState>>,
    tools: Arc<ToolRegistry>,
    in_flight: Arc<Mutex<HashMap<JsonRpcId, AbortHandle>>>,
}

impl McpServer {
    /// Create a server exposing the scraping tools over `context`.
    pub fn new(context: ToolContext) -> Self {
        Self::with_registry(ToolRegistry::new(context))
    }

    /// Create a server over a custom tool registry.
    pub fn with_registry(tools: ToolRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::Uninitialized)),
            tools: Arc::new(tools),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Number of tool calls still running.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Run the server on stdio.
    pub async fn run_stdio(&self) -> Result<()> {
        tracing::info!("MCP server starting on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
        tracing::info!("MCP server shutting down");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`,
    /// until end of input, `shutdown` or `exit`. Tool calls still running at
    /// that point are aborted.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(rx, writer));

        let mut lines = BufReader::new(reader).lines();
        let outcome = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("stdin closed");
                    break Ok(());
                }
                Err(e) => break Err(Error::Io(e)),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            tracing::debug!("Received: {}", line);

            match McpMessage::parse(line) {
                Ok(McpMessage::Request(request)) if is_spawned_call(&request) => {
                    self.spawn_tool_call(request, tx.clone()).await;
                }
                Ok(message) => {
                    if let Some(response) = self.dispatch(message).await {
                        // The writer only stops once every sender is gone.
                        let _ = tx.send(response);
                    }
                }
                Err(e) => {
                    let _ = tx.send(JsonRpcResponse::error(
                        None,
                        codes::PARSE_ERROR,
                        e.to_string(),
                    ));
                }
            }

            if *self.state.read().await == ServerState::ShuttingDown {
                break Ok(());
            }
        };

        self.cancel_all().await;
        drop(tx);
        match writer_task.await {
            Ok(written) => written?,
            Err(e) => return Err(Error::Internal(format!("response writer failed: {e}"))),
        }
        outcome
    }

    /// Handle an incoming message, running tool calls to completion inline.
    pub async fn handle_message(&self, json: &str) -> Option<JsonRpcResponse> {
        match McpMessage::parse(json) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => Some(JsonRpcResponse::error(
                None,
                codes::PARSE_ERROR,
                e.to_string(),
            )),
        }
    }

    async fn dispatch(&self, message: McpMessage) -> Option<JsonRpcResponse> {
        match message {
            McpMessage::Request(request) => Some(self.handle_request(request).await),
            McpMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            // We don't expect responses in this direction
            McpMessage::Response(_) => None,
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                format!("unsupported JSON-RPC version: {}", request.jsonrpc),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params).await,
            "tools/list" => self.handle_tools_list(id).await,
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "shutdown" => {
                *self.state.write().await = ServerState::ShuttingDown;
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", request.method),
            ),
        }
    }

    /// Handle a notification (no response expected).
    async fn handle_notification(&self, notification: JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                let params = notification
                    .params
                    .map(serde_json::from_value::<CancelledParams>);
                match params {
                    Some(Ok(params)) => self.cancel(&params.request_id, params.reason).await,
                    Some(Err(e)) => tracing::debug!("Ignoring malformed cancellation: {}", e),
                    None => tracing::debug!("Ignoring cancellation without params"),
                }
            }
            "exit" => {
                *self.state.write().await = ServerState::ShuttingDown;
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    /// Run a tool call as its own task, tracked for cancellation.
    async fn spawn_tool_call(
        &self,
        request: JsonRpcRequest,
        responses: mpsc::UnboundedSender<JsonRpcResponse>,
    ) {
        let Some(id) = request.id.clone() else {
            return;
        };

        // Held across the spawn so the task's own removal cannot run first.
        let mut in_flight = self.in_flight.lock().await;
        let server = self.clone();
        let key = id.clone();
        let task = tokio::spawn(async move {
            let response = server.handle_tools_call(Some(id.clone()), request.params).await;
            {
                // A later call may have reused the id; only drop our own entry.
                let own = tokio::task::id();
                let mut in_flight = server.in_flight.lock().await;
                if in_flight.get(&id).is_some_and(|task| task.id() == own) {
                    in_flight.remove(&id);
                }
            }
            let _ = responses.send(response);
        });
        if in_flight.insert(key.clone(), task.abort_handle()).is_some() {
            tracing::warn!(id = %key, "duplicate request id; the earlier call is no longer cancellable");
        }
    }

    async fn cancel(&self, id: &JsonRpcId, reason: Option<String>) {
        match self.in_flight.lock().await.remove(id) {
            Some(task) => {
                task.abort();
                tracing::info!(%id, reason = reason.as_deref().unwrap_or(""), "Request cancelled by client");
            }
            None => tracing::debug!(%id, "Cancellation for unknown or finished request"),
        }
    }

    async fn cancel_all(&self) {
        let mut in_flight = self.in_flight.lock().await;
        if !in_flight.is_empty() {
            tracing::info!(count = in_flight.len(), "Aborting in-flight tool calls");
        }
        for (_, task) in in_flight.drain() {
            task.abort();
        }
    }

    /// Handle initialize request.
    async fn handle_initialize(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        codes::INVALID_PARAMS,
                        format!("invalid initialize params: {}", e),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    "initialize params required",
                );
            }
        };

        tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            protocol = %params.protocol_version,
            "Initializing"
        );
        *self.state.write().await = ServerState::Ready;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: SERVER_VERSION.into(),
            },
        };

        JsonRpcResponse::success(id, result)
    }

    /// Handle tools/list request.
    async fn handle_tools_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        let state = *self.state.read().await;
        if state != ServerState::Ready {
            return JsonRpcResponse::error(id, codes::INTERNAL_ERROR, "server not initialized");
        }

        let tools = self.tools.list_tools();
        JsonRpcResponse::success(id, ListToolsResult { tools })
    }

    /// Handle tools/call request.
    async fn handle_tools_call(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let state = *self.state.read().await;
        if state != ServerState::Ready {
            return JsonRpcResponse::error(id, codes::INTERNAL_ERROR, "server not initialized");
        }

        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        codes::INVALID_PARAMS,
                        format!("invalid tool call params: {}", e),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    "tool call params required",
                );
            }
        };

        match self.tools.execute(&params.name, params.arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::error!("Tool {} failed: {}", params.name, e);
                JsonRpcResponse::from_error(id, &e)
            }
        }
    }
}

/// Well-formed `tools/call` requests run as tasks; anything else is answered
/// inline, including the version error for a malformed one.
fn is_spawned_call(request: &JsonRpcRequest) -> bool {
    request.method == "tools/call" && request.jsonrpc == JSONRPC_VERSION
}

async fn write_responses<W>(
    mut responses: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = responses.recv().await {
        let json = serde_json::to_string(&response)?;
        tracing::debug!("Sending: {}", json);
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
