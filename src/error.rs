//! Error types for the MCP server.

use serde_json::json;
use thiserror::Error;

use crate::render::RenderError;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// MCP server errors.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON-RPC protocol error.
    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
        /// Additional data.
        data: Option<serde_json::Value>,
    },

    /// Tool not found.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Malformed URL or missing required input. Raised before any network access.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network failure, DNS failure or non-2xx status on a static fetch.
    #[error("fetch error for {url}: {message}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Failure detail.
        message: String,
    },

    /// Headless rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The document could not be turned into a tree at all.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::JsonRpc { code, .. } => *code,
            Error::ToolNotFound(_) => codes::METHOD_NOT_FOUND,
            Error::InvalidParams(_) | Error::Validation(_) => codes::INVALID_PARAMS,
            Error::Fetch { .. } => -32001,
            Error::Render(_) => -32003,
            Error::Extraction(_) => -32004,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::Io(_) => -32002,
            Error::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Short machine-readable kind used in tool failure payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::JsonRpc { .. } => "JsonRpcError",
            Error::ToolNotFound(_) => "ToolNotFound",
            Error::InvalidParams(_) => "InvalidParams",
            Error::Validation(_) => "ValidationError",
            Error::Fetch { .. } => "FetchError",
            Error::Render(_) => "RenderError",
            Error::Extraction(_) => "ExtractionError",
            Error::Serialization(_) => "SerializationError",
            Error::Io(_) => "IoError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Whether this error is a failure of the scraping work itself rather
    /// than of the JSON-RPC exchange. Such failures are reported to the
    /// assistant as a tool result with `isError` set.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Fetch { .. } | Error::Render(_) | Error::Extraction(_)
        )
    }

    /// Structured payload describing a tool failure.
    pub fn to_tool_payload(&self) -> serde_json::Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            Error::Fetch { url, status, .. } => {
                error["url"] = json!(url);
                if let Some(status) = status {
                    error["status"] = json!(status);
                }
            }
            Error::Render(render) => {
                error["state"] = json!(render.state);
                error["failure"] = json!(render.failure.label());
            }
            _ => {}
        }
        json!({ "error": error })
    }
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}
