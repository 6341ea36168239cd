//! Error types for the assistant MCP core.

use thiserror::Error;

use crate::mcp::protocol::error_codes;

/// Result type alias for assistant MCP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Protocol Errors =====
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    // ===== Client Errors =====
    #[error("Client not connected. Call connect() first.")]
    NotConnected,

    #[error("Tool '{name}' not available. Available tools: {available:?}")]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Resource '{uri}' not available. Available resources: {available:?}")]
    UnknownResource { uri: String, available: Vec<String> },

    #[error("MCP error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("API error: {status} {status_text} - {message}")]
    Api {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("Deadline exceeded: no result within {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },

    // ===== Agent Errors =====
    #[error(transparent)]
    Agent(#[from] AgentError),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== HTTP Errors =====
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Agent-level failures raised by [`crate::agent::McpOnlyAgent`].
///
/// Messages enumerate what is available so a failure explains itself.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("MCP client not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Tool '{tool}' not available through MCP. Available tools: {available:?}")]
    ToolUnavailable { tool: String, available: Vec<String> },

    #[error("Resource '{uri}' not available through MCP. Available resources: {available:?}")]
    ResourceUnavailable { uri: String, available: Vec<String> },

    #[error("Agent '{agent}' is missing required tools {missing:?}. Available tools: {available:?}")]
    MissingTools {
        agent: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Agent initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Tool '{tool}' execution failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Tool '{tool}' reported an error: {message}")]
    ToolReportedError { tool: String, message: String },

    #[error("Resource '{uri}' read failed: {source}")]
    ResourceFailed {
        uri: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an API error from HTTP response details.
    pub fn api(status: u16, status_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            status_text: status_text.into(),
            message: message.into(),
        }
    }

    /// JSON-RPC code used when this error crosses the wire.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::ToolNotFound(_) | Self::ResourceNotFound(_) | Self::InvalidParams(_) => {
                error_codes::INVALID_PARAMS
            }
            Self::DeadlineExceeded { .. } => error_codes::DEADLINE_EXCEEDED,
            Self::Rpc { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Rebuild a client-side error from a protocol error object.
    pub fn from_rpc(code: i32, message: impl Into<String>, timeout_ms: Option<u64>) -> Self {
        if code == error_codes::DEADLINE_EXCEEDED {
            return Self::DeadlineExceeded {
                timeout_ms: timeout_ms.unwrap_or_default(),
            };
        }
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Whether this is an agent-level error.
    pub fn is_agent_error(&self) -> bool {
        matches!(self, Self::Agent(_))
    }
}
