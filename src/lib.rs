//! Assistant MCP - Rust Implementation
//!
//! Model Context Protocol core for multi-agent personal assistants. Agents
//! reach tools and resources only through an MCP client; servers expose them
//! through a small, fixed set of JSON-RPC style methods.
//!
//! # Architecture
//!
//! 1. **MCP Layer** (`mcp`) - Envelopes, registries, server dispatch, client, transports
//! 2. **Agent Layer** (`agent`) - MCP-only agents whose single access path is an `McpClient`
//! 3. **A2A Layer** (`a2a`) - In-process agent-to-agent routing and sequential workflows
//! 4. **Serving** (`http`, `tools`) - axum transport and the demo tool set used by the binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use assistant_mcp::mcp::{McpClient, McpServer};
//! use assistant_mcp::config::ClientConfig;
//!
//! # async fn run() -> assistant_mcp::Result<()> {
//! let (tools, resources) = assistant_mcp::tools::register_all("demo");
//! let server = Arc::new(McpServer::new("demo", tools, resources));
//!
//! let mut client = McpClient::local(server, ClientConfig::default());
//! client.connect().await?;
//! let out = client.call_tool("echo", serde_json::json!({"x": 1})).await?;
//! assert_eq!(out.value["got"]["x"], 1);
//! # Ok(())
//! # }
//! ```

pub mod a2a;
pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod metrics;
pub mod tools;

pub use error::{AgentError, Error, Result};

/// Crate version, reported in `initialize` and `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
