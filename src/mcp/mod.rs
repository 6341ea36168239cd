//! Model Context Protocol (MCP) implementation.
//!
//! # Architecture
//!
//! - `protocol` - Wire envelopes and payload types
//! - `context` - Per-call execution context
//! - `handler` - Tool handlers and the tool registry
//! - `resources` - Resource readers and the resource registry
//! - `server` - Request dispatch
//! - `stdio` - Line-delimited server transport
//! - `transport` - Client-side transports (HTTP, in-process)
//! - `client` - Agent-side client with a capability snapshot

pub mod client;
pub mod context;
pub mod handler;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod stdio;
pub mod transport;

pub use client::{CapabilitySnapshot, McpClient, ToolOutput};
pub use context::ExecutionContext;
pub use handler::{ToolHandler, ToolRegistry};
pub use protocol::*;
pub use resources::{ResourceReader, ResourceRegistry};
pub use server::{DispatchOutcome, McpServer};
pub use transport::{ClientTransport, HttpTransport, LocalTransport};
