//! Configuration for the assistant MCP server and its clients.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line arguments for the MCP server.
#[derive(Parser, Debug, Clone)]
#[command(name = "assistant-mcp")]
#[command(author = "Assistant MCP Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server core for multi-agent personal assistants")]
pub struct Args {
    /// Server name, reported by initialize and used in resource URIs
    #[arg(short, long, default_value = "assistant", env = "ASSISTANT_MCP_NAME")]
    pub name: String,

    /// Human-readable server description
    #[arg(long, env = "ASSISTANT_MCP_DESCRIPTION")]
    pub description: Option<String>,

    /// Transport mode: stdio or http
    #[arg(short, long, default_value = "http", env = "ASSISTANT_MCP_TRANSPORT")]
    pub transport: Transport,

    /// HTTP bind address (only for http transport)
    #[arg(long, default_value = "0.0.0.0", env = "ASSISTANT_MCP_HOST")]
    pub host: String,

    /// HTTP port (only for http transport)
    #[arg(short, long, default_value = "8000", env = "ASSISTANT_MCP_PORT")]
    pub port: u16,

    /// Enable debug logging
    #[arg(short, long, env = "ASSISTANT_MCP_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, default_value = "pretty", env = "ASSISTANT_MCP_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Upper bound for a single tool handler, in seconds (0 disables it)
    #[arg(long, default_value = "30", env = "ASSISTANT_MCP_TOOL_TIMEOUT_SECS")]
    pub tool_timeout_secs: u64,

    /// Skip validating tool arguments against input schemas
    #[arg(long, env = "ASSISTANT_MCP_NO_VALIDATE")]
    pub no_validate: bool,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    #[default]
    Http,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server name
    pub name: String,
    /// Server description
    pub description: Option<String>,
    /// Transport mode
    pub transport: Transport,
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Debug mode
    pub debug: bool,
    /// Log format
    pub log_format: LogFormat,
    /// Tool handler bound in seconds; 0 means unbounded
    pub tool_timeout_secs: u64,
    /// Argument schema validation enabled
    pub validate_arguments: bool,
}

impl Config {
    /// Server-side handler deadline, if any.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            name: args.name,
            description: args.description,
            transport: args.transport,
            host: args.host,
            port: args.port,
            debug: args.debug,
            log_format: args.log_format,
            tool_timeout_secs: args.tool_timeout_secs,
            validate_arguments: !args.no_validate,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "assistant".to_string(),
            description: None,
            transport: Transport::Http,
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            log_format: LogFormat::Pretty,
            tool_timeout_secs: 30,
            validate_arguments: true,
        }
    }
}

/// Agent-side client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the MCP server, without the `/mcp` suffix
    pub server_url: String,
    /// Name the client announces in `initialize`
    pub agent_name: String,
    /// Bound for one request round trip
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            agent_name: agent_name.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            agent_name: "agent".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
