//! Assistant MCP Server
//!
//! Serves the demo tool set over HTTP (`POST /mcp`) or line-delimited stdio.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use assistant_mcp::config::{Args, Config, LogFormat, Transport};
use assistant_mcp::error::Result;
use assistant_mcp::mcp::server::McpServer;
use assistant_mcp::mcp::stdio;
use assistant_mcp::tools;
use assistant_mcp::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config: Config = args.into();

    init_logging(&config);

    info!("Assistant MCP Server v{}", VERSION);
    info!("Server name: {}", config.name);
    info!("Transport: {:?}", config.transport);

    let (tools, resources) = tools::register_all(&config.name);
    info!(
        "Registered {} tools and {} resources",
        tools.tool_count(),
        resources.resource_count()
    );

    let server = Arc::new(McpServer::from_config(&config, tools, resources));

    match config.transport {
        Transport::Stdio => {
            tokio::select! {
                result = stdio::serve_stdio(&server) => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            }
        }
        Transport::Http => {
            assistant_mcp::http::serve(server, &config.bind_addr()).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays free for the stdio transport.
fn init_logging(config: &Config) {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
