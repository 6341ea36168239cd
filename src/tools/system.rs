//! Built-in `echo` tool and the server's own status resources.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::Result;
use crate::mcp::context::ExecutionContext;
use crate::mcp::handler::ToolHandler;
use crate::mcp::protocol::{Arguments, Resource, Tool};
use crate::mcp::resources::{ResourceRegistry, StaticReader};

/// Returns its arguments as `{"got": arguments}`.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "echo".to_string(),
            description: "Echo the arguments back".to_string(),
            input_schema: json!({ "type": "object" }),
        }
    }

    async fn execute(&self, arguments: Arguments, _ctx: ExecutionContext) -> Result<Value> {
        Ok(json!({ "got": arguments }))
    }
}

/// Register `<server>://status` and `<server>://tools`.
///
/// Both describe the tool set passed in, i.e. the registry at startup.
pub fn register_system_resources(
    resources: &mut ResourceRegistry,
    server_name: &str,
    tool_names: Vec<String>,
) {
    resources.register(
        Resource {
            uri: format!("{}://tools", server_name),
            name: "Tool catalogue".to_string(),
            description: "Names of the tools this server offers".to_string(),
            mime_type: "text/markdown".to_string(),
        },
        StaticReader(tools_markdown(server_name, &tool_names)),
    );

    let server = server_name.to_string();
    let tool_count = tool_names.len();
    resources.register_fn(
        Resource {
            uri: format!("{}://status", server_name),
            name: "Server status".to_string(),
            description: "Liveness and tool count for this server".to_string(),
            mime_type: "application/json".to_string(),
        },
        move |_uri| {
            let status = json!({
                "server": server,
                "status": "running",
                "tools": tool_count,
                "timestamp": Utc::now().to_rfc3339(),
            });
            async move { Ok(status.to_string()) }
        },
    );
}

fn tools_markdown(server_name: &str, tool_names: &[String]) -> String {
    let mut out = format!("# {} tools\n\n", server_name);
    for name in tool_names {
        out.push_str(&format!("- `{}`\n", name));
    }
    out
}
