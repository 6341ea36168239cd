//! Tools served by the `assistant-mcp` binary.
//!
//! - `system` - `echo` plus the `<server>://status` and `<server>://tools` resources
//! - `pantry` - In-memory pantry inventory

pub mod pantry;
pub mod system;

use crate::mcp::handler::ToolRegistry;
use crate::mcp::resources::ResourceRegistry;

/// Build the registries for a server named `server_name`.
pub fn register_all(server_name: &str) -> (ToolRegistry, ResourceRegistry) {
    let mut tools = ToolRegistry::new();
    tools.register(system::EchoTool);
    tools.register(pantry::PantryTrackerTool::new());

    let mut resources = ResourceRegistry::new();
    system::register_system_resources(&mut resources, server_name, tools.names());

    (tools, resources)
}
