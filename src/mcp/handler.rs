//! Tool handlers and the tool registry.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::mcp::context::ExecutionContext;
use crate::mcp::protocol::{Arguments, Tool};

/// Handler for MCP tool calls.
///
/// The returned value is serialized into the text block of the `tools/call`
/// result. An `Err` becomes an `isError: true` result, not a protocol error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> Tool;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Arguments, ctx: ExecutionContext) -> Result<Value>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnTool<F> {
    tool: Tool,
    f: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Arguments, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    pub fn new(tool: Tool, f: F) -> Self {
        Self { tool, f }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Arguments, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    fn definition(&self) -> Tool {
        self.tool.clone()
    }

    async fn execute(&self, arguments: Arguments, ctx: ExecutionContext) -> Result<Value> {
        (self.f)(arguments, ctx).await
    }
}

struct RegisteredTool {
    definition: Tool,
    handler: Arc<dyn ToolHandler>,
    validator: Option<Arc<jsonschema::Validator>>,
}

/// Registry of tool handlers, owned by one server.
///
/// Registering under an existing name replaces the previous entry
/// (last write wins). There is no unregister. Listing order is unspecified.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler. Returns the definition it replaced, if any.
    pub fn register<T: ToolHandler + 'static>(&mut self, handler: T) -> Option<Tool> {
        self.register_arc(Arc::new(handler))
    }

    /// Register a tool handler (Arc version).
    pub fn register_arc(&mut self, handler: Arc<dyn ToolHandler>) -> Option<Tool> {
        let definition = handler.definition();
        let validator = compile_schema(&definition);
        let name = definition.name.clone();

        let previous = self.tools.insert(
            name.clone(),
            RegisteredTool {
                definition,
                handler,
                validator,
            },
        );

        match previous {
            Some(old) => {
                info!("Replaced tool: {}", name);
                Some(old.definition)
            }
            None => {
                info!("Registered tool: {}", name);
                None
            }
        }
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, tool: Tool, f: F) -> Option<Tool>
    where
        F: Fn(Arguments, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(FnTool::new(tool, f))
    }

    /// Look up a tool's declared definition.
    pub fn lookup(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// Get a tool handler by name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    /// Get all registered tool definitions.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Check arguments against the tool's input schema.
    ///
    /// Returns one message per violation. Tools whose schema failed to compile
    /// are never rejected here.
    pub fn validate_arguments(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> std::result::Result<(), Vec<String>> {
        let Some(validator) = self.tools.get(name).and_then(|t| t.validator.as_ref()) else {
            return Ok(());
        };

        let instance = Value::Object(arguments.clone());
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn compile_schema(tool: &Tool) -> Option<Arc<jsonschema::Validator>> {
    match jsonschema::validator_for(&tool.input_schema) {
        Ok(validator) => Some(Arc::new(validator)),
        Err(e) => {
            warn!(
                "Input schema for tool '{}' does not compile, arguments will not be validated: {}",
                tool.name, e
            );
            None
        }
    }
}

/// Helper macro for creating tool input schemas.
#[macro_export]
macro_rules! tool_schema {
    (required: [$($req:expr),* $(,)?], $($json:tt)+) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $($json)+
            },
            "required": [$($req),*]
        })
    };
    ($($json:tt)+) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $($json)+
            }
        })
    };
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &Arguments, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| Error::InvalidParams(format!("Missing required argument: {}", name)))
}

/// Helper to extract an optional string argument.
pub fn get_optional_string_arg(args: &Arguments, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(String::from)
}

/// Helper to extract a numeric argument with a default.
pub fn get_f64_arg(args: &Arguments, name: &str, default: f64) -> f64 {
    args.get(name).and_then(|v| v.as_f64()).unwrap_or(default)
}

/// Helper to extract a boolean argument with a default.
pub fn get_bool_arg(args: &Arguments, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}
