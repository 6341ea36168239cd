//! MCP server: request dispatch and response envelopes.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mcp::context::ExecutionContext;
use crate::mcp::handler::ToolRegistry;
use crate::mcp::protocol::*;
use crate::mcp::resources::ResourceRegistry;
use crate::metrics::{Metrics, Timer};
use crate::VERSION;

/// Everything a single dispatch can end in.
///
/// Protocol failures travel in the envelope's `error` field. Tool failures
/// travel inside a successful envelope with `isError: true`. A missed
/// deadline is its own protocol code. A handler that panics is a protocol
/// failure (`-32603`), not a tool failure.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Plain method result (`initialize`, lists, `resources/read`).
    Result(Value),
    /// Value returned by a tool handler, to be wrapped as text content.
    ToolResult(Value),
    /// Tool handler failed.
    ToolError(String),
    /// Bad method, bad params, unknown name, internal failure.
    Protocol(RpcError),
    /// Tool handler did not finish in time.
    DeadlineExceeded { timeout_ms: u64 },
}

impl DispatchOutcome {
    /// Build the wire response for this outcome.
    pub fn into_response(self, id: Option<RequestId>) -> McpResponse {
        match self {
            Self::Result(value) => McpResponse::success(id, value),
            // Two-space indent; test_echo_scenario pins the layout.
            Self::ToolResult(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => tool_response(id, text, false),
                Err(e) => McpResponse::failure(id, RpcError::internal(e.to_string())),
            },
            Self::ToolError(message) => tool_response(id, message, true),
            Self::Protocol(error) => McpResponse::failure(id, error),
            Self::DeadlineExceeded { timeout_ms } => {
                McpResponse::failure(id, RpcError::deadline_exceeded(timeout_ms))
            }
        }
    }

    fn from_result<T: serde::Serialize>(result: Result<T>) -> Self {
        match result.and_then(|v| Ok(serde_json::to_value(v)?)) {
            Ok(value) => Self::Result(value),
            Err(e) => Self::from(e),
        }
    }
}

impl From<Error> for DispatchOutcome {
    fn from(e: Error) -> Self {
        match e {
            Error::DeadlineExceeded { timeout_ms } => Self::DeadlineExceeded { timeout_ms },
            other => Self::Protocol(RpcError::new(other.rpc_code(), other.to_string())),
        }
    }
}

fn tool_response(id: Option<RequestId>, text: String, is_error: bool) -> McpResponse {
    let result = ToolResult {
        content: vec![ContentBlock::Text { text }],
        is_error,
    };
    match serde_json::to_value(result) {
        Ok(value) => McpResponse::success(id, value),
        Err(e) => McpResponse::failure(id, RpcError::internal(e.to_string())),
    }
}

/// Typed handler for one method.
type MethodFn = for<'a> fn(&'a McpServer, Option<Value>, Option<RequestId>) -> BoxFuture<'a, DispatchOutcome>;

fn handler_for(method: Method) -> MethodFn {
    match method {
        Method::Initialize => initialize,
        Method::ToolsList => list_tools,
        Method::ToolsCall => call_tool,
        Method::ResourcesList => list_resources,
        Method::ResourcesRead => read_resource,
    }
}

fn initialize(s: &McpServer, params: Option<Value>, _: Option<RequestId>) -> BoxFuture<'_, DispatchOutcome> {
    async move { s.handle_initialize(params) }.boxed()
}

fn list_tools(s: &McpServer, _: Option<Value>, _: Option<RequestId>) -> BoxFuture<'_, DispatchOutcome> {
    async move { s.handle_list_tools() }.boxed()
}

fn call_tool(s: &McpServer, params: Option<Value>, id: Option<RequestId>) -> BoxFuture<'_, DispatchOutcome> {
    s.handle_call_tool(params, id).boxed()
}

fn list_resources(s: &McpServer, _: Option<Value>, _: Option<RequestId>) -> BoxFuture<'_, DispatchOutcome> {
    async move { s.handle_list_resources() }.boxed()
}

fn read_resource(s: &McpServer, params: Option<Value>, _: Option<RequestId>) -> BoxFuture<'_, DispatchOutcome> {
    s.handle_read_resource(params).boxed()
}

/// MCP server.
///
/// Owns its tool and resource registries; several servers can live in one
/// process without sharing state.
pub struct McpServer {
    tools: ToolRegistry,
    resources: ResourceRegistry,
    info: ServerInfo,
    tool_timeout: Option<Duration>,
    validate_arguments: bool,
    metrics: Arc<Metrics>,
    dispatch: HashMap<&'static str, MethodFn>,
}

impl McpServer {
    /// Create a new MCP server.
    pub fn new(name: impl Into<String>, tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        Self {
            tools,
            resources,
            info: ServerInfo {
                name: name.into(),
                version: VERSION.to_string(),
                description: None,
            },
            tool_timeout: None,
            validate_arguments: true,
            metrics: Metrics::new(),
            dispatch: Method::ALL
                .into_iter()
                .map(|m| (m.as_str(), handler_for(m)))
                .collect(),
        }
    }

    /// Create a server configured from the command line.
    pub fn from_config(config: &Config, tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        let server = Self::new(config.name.clone(), tools, resources)
            .with_tool_timeout(config.tool_timeout())
            .with_validation(config.validate_arguments);
        match &config.description {
            Some(description) => server.with_description(description.clone()),
            None => server,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    /// Upper bound for every handler. `None` disables the server-side bound.
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Toggle argument validation against each tool's input schema.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_arguments = enabled;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::standard()
    }

    /// Handle one request. Never fails: every problem becomes part of the
    /// returned envelope.
    pub async fn handle(&self, request: McpRequest) -> McpResponse {
        let McpRequest { method, params, id } = request;
        debug!("Handling request: {} (id: {:?})", method, id);
        self.metrics.inc_requests();
        let timer = Timer::start();

        let outcome = match self.dispatch.get(method.as_str()) {
            Some(handler) => {
                match AssertUnwindSafe(handler(self, params, id.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(&*panic);
                        error!("MCP request error: {} panicked: {}", method, message);
                        DispatchOutcome::Protocol(RpcError::internal(message))
                    }
                }
            }
            None => DispatchOutcome::Protocol(RpcError::method_not_found(&method)),
        };

        self.record(&outcome);
        debug!("Handled {} in {}ms", method, timer.elapsed_ms());
        outcome.into_response(id)
    }

    fn record(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Result(_) | DispatchOutcome::ToolResult(_) => {
                self.metrics.inc_success()
            }
            DispatchOutcome::ToolError(_) => {
                self.metrics.inc_success();
                self.metrics.inc_tool_errors();
            }
            DispatchOutcome::Protocol(_) => self.metrics.inc_protocol_errors(),
            DispatchOutcome::DeadlineExceeded { .. } => {
                self.metrics.inc_protocol_errors();
                self.metrics.inc_deadlines();
            }
        }
    }

    /// Handle initialize request. Idempotent.
    fn handle_initialize(&self, params: Option<Value>) -> DispatchOutcome {
        if let Some(init) = params.and_then(|p| serde_json::from_value::<InitializeParams>(p).ok()) {
            info!(
                "Client initialized: {} v{} (protocol {})",
                init.client_info.name, init.client_info.version, init.protocol_version
            );
        }

        DispatchOutcome::from_result(Ok(InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: self.capabilities(),
            server_info: self.info.clone(),
        }))
    }

    /// Handle list tools request.
    fn handle_list_tools(&self) -> DispatchOutcome {
        DispatchOutcome::from_result(Ok(ListToolsResult {
            tools: self.tools.list_tools(),
        }))
    }

    /// Handle call tool request.
    async fn handle_call_tool(&self, params: Option<Value>, id: Option<RequestId>) -> DispatchOutcome {
        let params: CallToolParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };

        let Some(handler) = self.tools.get_tool(&params.name) else {
            return Error::ToolNotFound(params.name).into();
        };

        let arguments = match params.arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Error::InvalidParams("arguments must be an object".to_string()).into()
            }
        };

        if self.validate_arguments {
            if let Err(violations) = self.tools.validate_arguments(&params.name, &arguments) {
                return Error::InvalidParams(format!(
                    "Invalid arguments for tool '{}': {}",
                    params.name,
                    violations.join("; ")
                ))
                .into();
            }
        }

        let timeout = effective_timeout(
            self.tool_timeout,
            params.meta.and_then(|m| m.timeout_ms).map(Duration::from_millis),
        );

        let session_id = id.map(|i| i.to_string()).unwrap_or_else(|| "default".to_string());
        let mut ctx = ExecutionContext::new("default", session_id);
        if let Some(limit) = timeout {
            ctx = ctx.with_timeout(limit);
        }

        self.metrics.inc_tool_calls();
        let call = handler.execute(arguments, ctx.clone());
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancel();
                    warn!("Tool '{}' exceeded its deadline of {:?}", params.name, limit);
                    return DispatchOutcome::DeadlineExceeded {
                        timeout_ms: limit.as_millis() as u64,
                    };
                }
            },
            None => call.await,
        };

        match result {
            Ok(value) => DispatchOutcome::ToolResult(value),
            Err(e) => {
                error!("Tool execution error in '{}': {}", params.name, e);
                DispatchOutcome::ToolError(format!("Error executing tool: {}", e))
            }
        }
    }

    /// Handle list resources request.
    fn handle_list_resources(&self) -> DispatchOutcome {
        DispatchOutcome::from_result(Ok(ListResourcesResult {
            resources: self.resources.list(),
        }))
    }

    /// Handle read resource request.
    async fn handle_read_resource(&self, params: Option<Value>) -> DispatchOutcome {
        let params: ReadResourceParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };

        let (Some(descriptor), Some(reader)) = (
            self.resources.lookup(&params.uri),
            self.resources.get_reader(&params.uri),
        ) else {
            return Error::ResourceNotFound(params.uri).into();
        };

        match reader.read(&params.uri).await {
            Ok(text) => DispatchOutcome::from_result(Ok(ReadResourceResult {
                contents: vec![ResourceContents {
                    uri: params.uri,
                    mime_type: descriptor.mime_type.clone(),
                    text,
                }],
            })),
            Err(e) => DispatchOutcome::Protocol(RpcError::new(
                error_codes::INTERNAL_ERROR,
                format!("Error reading resource: {}", e),
            )),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn effective_timeout(server: Option<Duration>, requested: Option<Duration>) -> Option<Duration> {
    match (server, requested) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
