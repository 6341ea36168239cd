//! MCP-only agents.
//!
//! An agent reaches tools and resources through exactly one path:
//! [`McpAccess`], which owns the agent's single [`McpClient`]. Concrete
//! agents implement [`AgentBehavior`] and only ever see `&McpAccess`, so
//! there is no way to call a tool function directly.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::error::{AgentError, Error, Result};
use crate::mcp::client::{CapabilitySnapshot, McpClient};
use crate::mcp::protocol::{Resource, Tool};
use crate::mcp::server::McpServer;
use crate::mcp::transport::{ClientTransport, HttpTransport, LocalTransport};

/// Agent-specific behavior plugged into [`McpOnlyAgent`].
#[async_trait]
pub trait AgentBehavior: Send {
    /// Runs once the client is connected and capabilities are cached.
    /// Typically asserts that required tools are present.
    async fn agent_initialize(&mut self, mcp: &McpAccess) -> Result<()>;

    /// Runs before the client disconnects.
    async fn agent_shutdown(&mut self, mcp: &McpAccess) -> Result<()>;

    /// Handle one request from the hosting application.
    async fn process_request(&mut self, mcp: &McpAccess, request: Value) -> Result<Value>;
}

/// The only path from an agent to its tools and resources.
pub struct McpAccess {
    agent_name: String,
    client: Option<McpClient>,
}

impl McpAccess {
    fn new(agent_name: String) -> Self {
        Self {
            agent_name,
            client: None,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> std::result::Result<&McpClient, AgentError> {
        self.client.as_ref().ok_or(AgentError::NotInitialized)
    }

    /// Capabilities cached at initialization.
    pub fn capabilities(&self) -> Result<&CapabilitySnapshot> {
        Ok(self.client()?.capabilities())
    }

    pub fn available_tools(&self) -> Vec<String> {
        self.client
            .as_ref()
            .map(|c| c.capabilities().tool_names())
            .unwrap_or_default()
    }

    pub fn available_resources(&self) -> Vec<String> {
        self.client
            .as_ref()
            .map(|c| c.capabilities().resource_uris())
            .unwrap_or_default()
    }

    pub fn is_tool_available(&self, tool: &str) -> bool {
        self.client
            .as_ref()
            .is_some_and(|c| c.is_tool_available(tool))
    }

    /// Use a tool through MCP.
    ///
    /// A tool that reports `isError: true` becomes
    /// [`AgentError::ToolReportedError`]; transport or protocol failures
    /// become [`AgentError::ToolFailed`].
    pub async fn use_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        let client = self.client()?;
        if !client.is_tool_available(tool) {
            return Err(AgentError::ToolUnavailable {
                tool: tool.to_string(),
                available: client.capabilities().tool_names(),
            }
            .into());
        }

        info!("[{}] Using tool '{}'", self.agent_name, tool);
        match client.call_tool(tool, arguments).await {
            Ok(output) if output.is_error => {
                error!("[{}] Tool '{}' reported an error", self.agent_name, tool);
                Err(AgentError::ToolReportedError {
                    tool: tool.to_string(),
                    message: output.error_message(),
                }
                .into())
            }
            Ok(output) => {
                info!("[{}] Tool '{}' executed successfully", self.agent_name, tool);
                Ok(output.value)
            }
            Err(e) => {
                error!("[{}] Tool '{}' execution failed: {}", self.agent_name, tool, e);
                Err(AgentError::ToolFailed {
                    tool: tool.to_string(),
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    /// Read a resource through MCP.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let client = self.client()?;
        if !client.is_resource_available(uri) {
            return Err(AgentError::ResourceUnavailable {
                uri: uri.to_string(),
                available: client.capabilities().resource_uris(),
            }
            .into());
        }

        info!("[{}] Reading resource '{}'", self.agent_name, uri);
        client.read_resource(uri).await.map_err(|e| {
            error!("[{}] Resource '{}' read failed: {}", self.agent_name, uri, e);
            AgentError::ResourceFailed {
                uri: uri.to_string(),
                source: Box::new(e),
            }
            .into()
        })
    }

    /// Fail with [`AgentError::MissingTools`] unless every tool `kind`
    /// needs is in the cached snapshot.
    pub fn require_tools(&self, kind: AgentKind) -> Result<()> {
        let report = kind.validate_tools(&self.available_tools());
        if report.valid {
            Ok(())
        } else {
            Err(AgentError::MissingTools {
                agent: self.agent_name.clone(),
                missing: report.missing,
                available: report.available,
            }
            .into())
        }
    }
}

/// Base agent: lifecycle around one MCP client plus pluggable behavior.
pub struct McpOnlyAgent<B> {
    access: McpAccess,
    transport: Arc<dyn ClientTransport>,
    config: ClientConfig,
    behavior: B,
}

impl<B: AgentBehavior> McpOnlyAgent<B> {
    /// Agent talking HTTP to `config.server_url`.
    pub fn new(config: ClientConfig, behavior: B) -> Self {
        let transport = HttpTransport::new(&config.server_url, config.request_timeout);
        Self::with_transport(Arc::new(transport), config, behavior)
    }

    /// Agent bound to an in-process server.
    pub fn local(server: Arc<McpServer>, config: ClientConfig, behavior: B) -> Self {
        Self::with_transport(Arc::new(LocalTransport::new(server)), config, behavior)
    }

    pub fn with_transport(
        transport: Arc<dyn ClientTransport>,
        config: ClientConfig,
        behavior: B,
    ) -> Self {
        info!("Created {} agent with MCP-only access", config.agent_name);
        Self {
            access: McpAccess::new(config.agent_name.clone()),
            transport,
            config,
            behavior,
        }
    }

    pub fn name(&self) -> &str {
        self.access.agent_name()
    }

    pub fn is_initialized(&self) -> bool {
        self.access.is_initialized()
    }

    pub fn access(&self) -> &McpAccess {
        &self.access
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.behavior
    }

    /// Build the client, connect, cache capabilities, then run the
    /// behavior's `agent_initialize`. On failure the client is released.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.access.is_initialized() {
            return Ok(());
        }

        let mut client = McpClient::new(self.transport.clone(), self.config.clone());
        if let Err(e) = client.connect().await {
            error!("Failed to initialize agent {}: {}", self.name(), e);
            return Err(AgentError::InitializationFailed(e.to_string()).into());
        }

        info!(
            "MCP capabilities cached for {}. Tools: {:?}",
            self.name(),
            client.capabilities().tool_names()
        );
        self.access.client = Some(client);

        if let Err(e) = self.behavior.agent_initialize(&self.access).await {
            error!("Failed to initialize agent {}: {}", self.name(), e);
            self.release_client().await;
            return Err(match e {
                Error::Agent(agent) => Error::Agent(agent),
                other => AgentError::InitializationFailed(other.to_string()).into(),
            });
        }

        info!("Agent {} initialized successfully", self.name());
        Ok(())
    }

    /// Run `agent_shutdown`, then disconnect. The disconnect happens even
    /// when the hook fails. A no-op on an agent that is not initialized.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.access.is_initialized() {
            return Ok(());
        }

        let hook = self.behavior.agent_shutdown(&self.access).await;
        if let Err(e) = &hook {
            error!("Error during agent shutdown: {}", e);
        }

        let disconnect = match self.access.client.take() {
            Some(mut client) => client.disconnect().await,
            None => Ok(()),
        };

        info!("Agent {} shutdown completed", self.name());
        hook.and(disconnect)
    }

    async fn release_client(&mut self) {
        if let Some(mut client) = self.access.client.take() {
            if let Err(e) = client.disconnect().await {
                error!("Failed to disconnect {}: {}", self.name(), e);
            }
        }
    }

    /// Initialize, run `body`, then shut down no matter how `body` ended.
    /// A panic in `body` is resumed after shutdown completes.
    pub async fn scoped<T, F>(&mut self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, Result<T>>,
    {
        self.initialize().await?;

        let outcome = AssertUnwindSafe(body(self)).catch_unwind().await;
        let shutdown = self.shutdown().await;

        match outcome {
            Ok(result) => {
                let value = result?;
                shutdown?;
                Ok(value)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Hand a request to the behavior.
    pub async fn process_request(&mut self, request: Value) -> Result<Value> {
        self.behavior.process_request(&self.access, request).await
    }

    pub async fn use_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        self.access.use_tool(tool, arguments).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        self.access.read_resource(uri).await
    }

    /// Live tool list from the server.
    pub async fn list_available_tools(&self) -> Result<Vec<Tool>> {
        self.access.client()?.list_tools().await
    }

    /// Live resource list from the server.
    pub async fn list_available_resources(&self) -> Result<Vec<Resource>> {
        self.access.client()?.list_resources().await
    }

    /// Cached input schema for a tool.
    pub fn tool_schema(&self, tool: &str) -> Result<Option<Value>> {
        Ok(self.access.client()?.tool_schema(tool).cloned())
    }

    /// `false` when not initialized, otherwise the client's ping.
    pub async fn health_check(&self) -> bool {
        match &self.access.client {
            Some(client) => client.ping().await,
            None => false,
        }
    }
}

/// Agent roles with a known set of required tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Shopping,
    Health,
    Nutrition,
    Scheduler,
}

impl AgentKind {
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            Self::Shopping => &[
                "pantry_tracker",
                "deal_finder",
                "price_comparator",
                "shopping_optimizer",
            ],
            Self::Health => &[
                "fitness_tracker",
                "health_analyzer",
                "recovery_monitor",
                "workout_planner",
            ],
            Self::Nutrition => &["meal_planner", "nutrition_analyzer", "recipe_engine"],
            Self::Scheduler => &[
                "calendar_manager",
                "scheduling_optimizer",
                "time_tracker",
                "focus_blocker",
                "timezone_handler",
            ],
        }
    }

    /// Compare the required tools against what a server offers.
    pub fn validate_tools(&self, available: &[String]) -> ToolValidation {
        let required: Vec<String> = self.required_tools().iter().map(|t| t.to_string()).collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|t| !available.contains(t))
            .cloned()
            .collect();

        ToolValidation {
            valid: missing.is_empty(),
            required,
            available: available.to_vec(),
            missing,
        }
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shopping" => Ok(Self::Shopping),
            "health" => Ok(Self::Health),
            "nutrition" => Ok(Self::Nutrition),
            "scheduler" => Ok(Self::Scheduler),
            other => Err(Error::Config(format!("Unknown agent kind: {}", other))),
        }
    }
}

/// Result of [`AgentKind::validate_tools`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolValidation {
    pub valid: bool,
    pub required: Vec<String>,
    pub available: Vec<String>,
    pub missing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::ToolRegistry;
    use crate::mcp::protocol::{McpRequest, McpResponse};
    use crate::mcp::resources::{ResourceRegistry, StaticReader};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        inner: LocalTransport,
        sent: AtomicUsize,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl ClientTransport for CountingTransport {
        async fn send(&self, request: McpRequest) -> Result<McpResponse> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.inner.send(request).await
        }

        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Probe {
        kind: Option<AgentKind>,
        initialized: Arc<AtomicUsize>,
        shut_down: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentBehavior for Probe {
        async fn agent_initialize(&mut self, mcp: &McpAccess) -> Result<()> {
            if let Some(kind) = self.kind {
                mcp.require_tools(kind)?;
            }
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn agent_shutdown(&mut self, _mcp: &McpAccess) -> Result<()> {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn process_request(&mut self, mcp: &McpAccess, request: Value) -> Result<Value> {
            let got = mcp.use_tool("echo", request).await?;
            Ok(json!({ "success": true, "echo": got }))
        }
    }

    fn server() -> Arc<McpServer> {
        let mut tools = ToolRegistry::new();
        tools.register_fn(
            Tool {
                name: "echo".to_string(),
                description: "Echo".to_string(),
                input_schema: json!({"type": "object"}),
            },
            |arguments, _ctx| async move { Ok(json!({ "got": arguments })) },
        );
        tools.register_fn(
            Tool {
                name: "broken".to_string(),
                description: "Always fails".to_string(),
                input_schema: json!({"type": "object"}),
            },
            |_args, _ctx| async { Err(Error::ToolExecutionFailed("out of stock".to_string())) },
        );

        let mut resources = ResourceRegistry::new();
        resources.register(
            Resource {
                uri: "demo://x".to_string(),
                name: "x".to_string(),
                description: String::new(),
                mime_type: "text/plain".to_string(),
            },
            StaticReader("hello".to_string()),
        );
        Arc::new(McpServer::new("demo", tools, resources))
    }

    fn agent(probe: Probe) -> (McpOnlyAgent<Probe>, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            inner: LocalTransport::new(server()),
            sent: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });
        let config = ClientConfig::new("local", "bucky");
        (McpOnlyAgent::with_transport(transport.clone(), config, probe), transport)
    }

    #[tokio::test]
    async fn test_use_tool_before_initialize() {
        let (agent, transport) = agent(Probe::default());

        let err = agent.use_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::NotInitialized)));
        assert!(err.to_string().contains("initialize()"));

        let err = agent.read_resource("demo://x").await.unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::NotInitialized)));
        assert!(!agent.health_check().await);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_and_use() {
        let (mut agent, _) = agent(Probe::default());
        agent.initialize().await.unwrap();

        assert!(agent.is_initialized());
        assert_eq!(agent.behavior().initialized.load(Ordering::SeqCst), 1);
        assert_eq!(agent.use_tool("echo", json!({"x": 1})).await.unwrap(), json!({"got": {"x": 1}}));
        assert_eq!(agent.read_resource("demo://x").await.unwrap(), "hello");
        assert_eq!(agent.tool_schema("echo").unwrap(), Some(json!({"type": "object"})));
        assert_eq!(agent.list_available_tools().await.unwrap().len(), 2);
        assert_eq!(agent.list_available_resources().await.unwrap().len(), 1);
        assert!(agent.health_check().await);

        let reply = agent.process_request(json!({"item": "milk"})).await.unwrap();
        assert_eq!(reply, json!({"success": true, "echo": {"got": {"item": "milk"}}}));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let (mut agent, _) = agent(Probe::default());
        agent.initialize().await.unwrap();

        let err = agent.use_tool("deal_finder", json!({})).await.unwrap_err();
        match err {
            Error::Agent(AgentError::ToolUnavailable { tool, available }) => {
                assert_eq!(tool, "deal_finder");
                assert_eq!(available, vec!["broken", "echo"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_error_result_surfaces() {
        let (mut agent, _) = agent(Probe::default());
        agent.initialize().await.unwrap();

        let err = agent.use_tool("broken", json!({})).await.unwrap_err();
        match err {
            Error::Agent(AgentError::ToolReportedError { tool, message }) => {
                assert_eq!(tool, "broken");
                assert!(message.contains("out of stock"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_required_tools_fails_initialize() {
        let (mut agent, transport) = agent(Probe {
            kind: Some(AgentKind::Shopping),
            ..Probe::default()
        });

        let err = agent.initialize().await.unwrap_err();
        match err {
            Error::Agent(AgentError::MissingTools { agent, missing, .. }) => {
                assert_eq!(agent, "bucky");
                assert!(missing.contains(&"pantry_tracker".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!agent.is_initialized());
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_shuts_down_on_success() {
        let (mut agent, transport) = agent(Probe::default());

        let value = agent
            .scoped(|agent| Box::pin(async move { agent.use_tool("echo", json!({"n": 1})).await }))
            .await
            .unwrap();

        assert_eq!(value, json!({"got": {"n": 1}}));
        assert!(!agent.is_initialized());
        assert_eq!(agent.behavior().shut_down.load(Ordering::SeqCst), 1);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_shuts_down_on_error() {
        let (mut agent, transport) = agent(Probe::default());

        let result: Result<Value> = agent
            .scoped(|agent| Box::pin(async move { agent.use_tool("nope", json!({})).await }))
            .await;

        assert!(matches!(result, Err(Error::Agent(AgentError::ToolUnavailable { .. }))));
        assert!(!agent.is_initialized());
        assert_eq!(agent.behavior().shut_down.load(Ordering::SeqCst), 1);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_shuts_down_on_panic() {
        let (mut agent, transport) = agent(Probe::default());

        let outcome = AssertUnwindSafe(agent.scoped(|_agent| {
            Box::pin(async move {
                if true {
                    panic!("body blew up");
                }
                Ok(())
            })
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert!(!agent.is_initialized());
        assert_eq!(agent.behavior().shut_down.load(Ordering::SeqCst), 1);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_initialize_is_noop() {
        let (mut agent, transport) = agent(Probe::default());
        agent.shutdown().await.unwrap();
        assert_eq!(agent.behavior().shut_down.load(Ordering::SeqCst), 0);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_validate_tools_report() {
        let available = vec!["meal_planner".to_string(), "recipe_engine".to_string()];
        let report = AgentKind::Nutrition.validate_tools(&available);

        assert!(!report.valid);
        assert_eq!(report.missing, vec!["nutrition_analyzer"]);
        assert_eq!(report.required.len(), 3);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["available"], json!(["meal_planner", "recipe_engine"]));
    }

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!("scheduler".parse::<AgentKind>().unwrap(), AgentKind::Scheduler);
        assert_eq!(AgentKind::Scheduler.required_tools().len(), 5);
        assert!("gardening".parse::<AgentKind>().is_err());
    }
}
