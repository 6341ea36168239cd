//! MCP client: the agent-side connection to one server.
//!
//! State machine: disconnected, then connected with an empty capability
//! snapshot, then connected with a populated snapshot. The snapshot is
//! refreshed only by an explicit [`McpClient::refresh_capabilities`] call;
//! check [`CapabilitySnapshot::refreshed_at`] to judge how stale it is.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::mcp::protocol::*;
use crate::mcp::server::McpServer;
use crate::mcp::transport::{ClientTransport, HttpTransport, LocalTransport};
use crate::VERSION;

/// Point-in-time cache of a server's tools and resources.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySnapshot {
    pub tools: HashMap<String, Tool>,
    pub resources: HashMap<String, Resource>,
    /// When both lists were last fetched. `None` until the first full refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl CapabilitySnapshot {
    /// Cached tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cached resource URIs, sorted.
    pub fn resource_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.resources.keys().cloned().collect();
        uris.sort();
        uris
    }
}

/// Unwrapped result of a tool call.
///
/// `value` is the decoded JSON of the first text block, or
/// `{"result": <raw text>}` when that text is not JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutput {
    fn from_result(result: Value) -> Self {
        let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
        let text = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str);

        let value = match text {
            Some(text) => {
                serde_json::from_str(text).unwrap_or_else(|_| json!({ "result": text }))
            }
            None => result,
        };

        Self { value, is_error }
    }

    /// Message carried by an error result.
    pub fn error_message(&self) -> String {
        match &self.value {
            Value::Object(map) => match map.get("result") {
                Some(Value::String(text)) if map.len() == 1 => text.clone(),
                _ => self.value.to_string(),
            },
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// MCP client.
pub struct McpClient {
    transport: Arc<dyn ClientTransport>,
    config: ClientConfig,
    connected: bool,
    server: Option<InitializeResult>,
    capabilities: CapabilitySnapshot,
}

impl McpClient {
    /// Create a client over any transport.
    pub fn new(transport: Arc<dyn ClientTransport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            connected: false,
            server: None,
            capabilities: CapabilitySnapshot::default(),
        }
    }

    /// Create a client talking HTTP to `config.server_url`.
    pub fn http(config: ClientConfig) -> Self {
        let transport = HttpTransport::new(&config.server_url, config.request_timeout);
        Self::new(Arc::new(transport), config)
    }

    /// Create a client bound to an in-process server.
    pub fn local(server: Arc<McpServer>, config: ClientConfig) -> Self {
        Self::new(Arc::new(LocalTransport::new(server)), config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The cached capability snapshot.
    pub fn capabilities(&self) -> &CapabilitySnapshot {
        &self.capabilities
    }

    /// What the server returned from `initialize`.
    pub fn server_capabilities(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    /// Open the transport, run the `initialize` handshake and populate the
    /// capability snapshot. Fails if the transport cannot be opened or the
    /// handshake returns an error.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        self.transport.open().await?;
        match self.initialize().await {
            Ok(result) => {
                info!(
                    "Connected to MCP server {} v{} at {}",
                    result.server_info.name, result.server_info.version, self.config.server_url
                );
                self.server = Some(result);
                self.connected = true;
            }
            Err(e) => {
                error!("MCP handshake with {} failed: {}", self.config.server_url, e);
                if let Err(close_err) = self.transport.close().await {
                    warn!("Failed to close transport after handshake error: {}", close_err);
                }
                return Err(e);
            }
        }

        self.refresh_capabilities().await
    }

    /// Close the transport. Later calls fail with `NotConnected` until the
    /// client reconnects.
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.server = None;
        self.transport.close().await?;
        info!("Disconnected from MCP server at {}", self.config.server_url);
        Ok(())
    }

    async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: MCP_VERSION.to_string(),
            client_info: ClientInfo {
                name: self.config.agent_name.clone(),
                version: VERSION.to_string(),
            },
        };
        self.rpc("initialize", Some(serde_json::to_value(params)?), None)
            .await
    }

    /// Refetch tools and resources. A failing list is logged and leaves the
    /// previous entries for that half of the snapshot in place.
    /// `refreshed_at` only moves when both lists were refetched.
    pub async fn refresh_capabilities(&mut self) -> Result<()> {
        self.ensure_connected()?;

        let tools_ok = match self.list_tools().await {
            Ok(tools) => {
                self.capabilities.tools = tools.into_iter().map(|t| (t.name.clone(), t)).collect();
                info!("Available tools: {:?}", self.capabilities.tool_names());
                true
            }
            Err(e) => {
                warn!("Could not fetch tools: {}", e);
                false
            }
        };

        let resources_ok = match self.list_resources().await {
            Ok(resources) => {
                self.capabilities.resources =
                    resources.into_iter().map(|r| (r.uri.clone(), r)).collect();
                info!("Available resources: {:?}", self.capabilities.resource_uris());
                true
            }
            Err(e) => {
                warn!("Could not fetch resources: {}", e);
                false
            }
        };

        if tools_ok && resources_ok {
            self.capabilities.refreshed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Call a tool. Unknown names fail locally without a round trip.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        self.ensure_connected()?;
        if !self.capabilities.tools.contains_key(name) {
            return Err(Error::UnknownTool {
                name: name.to_string(),
                available: self.capabilities.tool_names(),
            });
        }

        info!("Calling tool: {}", name);
        debug!("Arguments for {}: {}", name, arguments);

        let timeout_ms = self.config.request_timeout.as_millis() as u64;
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
            meta: Some(CallMeta {
                timeout_ms: Some(timeout_ms),
            }),
        };

        let result: Value = self
            .rpc("tools/call", Some(serde_json::to_value(params)?), Some(timeout_ms))
            .await?;
        Ok(ToolOutput::from_result(result))
    }

    /// Read a resource's text. Unknown URIs fail locally without a round trip.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        self.ensure_connected()?;
        if !self.capabilities.resources.contains_key(uri) {
            return Err(Error::UnknownResource {
                uri: uri.to_string(),
                available: self.capabilities.resource_uris(),
            });
        }

        info!("Reading resource: {}", uri);
        let result: ReadResourceResult = self
            .rpc("resources/read", Some(json!({ "uri": uri })), None)
            .await?;

        Ok(result
            .contents
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default())
    }

    /// Live `tools/list`, bypassing the snapshot.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.rpc("tools/list", None, None).await?;
        Ok(result.tools)
    }

    /// Live `resources/list`, bypassing the snapshot.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let result: ListResourcesResult = self.rpc("resources/list", None, None).await?;
        Ok(result.resources)
    }

    /// Best-effort liveness check. Never fails.
    pub async fn ping(&self) -> bool {
        if !self.connected {
            return false;
        }
        match self.initialize().await {
            Ok(_) => true,
            Err(e) => {
                error!("Ping failed: {}", e);
                false
            }
        }
    }

    /// Cached input schema for a tool.
    pub fn tool_schema(&self, name: &str) -> Option<&Value> {
        self.capabilities.tools.get(name).map(|t| &t.input_schema)
    }

    pub fn is_tool_available(&self, name: &str) -> bool {
        self.capabilities.tools.contains_key(name)
    }

    pub fn is_resource_available(&self, uri: &str) -> bool {
        self.capabilities.resources.contains_key(uri)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// One round trip: send, check the echoed id, unwrap `result` or turn
    /// `error` into a client error.
    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        requested_timeout_ms: Option<u64>,
    ) -> Result<T> {
        let request = McpRequest::new(method, params);
        let id = request.id.clone();
        let limit = self.config.request_timeout;

        let response = match tokio::time::timeout(limit, self.transport.send(request)).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(Error::DeadlineExceeded {
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        };

        if response.id != id {
            return Err(Error::McpProtocol(format!(
                "Response id {:?} does not match request id {:?}",
                response.id, id
            )));
        }

        if let Some(err) = response.error {
            let timeout_ms = err
                .data
                .as_ref()
                .and_then(|d| d.get("timeoutMs"))
                .and_then(Value::as_u64)
                .or(requested_timeout_ms);
            return Err(Error::from_rpc(err.code, err.message, timeout_ms));
        }

        let result = response
            .result
            .ok_or_else(|| Error::McpProtocol(format!("Empty response to {}", method)))?;
        Ok(serde_json::from_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::ToolRegistry;
    use crate::mcp::resources::{ResourceRegistry, StaticReader};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts every request that reaches the server.
    struct CountingTransport {
        inner: LocalTransport,
        sent: AtomicUsize,
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl ClientTransport for CountingTransport {
        async fn open(&self) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, request: McpRequest) -> Result<McpResponse> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.inner.send(request).await
        }

        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails `tools/list` and `resources/list` while `fail_lists` is set.
    struct FlakyListTransport {
        inner: LocalTransport,
        fail_lists: AtomicBool,
    }

    #[async_trait]
    impl ClientTransport for FlakyListTransport {
        async fn send(&self, request: McpRequest) -> Result<McpResponse> {
            if self.fail_lists.load(Ordering::SeqCst) && request.method.ends_with("/list") {
                return Err(Error::Internal("list unavailable".to_string()));
            }
            self.inner.send(request).await
        }
    }

    /// Answers every request with a canned response.
    struct CannedTransport(McpResponse);

    #[async_trait]
    impl ClientTransport for CannedTransport {
        async fn send(&self, _request: McpRequest) -> Result<McpResponse> {
            Ok(self.0.clone())
        }
    }

    fn demo_server() -> Arc<McpServer> {
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
                name: "plain".to_string(),
                description: "Returns a bare string".to_string(),
                input_schema: json!({"type": "object"}),
            },
            |_args, _ctx| async { Ok(json!("not an object")) },
        );
        tools.register_fn(
            Tool {
                name: "slow".to_string(),
                description: "Sleeps".to_string(),
                input_schema: json!({"type": "object"}),
            },
            |_args, _ctx| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            },
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

    fn counting(server: Arc<McpServer>) -> Arc<CountingTransport> {
        Arc::new(CountingTransport {
            inner: LocalTransport::new(server),
            sent: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_connect_populates_snapshot() {
        let mut client = McpClient::local(demo_server(), ClientConfig::default());
        assert!(client.capabilities().refreshed_at.is_none());

        client.connect().await.unwrap();

        assert!(client.is_connected());
        assert_eq!(client.capabilities().tool_names(), vec!["echo", "plain", "slow"]);
        assert_eq!(client.capabilities().resource_uris(), vec!["demo://x"]);
        assert!(client.capabilities().refreshed_at.is_some());
        assert_eq!(client.server_capabilities().unwrap().server_info.name, "demo");
        assert_eq!(client.tool_schema("echo"), Some(&json!({"type": "object"})));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_timestamp() {
        let transport = Arc::new(FlakyListTransport {
            inner: LocalTransport::new(demo_server()),
            fail_lists: AtomicBool::new(false),
        });
        let mut client = McpClient::new(transport.clone(), ClientConfig::default());
        client.connect().await.unwrap();
        let first = client.capabilities().refreshed_at;
        assert!(first.is_some());

        transport.fail_lists.store(true, Ordering::SeqCst);
        client.refresh_capabilities().await.unwrap();

        assert_eq!(client.capabilities().refreshed_at, first);
        assert_eq!(client.capabilities().tool_names(), vec!["echo", "plain", "slow"]);
        assert_eq!(client.capabilities().resource_uris(), vec!["demo://x"]);

        transport.fail_lists.store(false, Ordering::SeqCst);
        client.refresh_capabilities().await.unwrap();
        assert!(client.capabilities().refreshed_at >= first);
    }

    #[tokio::test]
    async fn test_call_tool_decodes_json() {
        let mut client = McpClient::local(demo_server(), ClientConfig::default());
        client.connect().await.unwrap();

        let out = client.call_tool("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(out, ToolOutput { value: json!({"got": {"x": 1}}), is_error: false });

        let out = client.call_tool("plain", json!({})).await.unwrap();
        assert_eq!(out.value, json!("not an object"));
    }

    #[tokio::test]
    async fn test_preflight_sends_nothing() {
        let transport = counting(demo_server());
        let mut client = McpClient::new(transport.clone(), ClientConfig::default());
        client.connect().await.unwrap();
        let before = transport.sent.load(Ordering::SeqCst);

        let err = client.call_tool("nonexistent", json!({})).await.unwrap_err();
        match err {
            Error::UnknownTool { name, available } => {
                assert_eq!(name, "nonexistent");
                assert_eq!(available, vec!["echo", "plain", "slow"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = client.read_resource("demo://nope").await.unwrap_err();
        assert!(matches!(err, Error::UnknownResource { .. }));

        assert_eq!(transport.sent.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_read_resource() {
        let mut client = McpClient::local(demo_server(), ClientConfig::default());
        client.connect().await.unwrap();
        assert_eq!(client.read_resource("demo://x").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_disconnect_then_calls_fail() {
        let transport = counting(demo_server());
        let mut client = McpClient::new(transport.clone(), ClientConfig::default());
        client.connect().await.unwrap();
        client.disconnect().await.unwrap();

        assert!(!client.is_connected());
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            client.call_tool("echo", json!({})).await,
            Err(Error::NotConnected)
        ));
        assert!(!client.ping().await);

        client.connect().await.unwrap();
        assert!(client.ping().await);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_not_auto_refreshed() {
        let server = demo_server();
        let mut client = McpClient::local(server.clone(), ClientConfig::default());
        client.connect().await.unwrap();
        let stamp = client.capabilities().refreshed_at;

        client.call_tool("echo", json!({})).await.unwrap();
        assert_eq!(client.capabilities().refreshed_at, stamp);

        client.refresh_capabilities().await.unwrap();
        assert!(client.capabilities().refreshed_at >= stamp);
    }

    #[tokio::test]
    async fn test_handshake_error_fails_connect() {
        let response = McpResponse::failure(None, RpcError::internal("boom"));
        let mut client = McpClient::new(Arc::new(CannedTransport(response)), ClientConfig::default());

        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_mismatched_id_is_rejected() {
        let response = McpResponse::success(Some(RequestId::String("other".to_string())), json!({}));
        let mut client = McpClient::new(Arc::new(CannedTransport(response)), ClientConfig::default());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, Error::McpProtocol(_)));
    }

    #[tokio::test]
    async fn test_local_timeout_is_deadline_exceeded() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(50));
        let mut client = McpClient::local(demo_server(), config);
        client.connect().await.unwrap();

        let err = client.call_tool("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { timeout_ms: 50 }));
    }

    #[test]
    fn test_tool_output_fallbacks() {
        let raw = json!({"content": [{"type": "text", "text": "plain words"}], "isError": true});
        let out = ToolOutput::from_result(raw);
        assert_eq!(out.value, json!({"result": "plain words"}));
        assert!(out.is_error);
        assert_eq!(out.error_message(), "plain words");

        let empty = json!({"content": [], "isError": false});
        let out = ToolOutput::from_result(empty.clone());
        assert_eq!(out.value, empty);
    }
}
