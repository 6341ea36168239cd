//! Client-side transports.
//!
//! A transport carries one request envelope to a server and brings back its
//! response. `HttpTransport` posts to `{server_url}/mcp`; `LocalTransport`
//! hands the envelope to an in-process [`McpServer`].

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mcp::protocol::{McpRequest, McpResponse};
use crate::mcp::server::McpServer;
use crate::VERSION;

/// Transport used by [`crate::mcp::client::McpClient`].
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Open the underlying connection.
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Send a request and wait for its response.
    async fn send(&self, request: McpRequest) -> Result<McpResponse>;

    /// Close the underlying connection.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// User agent string for MCP requests.
fn user_agent() -> String {
    format!("assistant-mcp/{} (rust)", VERSION)
}

/// HTTP transport. The session exists between `open` and `close`.
#[derive(Debug)]
pub struct HttpTransport {
    endpoint: String,
    timeout: Duration,
    session: RwLock<Option<Client>>,
}

impl HttpTransport {
    pub fn new(server_url: &str, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}/mcp", server_url.trim_end_matches('/')),
            timeout,
            session: RwLock::new(None),
        }
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self) -> Result<Client> {
        self.session
            .read()
            .map_err(|_| Error::Internal("HTTP session lock poisoned".to_string()))?
            .clone()
            .ok_or(Error::NotConnected)
    }

    fn set_session(&self, client: Option<Client>) -> Result<()> {
        *self
            .session
            .write()
            .map_err(|_| Error::Internal("HTTP session lock poisoned".to_string()))? = client;
        Ok(())
    }

    /// Handle the HTTP response, extracting errors.
    async fn handle_response(&self, response: Response) -> Result<McpResponse> {
        let status = response.status();

        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or("Unknown");
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), status_text, body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::McpProtocol(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl ClientTransport for HttpTransport {
    async fn open(&self) -> Result<()> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        self.set_session(Some(client))?;
        info!("Opened HTTP session to {}", self.endpoint);
        Ok(())
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        let client = self.client()?;
        debug!("POST {} method={}", self.endpoint, request.method);

        let response = client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::DeadlineExceeded {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    Error::Http(e)
                }
            })?;

        self.handle_response(response).await
    }

    async fn close(&self) -> Result<()> {
        self.set_session(None)?;
        info!("Closed HTTP session to {}", self.endpoint);
        Ok(())
    }
}

/// In-process transport. The envelope still goes through JSON in both
/// directions so the client sees exactly what a remote peer would send.
#[derive(Clone)]
pub struct LocalTransport {
    server: Arc<McpServer>,
}

impl LocalTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl ClientTransport for LocalTransport {
    async fn send(&self, request: McpRequest) -> Result<McpResponse> {
        let wire = serde_json::to_vec(&request)?;
        let response = self.server.handle(serde_json::from_slice(&wire)?).await;
        let wire = serde_json::to_vec(&response)?;
        Ok(serde_json::from_slice(&wire)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::ToolRegistry;
    use crate::mcp::resources::ResourceRegistry;

    #[test]
    fn test_http_endpoint_normalization() {
        let t = HttpTransport::new("http://localhost:8000/", Duration::from_secs(30));
        assert_eq!(t.endpoint(), "http://localhost:8000/mcp");

        let t = HttpTransport::new("http://localhost:8000", Duration::from_secs(30));
        assert_eq!(t.endpoint(), "http://localhost:8000/mcp");
    }

    #[tokio::test]
    async fn test_http_send_before_open_fails() {
        let t = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(1));
        let err = t.send(McpRequest::new("initialize", None)).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_http_close_drops_session() {
        let t = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(1));
        t.open().await.unwrap();
        assert!(t.client().is_ok());

        t.close().await.unwrap();
        assert!(matches!(t.client(), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_local_transport_echoes_id() {
        let server = Arc::new(McpServer::new("local", ToolRegistry::new(), ResourceRegistry::new()));
        let transport = LocalTransport::new(server);

        let request = McpRequest::new("tools/list", None);
        let id = request.id.clone();
        let response = transport.send(request).await.unwrap();

        assert_eq!(response.id, id);
        assert_eq!(response.result.unwrap()["tools"], serde_json::json!([]));
    }
}
