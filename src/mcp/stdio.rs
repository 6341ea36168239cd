//! Line-delimited transport: one JSON envelope per line in, one per line out.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, trace};

use crate::error::Result;
use crate::mcp::protocol::{error_codes, McpRequest, McpResponse, RpcError};
use crate::mcp::server::McpServer;

/// Serve requests read from `reader` until EOF, writing each response to
/// `writer`. Blank lines are skipped. An unparseable line gets a parse
/// error response with a null id.
pub async fn serve<R, W>(server: &McpServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let info = server.info();
    info!("Starting MCP server: {} v{} (stdio)", info.name, info.version);

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let trimmed = buf.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        trace!("Received: {}", String::from_utf8_lossy(trimmed));

        let response = match serde_json::from_slice::<McpRequest>(trimmed) {
            Ok(request) => server.handle(request).await,
            Err(e) => {
                error!("Failed to parse message: {}", e);
                McpResponse::failure(
                    None,
                    RpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e)),
                )
            }
        };

        let json = serde_json::to_string(&response)?;
        trace!("Sending: {}", json);
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    debug!("EOF on input, stopping transport");
    info!("MCP server stopped");
    Ok(())
}

/// Serve over the process's stdin and stdout.
pub async fn serve_stdio(server: &McpServer) -> Result<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::ToolRegistry;
    use crate::mcp::protocol::{RequestId, Tool};
    use crate::mcp::resources::ResourceRegistry;
    use serde_json::json;

    fn server() -> McpServer {
        let mut tools = ToolRegistry::new();
        tools.register_fn(
            Tool {
                name: "echo".to_string(),
                description: "Echo".to_string(),
                input_schema: json!({"type": "object"}),
            },
            |arguments, _ctx| async move { Ok(json!({ "got": arguments })) },
        );
        McpServer::new("stdio-test", tools, ResourceRegistry::new())
    }

    async fn next_response<R: AsyncBufReadExt + Unpin>(lines: &mut tokio::io::Lines<R>) -> McpResponse {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let server = server();
        let (client, server_side) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, mut client_write) = tokio::io::split(client);

        let serving = tokio::spawn(async move { serve(&server, server_read, server_write).await });

        client_write
            .write_all(b"{\"method\":\"tools/list\",\"id\":\"1\"}\n\nnot json\n{\"method\":\"tools/call\",\"params\":{\"name\":\"echo\",\"arguments\":{\"x\":1}},\"id\":2}\n")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let listed = next_response(&mut lines).await;
        assert_eq!(listed.id, Some(RequestId::String("1".to_string())));
        assert_eq!(listed.result.unwrap()["tools"][0]["name"], "echo");

        let garbage = next_response(&mut lines).await;
        assert!(garbage.id.is_none());
        assert_eq!(garbage.error.unwrap().code, error_codes::PARSE_ERROR);

        let called = next_response(&mut lines).await;
        assert_eq!(called.id, Some(RequestId::Number(2)));
        assert_eq!(called.result.unwrap()["isError"], false);

        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_survives_invalid_utf8() {
        let server = server();
        let input: &[u8] = b"\xff\xfe\n{\"method\":\"tools/list\",\"id\":\"2\"}\n";
        let mut out = Vec::new();

        serve(&server, input, &mut out).await.unwrap();

        let mut responses = out
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice::<McpResponse>(line).unwrap());

        let garbage = responses.next().unwrap();
        assert!(garbage.id.is_none());
        assert_eq!(garbage.error.unwrap().code, error_codes::PARSE_ERROR);

        let listed = responses.next().unwrap();
        assert_eq!(listed.id, Some(RequestId::String("2".to_string())));
        assert_eq!(listed.result.unwrap()["tools"][0]["name"], "echo");
        assert!(responses.next().is_none());
    }
}
