//! MCP stdio server.
//!
//! Newline-delimited JSON-RPC 2.0 on stdin/stdout. Each request is handled
//! on its own task so `ping` and `tools/list` stay responsive while a tool
//! call waits for the automation bridge; a single writer keeps stdout
//! lines whole.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::protocol::{
    InitializeResult, JSONRPC_VERSION, McpError, McpRequest, McpResponse, McpToolResult,
};
use crate::build_info;
use crate::core::command::Command;
use crate::core::dispatcher::Dispatcher;
use crate::core::error::DispatchError;

/// Serves the command catalogue as MCP tools.
#[derive(Debug, Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve on the process's stdin and stdout until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns error if reading stdin or writing stdout fails
    pub async fn run_stdio(&self) -> anyhow::Result<()> {
        tracing::info!(version = %build_info::version_string(), "stdio server started");
        let result = self
            .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await;
        tracing::info!("stdio server stopped");
        result
    }

    /// Serve one connection until the reader reaches end of input.
    ///
    /// Requests still in flight at end of input are answered before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns error if reading or writing the transport fails
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let read = async move {
            let mut reader = reader;
            let mut tasks = JoinSet::new();
            let mut buf = Vec::new();

            let result = loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break Ok(()),
                    Ok(_) => {}
                    Err(e) => break Err(e),
                }

                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim().to_string(),
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable request line");
                        let _ = tx.send(parse_failure(e));
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }

                let server = self.clone();
                let tx = tx.clone();
                tasks.spawn(async move {
                    if let Some(response) = server.handle_message(&line).await {
                        // Fails only if the writer already stopped on an I/O error.
                        let _ = tx.send(response);
                    }
                });
            };
            drop(tx);

            // Accepted requests are answered even when reading failed.
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "request task failed");
                }
            }
            result.map_err(anyhow::Error::from)
        };

        let write = async move {
            while let Some(message) = rx.recv().await {
                writer.write_all(message.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            anyhow::Ok(())
        };

        let (read, write) = tokio::join!(read, write);
        read?;
        write
    }

    /// Handle one line; `None` when no response is due.
    pub async fn handle_message(&self, line: &str) -> Option<String> {
        let response = self.respond(line).await?;
        serde_json::to_string(&response)
            .inspect_err(|e| tracing::error!(error = %e, "failed to encode response"))
            .ok()
    }

    async fn respond(&self, line: &str) -> Option<McpResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return Some(McpResponse::failure(Value::Null, McpError::parse_error(e))),
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: McpRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => return Some(McpResponse::failure(id, McpError::invalid_request(e))),
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(McpResponse::failure(
                id,
                McpError::invalid_request(format!("unsupported jsonrpc version {:?}", request.jsonrpc)),
            ));
        }

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }

        tracing::debug!(method = %request.method, "request received");
        let response = match request.method.as_str() {
            "initialize" => {
                let requested = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str);
                McpResponse::success(id, to_json(&InitializeResult::negotiate(requested)))
            }
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => {
                let tools: Vec<_> = Command::ALL.iter().map(|c| c.definition()).collect();
                McpResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => match self.call_tool(request.params).await {
                Ok(result) => McpResponse::success(id, to_json(&result)),
                Err(error) => McpResponse::failure(id, error),
            },
            other => McpResponse::failure(id, McpError::method_not_found(other)),
        };
        Some(response)
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<McpToolResult, McpError> {
        let params = params.unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::invalid_params("missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.dispatcher.dispatch(name, &arguments).await {
            Ok(response) => Ok(McpToolResult::success(response.to_text(), to_json(&response))),
            Err(DispatchError::UnknownCommand(name)) => {
                Err(McpError::invalid_params(format!("unknown tool: {name}")))
            }
            Err(e) => {
                tracing::info!(tool = %name, kind = e.kind(), error = %e, "tool call failed");
                let structured = json!({ "error": { "kind": e.kind(), "message": e.to_string() } });
                Ok(McpToolResult::error(e.to_string(), structured))
            }
        }
    }
}

fn parse_failure(detail: impl std::fmt::Display) -> String {
    let response = McpResponse::failure(Value::Null, McpError::parse_error(detail));
    serde_json::to_string(&response).unwrap_or_default()
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode value");
        Value::Null
    })
}
