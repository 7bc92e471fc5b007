//! Model Context Protocol (MCP) server implementation
//!
//! Exposes the command catalogue as MCP tools over stdio.

mod protocol;
mod server;

pub use protocol::{LATEST_PROTOCOL_VERSION, McpError, McpRequest, McpResponse, McpToolResult};
pub use server::McpServer;
