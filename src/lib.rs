//! Things MCP - a Model Context Protocol server for Things 3.
//!
//! Agents call a fixed catalogue of tools. Each call is validated, rendered
//! into an AppleScript, run through `osascript` one at a time, and the
//! output is parsed back into typed records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  ┌─────────────┐
//! │  MCP stdio  │  │     CLI     │
//! └──────┬──────┘  └──────┬──────┘
//!        └────────┬───────┘
//!          ┌──────┴──────┐
//!          │ Dispatcher  │  params → script → executor → parser
//!          └─────────────┘
//! ```

pub mod build_info;
pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
pub use core::dispatcher::{Ack, Dispatcher, Response};
pub use core::error::{DispatchError, ExecutionError};
pub use core::mcp::McpServer;
