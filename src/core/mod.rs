//! Core logic shared by the MCP server and the CLI.
//!
//! A tool call flows through [`params`] validation, [`script`] rendering,
//! the [`executor`] and the [`parser`]; [`dispatcher`] ties them together.

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod mcp;
pub mod params;
pub mod parser;
pub mod record;
pub mod script;

pub use command::Command;
pub use dispatcher::{Dispatcher, Response};
pub use error::{DispatchError, ExecutionError, Result};
pub use executor::{AutomationExecutor, OsascriptRunner, ScriptRunner};
pub use record::{Area, DailyOverview, Project, Status, Todo};
pub use script::{ScriptEngine, ScriptText};
