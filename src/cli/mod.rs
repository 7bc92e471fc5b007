//! CLI command parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Things MCP - drive Things 3 from MCP agents.
#[derive(Parser)]
#[command(name = "things-mcp")]
#[command(about = "MCP server that manages Things 3 to-dos, projects and areas")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use this configuration file instead of the default one.
    #[arg(short, long, global = true, env = "THINGS_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdin/stdout (the default).
    Serve,

    /// Print the tool catalogue as JSON.
    Tools,

    /// Render a tool's script without running it.
    Script {
        /// Tool name, e.g. `add_todo`.
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Run one tool and print its response.
    Call {
        /// Tool name, e.g. `list_todos`.
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Print the structured response as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration.
    Show,

    /// Show the configuration file path.
    Path,
}
