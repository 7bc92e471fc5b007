use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use things_mcp::{
    Config, Dispatcher, McpServer,
    cli::{Cli, Commands, ConfigCommands},
    core::command::Command,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; stdout carries protocol frames
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let dispatcher = Arc::new(Dispatcher::from_config(&config));
            McpServer::new(dispatcher).run_stdio().await?;
        }

        Commands::Tools => {
            let tools: Vec<_> = Command::ALL.iter().map(|c| c.definition()).collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }

        Commands::Script { tool, args } => {
            let args = parse_args(&args)?;
            let (_, script) = Dispatcher::from_config(&config).prepare(&tool, &args)?;
            println!("{script}");
        }

        Commands::Call { tool, args, json } => {
            let args = parse_args(&args)?;
            let response = Dispatcher::from_config(&config).dispatch(&tool, &args).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.to_text());
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

fn parse_args(args: &str) -> anyhow::Result<Value> {
    serde_json::from_str(args).map_err(|e| anyhow::anyhow!("--args is not valid JSON: {e}"))
}
