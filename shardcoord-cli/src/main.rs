use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{debug, info};

use shardcoord_config::{ConfigLoader, ShardcoordConfig};
use shardcoord_ipc::ControlMessage;
use shardcoord_logging::{init_logging_from_config, init_simple_tracing};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use commands::config::{handle_config_generate, handle_config_show, handle_config_validate};

/// Load configuration from file or environment
fn load_config(config_path: Option<&Path>) -> Result<ShardcoordConfig> {
    if let Some(path) = config_path {
        if !path.exists() {
            return Err(anyhow!("Configuration file not found: {:?}", path));
        }
    }

    ConfigLoader::new()
        .load(config_path)
        .with_context(|| match config_path {
            Some(path) => format!("Failed to load configuration from {:?}", path),
            None => "Failed to load configuration from environment".to_string(),
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config generation and validation must work without a usable configuration
    if let Some(Commands::Config { config_cmd }) = &cli.command {
        match config_cmd {
            ConfigCommands::Validate { config_file } => {
                init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
                return handle_config_validate(config_file);
            }
            ConfigCommands::Generate { output, force } => {
                init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
                return handle_config_generate(output, *force);
            }
            ConfigCommands::Show { .. } => {}
        }
    }

    let config = load_config(cli.config.as_deref())?;
    let _logging_guard = init_logging_from_config(&config.logging, cli.log_level.as_deref())
        .context("Failed to initialize logging")?;
    debug!("Loaded configuration: {:?}", config);

    match cli.command {
        None | Some(Commands::Run) => {
            info!("shardcoord {} starting", env!("CARGO_PKG_VERSION"));
            commands::run::run_command(config).await
        }
        Some(Commands::Status { format }) => {
            commands::status::status_command(&config, &format).await
        }
        Some(Commands::Restart { shard }) => {
            commands::control::send_command(&config, ControlMessage::Restart { shard_id: shard })
                .await
        }
        Some(Commands::Stop { shard }) => {
            commands::control::send_command(&config, ControlMessage::Stop { shard_id: shard })
                .await
        }
        Some(Commands::Die) => {
            commands::control::send_command(&config, ControlMessage::Shutdown).await
        }
        Some(Commands::Config { config_cmd }) => match config_cmd {
            ConfigCommands::Show { format } => handle_config_show(&config, &format),
            // Handled before configuration loading
            ConfigCommands::Validate { .. } | ConfigCommands::Generate { .. } => Ok(()),
        },
    }
}
