//! TaskRelay - cooperative relay game server
//!
//! CLI entry point for serving sessions and inspecting the task catalog.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use taskrelay::cli::{Cli, Command, OutputFormat, get_log_path};
use taskrelay::config::Config;
use taskrelay::net;
use taskrelay::rooms::RoomRegistry;

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_stderr: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_path = get_log_path();
        let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), cli.log_stderr)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind } => {
            debug!(?bind, "main: matched Serve command");
            cmd_serve(config, bind).await
        }
        Command::Catalog { format } => {
            debug!(?format, "main: matched Catalog command");
            cmd_catalog(&config, format)
        }
    }
}

/// Run the server until interrupted
async fn cmd_serve(mut config: Config, bind: Option<String>) -> Result<()> {
    debug!(?bind, "cmd_serve: called");
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    let catalog = config.catalog()?;
    let listener = net::bind(&config.server.bind).await?;
    let local_addr = listener.local_addr()?;
    let registry = RoomRegistry::new(config.game.clone(), catalog, config.server.channel_buffer);

    println!("{} listening on {}", "TaskRelay".bold(), local_addr.to_string().green());
    println!("Logs are written to: {}", get_log_path().display());

    tokio::select! {
        result = net::serve(listener, registry.clone(), config.server.clone()) => {
            result.context("Listener stopped")?;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Interrupted, shutting down");
            println!("Shutting down");
        }
    }

    registry.shutdown_all().await;
    Ok(())
}

/// Print the task catalog
fn cmd_catalog(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_catalog: called");
    let catalog = config.catalog()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(catalog.kinds()).context("Failed to serialize catalog")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("{:<18} {:<26} {}", "KIND".bold(), "CONTROL".bold(), "FLAGS".bold());
            for kind in catalog.kinds() {
                let mut flags = Vec::new();
                if kind.multiplayer {
                    flags.push("multiplayer".cyan().to_string());
                }
                if kind.filler {
                    flags.push("filler".dimmed().to_string());
                }
                println!("{:<18} {:<26} {}", kind.name, kind.control, flags.join(", "));
            }
            println!("\n{} kinds", catalog.len());
        }
    }
    Ok(())
}
