//! tcprelay - transparent TCP relay with fan-out
//!
//! Accepts clients on a local port and forwards their traffic to every
//! configured remote endpoint, relaying responses back.

use std::io::IsTerminal;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tcprelay::{
    config::{options, ConfigManager},
    prompt, ConnectionManager, ProxyConfig, RemoteEndpoint, ShutdownCoordinator, TracingLog,
};

/// How long sessions get to unwind after shutdown
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// CLI arguments for tcprelay
#[derive(Parser, Debug)]
#[command(name = "tcprelay")]
#[command(about = "Transparent TCP relay with fan-out to multiple remote endpoints")]
#[command(version)]
#[command(long_about = "
tcprelay - transparent TCP relay

Accepts client connections on a local port and forwards every byte to all
configured remote endpoints. Whatever any remote sends back is relayed to
the client. When any leg of a session closes, the whole session closes.

Configuration priority (highest to lowest):
1. Command-line arguments (including --set name=value)
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  TCPRELAY_REMOTES        - Comma separated host:port list
  TCPRELAY_LOCAL_PORT     - Local port to listen on
  TCPRELAY_BIND_ADDR      - Local address to bind
  TCPRELAY_BUFFER_SIZE    - Relay buffer size in bytes
  TCPRELAY_TIMEOUT        - Connect/read/write timeout (e.g. 30, 5m; 0 disables)
  TCPRELAY_LOG_LEVEL      - Log level (trace, debug, info, warn, error)
  TCPRELAY_LOG_DATA       - Hex dump relayed data (true/false)
  TCPRELAY_DATA_LOG_FILE  - File receiving hex dumps of relayed data
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "tcprelay.toml")]
    pub config: PathBuf,

    /// Remote endpoint as host:port (repeatable)
    #[arg(short, long = "remote", value_name = "HOST:PORT")]
    pub remotes: Vec<RemoteEndpoint>,

    /// Local port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Local address to bind
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Relay buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Connect/read/write timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Hex dump every relayed chunk
    #[arg(long)]
    pub log_data: bool,

    /// Append hex dumps of relayed data to this file
    #[arg(long, value_name = "PATH")]
    pub data_log_file: Option<PathBuf>,

    /// Set any option by name, e.g. --set buffer_size=4096 (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub assignments: Vec<String>,

    /// Prompt for remote endpoints and local port
    #[arg(short, long)]
    pub interactive: bool,

    /// Write the effective configuration to the config file
    #[arg(long)]
    pub save_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = resolve_config(&args)?;

    init_tracing(&args, &config)?;

    info!(
        "Starting tcprelay v{} - transparent TCP relay",
        env!("CARGO_PKG_VERSION")
    );

    if config.remotes.is_empty() {
        bail!(
            "at least one remote endpoint is required (use --remote host:port or --interactive)"
        );
    }

    if args.save_config {
        ConfigManager::save_to_file(&config, &args.config)?;
    }

    if args.validate_config {
        log_summary(&config, "Configuration is valid");
        return Ok(());
    }
    log_summary(&config, "Configuration loaded successfully");

    let log = Arc::new(
        TracingLog::from_config(&config.logging).context("Failed to set up data logging")?,
    );
    let config = Arc::new(config);

    let shutdown_coordinator = ShutdownCoordinator::new();
    let manager = ConnectionManager::bind(Arc::clone(&config), log).await?;
    info!("Listening on {}", manager.local_addr());
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    let signals = shutdown_coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = signals.listen_for_signals().await {
            error!("Error setting up signal handlers: {}", e);
            signals.trigger();
        }
    });

    manager.run(shutdown_coordinator.subscribe()).await?;

    info!("Initiating graceful shutdown...");
    manager.wait_for_sessions(SESSION_DRAIN_TIMEOUT).await;
    info!("Server shutdown complete");

    Ok(())
}

/// Defaults, environment, settings file, CLI overrides, then prompts
fn resolve_config(args: &CliArgs) -> Result<ProxyConfig> {
    let mut config = ConfigManager::load_with_env(&args.config)?;

    config.merge_with_cli_args(
        &args.remotes,
        args.bind,
        args.port,
        args.buffer_size,
        args.timeout,
    );
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.log_data {
        config.logging.log_data = true;
    }
    if let Some(path) = &args.data_log_file {
        config.logging.data_log_file = Some(path.clone());
    }
    for assignment in &args.assignments {
        options::apply_assignment(&mut config, assignment)?;
    }

    let stdin = std::io::stdin();
    if args.interactive || (config.remotes.is_empty() && stdin.is_terminal()) {
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        config.remotes = prompt::prompt_for_remotes(&mut input, &mut output)?;
        if args.interactive {
            config.local_port =
                prompt::prompt_for_port(&mut input, &mut output, config.local_port)?;
            if !args.save_config
                && prompt::confirm(
                    &mut input,
                    &mut output,
                    &format!("Save these settings to {}?", args.config.display()),
                    false,
                )?
            {
                ConfigManager::save_to_file(&config, &args.config)?;
            }
        }
    }

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn log_summary(config: &ProxyConfig, headline: &str) {
    info!("{}", headline);
    info!("  Listen address: {}", config.listen_addr());
    for remote in &config.remotes {
        info!("  Remote endpoint: {}", remote);
    }
    info!("  Buffer size: {} bytes", config.buffer_size);
    match config.io_timeout() {
        Some(timeout) => info!("  Timeout: {:?}", timeout),
        None => info!("  Timeout: disabled"),
    }
    info!(
        "  Data logging: {}",
        if config.logging.log_data {
            "enabled"
        } else {
            "disabled"
        }
    );
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &ProxyConfig) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(std::io::stdout().is_terminal()),
        )
        .with(env_filter)
        .init();

    Ok(())
}
