//! Main entry point for the Tank Relay service
//!
//! This is the production entry point that loads configuration, initializes
//! logging and runs the relay server until a shutdown signal arrives.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tank_relay::config::AppConfig;
use tank_relay::server::{AppState, RelayServer};
use tokio::signal;
use tracing::{error, info, warn};

/// Tank Relay - passphrase rendezvous and WebSocket relay
#[derive(Parser)]
#[command(
    name = "tank-relay",
    version,
    about = "Pairs two game clients by passphrase and relays their messages",
    long_about = "Tank Relay is a WebSocket rendezvous service: two clients that send the \
                 same verb-noun passphrase are placed in a lobby, told when their opponent \
                 arrives, and then have every message forwarded verbatim to each other."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Bind host override
    #[arg(long, value_name = "HOST", help = "Override the interface to bind")]
    host: Option<String>,

    /// Port override
    #[arg(short, long, value_name = "PORT", help = "Override the listen port")]
    port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Log the effective settings once at startup
fn display_startup_banner(config: &AppConfig) {
    info!("Tank Relay");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Listen: {}", config.bind_address());
    info!("   Max lobbies: {:?}", config.relay.max_lobbies);
    info!("   Join timeout: {:?}", config.relay.join_timeout());
    info!("   Idle timeout: {:?}", config.relay.idle_timeout());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Build the configuration from a file or the environment, then apply flags
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Flags take precedence over file and environment
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(host) = &args.host {
        config.service.host = host.clone();
    }

    if let Some(port) = args.port {
        config.service.port = port;
    }

    tank_relay::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Nothing is logged before this point
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        display_startup_banner(&config);
        info!("Configuration is valid, exiting (dry run)");
        return Ok(());
    }

    display_startup_banner(&config);

    let shutdown_timeout = config.shutdown_timeout();
    let app_state = AppState::new(config)?;
    let server = Arc::new(RelayServer::new(app_state));

    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to start relay: {:#}", e);
            std::process::exit(1);
        }
    };

    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    info!("Tank Relay is running");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    server.stop();

    match tokio::time::timeout(shutdown_timeout, server_task).await {
        Ok(Ok(Ok(()))) => info!("Graceful shutdown completed successfully"),
        Ok(Ok(Err(e))) => error!("Relay server exited with error: {:#}", e),
        Ok(Err(e)) => error!("Relay server task failed: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Tank Relay stopped");
    Ok(())
}
