//! Tandem Daemon - multi-party task coordinator
//!
//! `tandemd` hosts one coordinator behind a REST API:
//! - Identity registration and credential checks
//! - Protocol declarations and task lifecycle
//! - Long-polled assignments and entry reads
//! - Periodic collection of finished tasks

use clap::Parser;
use tandem_daemon::error::{DaemonError, DaemonResult};
use tandem_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tandem Daemon CLI
#[derive(Parser)]
#[command(name = "tandemd")]
#[command(about = "Tandem Daemon - multi-party task coordinator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TANDEM_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "TANDEM_LISTEN_ADDR")]
    listen: Option<String>,

    /// Endpoint handed out to registered identities
    #[arg(long, env = "TANDEM_PUBLIC_ENDPOINT")]
    public_endpoint: Option<String>,

    /// Log level
    #[arg(long, env = "TANDEM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "TANDEM_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(endpoint) = cli.public_endpoint {
        config.server.public_endpoint = Some(endpoint);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        endpoint = %config.server.endpoint(),
        "Starting tandemd"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
