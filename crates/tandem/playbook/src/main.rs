//! Tandem playbook agent
//!
//! Connects to a coordinator, declares the protocols of a playbook file and
//! plays every assignment handed to this identity until stopped.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tandem_node::{Connector as _, Node, RemoteConnector, RemoteCoordinator};
use tandem_playbook::context::{ENV_CORE_ADDR, ENV_JWT, ENV_PLAYBOOK_CONFIG};
use tandem_playbook::{AgentConfig, PackageSpec, ParticipantAgent};
use tandem_types::{Credential, Endpoint, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tandem playbook agent CLI
#[derive(Parser)]
#[command(name = "tandem-playbook")]
#[command(about = "Play the roles of a playbook file for one identity", long_about = None)]
#[command(version)]
struct Cli {
    /// Coordinator address
    #[arg(long, env = ENV_CORE_ADDR)]
    addr: String,

    /// Credential to act under. A fresh identity is registered when unset.
    #[arg(long, env = ENV_JWT)]
    jwt: Option<String>,

    /// Identifier to register under when no credential is given
    #[arg(long)]
    user_id: Option<String>,

    /// Playbook file
    #[arg(short, long, env = ENV_PLAYBOOK_CONFIG)]
    config: PathBuf,

    /// Root of the per-task work directories
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Longest single wait for an assignment, in seconds
    #[arg(long, default_value_t = 30)]
    claim_timeout: u64,

    /// Log level
    #[arg(long, env = "TANDEM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "TANDEM_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
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

    let package = PackageSpec::load(&cli.config)
        .await
        .with_context(|| format!("loading playbook {}", cli.config.display()))?;

    let endpoint = Endpoint::new(cli.addr.clone());
    let connector: Arc<RemoteConnector> = Arc::new(RemoteConnector::new());
    let node = match cli.jwt {
        Some(jwt) => connector.connect(&endpoint, Credential::new(jwt))?,
        None => {
            let api = Arc::new(RemoteCoordinator::new(&endpoint)?);
            let user_id = cli.user_id.map(UserId::parse).transpose()?;
            Node::register(api, user_id).await?
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        user_id = %node.user_id(),
        coordinator = %endpoint,
        protocols = package.protocols.len(),
        "Starting tandem-playbook"
    );

    let config = AgentConfig {
        work_root: cli.work_dir,
        config_path: Some(cli.config),
        claim_timeout: Duration::from_secs(cli.claim_timeout),
    };
    let agent = Arc::new(ParticipantAgent::from_package(node, &package, connector, config));
    agent.run(shutdown_signal()).await?;

    tracing::info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
