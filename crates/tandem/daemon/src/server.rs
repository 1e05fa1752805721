//! Server setup and lifecycle management

use crate::api::router::create_router_with;
use crate::api::state::AppState;
use crate::config::{DaemonConfig, RegistryBackendConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::scheduler::Scheduler;
use std::sync::Arc;
use tandem_core::Coordinator;
use tandem_registry::{EphemeralBackend, FileBackend, Registry, RegistryBackend, TokenIssuer};
use tokio::net::TcpListener;

/// Tandem daemon server
pub struct Server {
    config: DaemonConfig,
    coordinator: Arc<Coordinator>,
    scheduler: Arc<Scheduler>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let registry = build_registry(&config).await?;
        let coordinator = Arc::new(Coordinator::new(
            registry,
            config.tasks.coordinator_config(),
        ));
        let scheduler = Scheduler::new(config.scheduler.clone(), Arc::clone(&coordinator));

        Ok(Self {
            config,
            coordinator,
            scheduler,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(Arc::clone(&self.coordinator), self.config.server.max_wait());
        let app = create_router_with(
            state,
            self.config.server.enable_cors,
            self.config.server.max_body_size,
        );

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Tandem daemon listening on {}", addr);
        tracing::info!(
            endpoint = %self.coordinator.endpoint(),
            registry = self.coordinator.registry().backend_kind(),
            key_id = self.coordinator.registry().key_id(),
            "Coordinator ready"
        );

        // Start scheduler in background
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move {
            scheduler.start().await;
        });

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Tandem daemon shutting down");

        self.scheduler.stop();

        Ok(())
    }
}

async fn build_registry(config: &DaemonConfig) -> DaemonResult<Registry> {
    let issuer = match &config.registry.signing_seed {
        Some(seed) => TokenIssuer::from_hex_seed(seed)?,
        None => {
            if matches!(config.registry.backend, RegistryBackendConfig::File { .. }) {
                tracing::warn!("No signing seed configured; durable credentials will not survive a restart");
            }
            TokenIssuer::generate()
        }
    };

    let backend: Arc<dyn RegistryBackend> = match &config.registry.backend {
        RegistryBackendConfig::Ephemeral => Arc::new(EphemeralBackend::new()),
        RegistryBackendConfig::File { path } => Arc::new(FileBackend::open(path).await?),
    };

    Ok(Registry::new(
        backend,
        issuer,
        config.server.endpoint(),
        config.registry.lifetimes(),
    ))
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::CoordinatorApi;

    #[tokio::test]
    async fn test_file_registry_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::default();
        config.registry.backend = RegistryBackendConfig::File {
            path: dir.path().join("identities.json"),
        };
        config.registry.signing_seed = Some("07".repeat(32));

        let server = Server::new(config.clone()).await.unwrap();
        let identity = server.coordinator().register(None).await.unwrap();
        assert_eq!(server.coordinator().registry().backend_kind(), "file");
        drop(server);

        let restarted = Server::new(config).await.unwrap();
        assert_eq!(
            restarted
                .coordinator()
                .resolve(&identity.credential, &identity.user_id)
                .await
                .unwrap(),
            identity.endpoint
        );
    }

    #[tokio::test]
    async fn test_bad_seed_rejected() {
        let mut config = DaemonConfig::default();
        config.registry.signing_seed = Some("not-hex".into());
        assert!(matches!(
            Server::new(config).await,
            Err(DaemonError::Coordination(_))
        ));
    }
}
