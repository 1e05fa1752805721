//! Configuration for tandemd

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tandem_core::CoordinatorConfig;
use tandem_tasks::TaskManagerConfig;
use tandem_types::Endpoint;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Task lifecycle configuration
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Endpoint handed out to registered identities. Defaults to
    /// `http://<listen_addr>`.
    #[serde(default)]
    pub public_endpoint: Option<String>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Longest a single long-poll request may block, in seconds
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7070)),
            public_endpoint: None,
            enable_cors: true,
            max_wait_secs: default_max_wait(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    pub fn endpoint(&self) -> Endpoint {
        match &self.public_endpoint {
            Some(endpoint) => Endpoint::new(endpoint.clone()),
            None => Endpoint::new(format!("http://{}", self.listen_addr)),
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Where identities are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryBackendConfig {
    /// In-memory, session-scoped credentials
    #[default]
    Ephemeral,

    /// JSON file, long-lived credentials
    File {
        /// Registry file path
        path: PathBuf,
    },
}

/// Identity registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackendConfig,

    /// Hex-encoded 32-byte Ed25519 seed. Random when unset, in which case
    /// credentials do not survive a restart.
    #[serde(default)]
    pub signing_seed: Option<String>,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_durable_ttl")]
    pub durable_ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackendConfig::default(),
            signing_seed: None,
            session_ttl_secs: default_session_ttl(),
            durable_ttl_secs: default_durable_ttl(),
        }
    }
}

impl RegistryConfig {
    pub fn lifetimes(&self) -> tandem_registry::RegistryConfig {
        tandem_registry::RegistryConfig {
            session_lifetime: Duration::from_secs(self.session_ttl_secs),
            durable_lifetime: Duration::from_secs(self.durable_ttl_secs),
        }
    }
}

/// Task lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Default participant liveness timeout in seconds
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    /// How long finished tasks and their entries are kept, in seconds
    #[serde(default = "default_gc_horizon")]
    pub gc_horizon_secs: u64,

    /// Bound on a synchronous run_task, in seconds. Unbounded when unset.
    #[serde(default)]
    pub sync_wait_timeout_secs: Option<u64>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: default_liveness_timeout(),
            gc_horizon_secs: default_gc_horizon(),
            sync_wait_timeout_secs: None,
        }
    }
}

impl TasksConfig {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            tasks: TaskManagerConfig {
                default_liveness_timeout: Duration::from_secs(self.liveness_timeout_secs),
                gc_horizon: Duration::from_secs(self.gc_horizon_secs),
            },
            sync_wait_timeout: self.sync_wait_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Garbage-collection interval in seconds
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gc_interval_secs: default_gc_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_max_wait() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    16 * 1024 * 1024
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

fn default_durable_ttl() -> u64 {
    30 * 24 * 60 * 60
}

fn default_liveness_timeout() -> u64 {
    60
}

fn default_gc_horizon() -> u64 {
    600
}

fn default_gc_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `TANDEM_*` environment variables (`TANDEM_SERVER__MAX_WAIT_SECS=10`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with TANDEM_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("TANDEM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 7070);
        assert!(matches!(
            config.registry.backend,
            RegistryBackendConfig::Ephemeral
        ));
        assert_eq!(
            config.server.endpoint(),
            Endpoint::new("http://127.0.0.1:7070")
        );
    }

    #[test]
    fn test_tasks_defaults() {
        let coordinator = TasksConfig::default().coordinator_config();
        assert_eq!(
            coordinator.tasks.default_liveness_timeout,
            Duration::from_secs(60)
        );
        assert!(coordinator.sync_wait_timeout.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandemd.toml");
        std::fs::write(
            &path,
            r#"
[server]
listen_addr = "0.0.0.0:9000"
public_endpoint = "http://coordinator.internal:9000"

[registry.backend]
type = "file"
path = "/var/lib/tandem/identities.json"

[tasks]
liveness_timeout_secs = 5
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(
            config.server.endpoint().as_str(),
            "http://coordinator.internal:9000"
        );
        assert!(matches!(
            config.registry.backend,
            RegistryBackendConfig::File { .. }
        ));
        assert_eq!(config.tasks.liveness_timeout_secs, 5);
        assert_eq!(config.tasks.gc_horizon_secs, 600);
    }
}
