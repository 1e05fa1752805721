//! Turning an `(endpoint, credential)` pair into a [`Node`]

use crate::node::Node;
use crate::remote::RemoteCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{Coordinator, CoordinatorApi};
use tandem_types::{CoordinationError, Credential, Endpoint, Identity, Result};

/// Builds the [`Node`] a launched playbook program talks through.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint, credential: Credential) -> Result<Node>;
}

/// Connects to a coordinator running in the same process.
#[derive(Clone)]
pub struct LocalConnector {
    coordinator: Arc<Coordinator>,
}

impl LocalConnector {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

impl Connector for LocalConnector {
    fn connect(&self, endpoint: &Endpoint, credential: Credential) -> Result<Node> {
        if endpoint != self.coordinator.endpoint() {
            return Err(CoordinationError::Transport(format!(
                "no in-process coordinator at {endpoint}"
            )));
        }
        let identity = Identity::from_parts(endpoint.clone(), credential)?;
        let api: Arc<dyn CoordinatorApi> = self.coordinator.clone();
        Ok(Node::new(identity, api))
    }
}

/// Connects to `tandemd` over HTTP.
#[derive(Debug, Clone, Default)]
pub struct RemoteConnector {
    poll_chunk: Option<Duration>,
}

impl RemoteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_chunk(mut self, chunk: Duration) -> Self {
        self.poll_chunk = Some(chunk);
        self
    }
}

impl Connector for RemoteConnector {
    fn connect(&self, endpoint: &Endpoint, credential: Credential) -> Result<Node> {
        if endpoint.is_in_process() {
            return Err(CoordinationError::Transport(format!(
                "{endpoint} is only reachable from its own process"
            )));
        }
        let mut remote = RemoteCoordinator::new(endpoint)?;
        if let Some(chunk) = self.poll_chunk {
            remote = remote.with_poll_chunk(chunk);
        }
        let identity = Identity::from_parts(endpoint.clone(), credential)?;
        Ok(Node::new(identity, Arc::new(remote)))
    }
}
