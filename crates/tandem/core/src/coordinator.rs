//! In-process coordinator

use crate::api::CoordinatorApi;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tandem_registry::Registry;
use tandem_store::EntryStore;
use tandem_tasks::{TaskManager, TaskManagerConfig};
use tandem_types::{
    Assignment, CoordinationError, Credential, Endpoint, Entry, EntryKey, Identity, ProtocolSpec,
    Result, RunTaskRequest, Task, TaskId, TaskStatus, UserId,
};
use uuid::Uuid;

/// Coordinator configuration
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub tasks: TaskManagerConfig,
    /// Upper bound on how long a synchronous `run_task` blocks. `None`
    /// blocks until the task is terminal.
    pub sync_wait_timeout: Option<Duration>,
}

/// Registry, entry store and task manager behind one authenticated surface.
pub struct Coordinator {
    registry: Arc<Registry>,
    store: Arc<EntryStore>,
    tasks: Arc<TaskManager>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(registry: Registry, config: CoordinatorConfig) -> Self {
        let store = Arc::new(EntryStore::new());
        let tasks = Arc::new(TaskManager::new(Arc::clone(&store), config.tasks.clone()));
        Self {
            registry: Arc::new(registry),
            store,
            tasks,
            config,
        }
    }

    /// Ephemeral coordinator reachable only from this process.
    pub fn in_memory() -> Self {
        Self::in_memory_with(CoordinatorConfig::default())
    }

    pub fn in_memory_with(config: CoordinatorConfig) -> Self {
        let endpoint = Endpoint::new(format!("inproc://{}", Uuid::new_v4()));
        Self::new(Registry::ephemeral(endpoint), config)
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.registry.endpoint()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    async fn authenticate(&self, credential: &Credential) -> Result<UserId> {
        self.registry.authenticate(credential).await
    }

    /// Drop finished tasks past the configured horizon.
    pub fn collect_garbage(&self) -> usize {
        self.tasks.collect_garbage(tokio::time::Instant::now())
    }
}

#[async_trait]
impl CoordinatorApi for Coordinator {
    async fn register(&self, user_id: Option<UserId>) -> Result<Identity> {
        self.registry.register(user_id).await
    }

    async fn resolve(&self, credential: &Credential, user_id: &UserId) -> Result<Endpoint> {
        self.authenticate(credential).await?;
        self.registry.resolve(user_id).await
    }

    async fn declare_protocol(&self, credential: &Credential, spec: ProtocolSpec) -> Result<bool> {
        self.authenticate(credential).await?;
        self.tasks.declare_protocol(spec)
    }

    async fn run_task(&self, credential: &Credential, request: RunTaskRequest) -> Result<TaskId> {
        let initiator = self.authenticate(credential).await?;
        for participant in &request.participants {
            if !self.registry.is_registered(&participant.user_id).await? {
                return Err(CoordinationError::UnknownIdentity(
                    participant.user_id.to_string(),
                ));
            }
        }

        let synchronous = request.options.synchronous;
        let task_id = self.tasks.run_task(&initiator, request).await?;

        if synchronous {
            match self
                .tasks
                .wait_task(task_id, &initiator, self.config.sync_wait_timeout)
                .await
            {
                Ok(status) => {
                    tracing::debug!(task_id = %task_id, status = %status, "Synchronous run finished");
                }
                Err(CoordinationError::Timeout(_)) => {
                    tracing::warn!(task_id = %task_id, "Synchronous run still going, returning early");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(task_id)
    }

    async fn get_task(&self, credential: &Credential, task_id: TaskId) -> Result<Task> {
        let caller = self.authenticate(credential).await?;
        self.tasks.get_task(task_id, &caller)
    }

    async fn wait_task(
        &self,
        credential: &Credential,
        task_id: TaskId,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus> {
        let caller = self.authenticate(credential).await?;
        self.tasks.wait_task(task_id, &caller, timeout).await
    }

    async fn report_status(
        &self,
        credential: &Credential,
        task_id: TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> Result<TaskStatus> {
        let caller = self.authenticate(credential).await?;
        self.tasks.report_status(task_id, &caller, status, reason)
    }

    async fn heartbeat(&self, credential: &Credential, task_id: TaskId) -> Result<()> {
        let caller = self.authenticate(credential).await?;
        self.tasks.heartbeat(task_id, &caller)
    }

    async fn claim_assignment(
        &self,
        credential: &Credential,
        timeout: Option<Duration>,
    ) -> Result<Option<Assignment>> {
        let caller = self.authenticate(credential).await?;
        self.tasks.claim_assignment(&caller, timeout).await
    }

    async fn write_entry(&self, credential: &Credential, key: &EntryKey, value: Vec<u8>) -> Result<Entry> {
        let caller = self.authenticate(credential).await?;
        self.store.write(key.task_id(), key, value, &caller)
    }

    async fn read_entry(
        &self,
        credential: &Credential,
        key: &EntryKey,
        timeout: Option<Duration>,
    ) -> Result<Entry> {
        let caller = self.authenticate(credential).await?;
        self.store.read(key.task_id(), key, &caller, timeout).await
    }

    async fn try_read_entry(&self, credential: &Credential, key: &EntryKey) -> Result<Option<Entry>> {
        let caller = self.authenticate(credential).await?;
        self.store.try_read(key.task_id(), key, &caller)
    }

    async fn list_entries(&self, credential: &Credential, task_id: TaskId) -> Result<Vec<EntryKey>> {
        let caller = self.authenticate(credential).await?;
        self.store.list_keys(task_id, &caller)
    }
}
