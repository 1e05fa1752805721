//! The client-facing coordination surface

use async_trait::async_trait;
use std::time::Duration;
use tandem_types::{
    Assignment, Credential, Endpoint, Entry, EntryKey, Identity, ProtocolSpec, Result,
    RunTaskRequest, Task, TaskId, TaskStatus, UserId,
};

/// Everything a participant can ask of a coordinator.
///
/// Registration is the only call without a credential; every other call is
/// authenticated and acts on behalf of the credential's subject.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// Register a fresh identity, under `user_id` if given
    async fn register(&self, user_id: Option<UserId>) -> Result<Identity>;

    /// Endpoint through which `user_id` is reached
    async fn resolve(&self, credential: &Credential, user_id: &UserId) -> Result<Endpoint>;

    /// Declare a protocol; `true` if it was not known before
    async fn declare_protocol(&self, credential: &Credential, spec: ProtocolSpec) -> Result<bool>;

    /// Start a task; the caller becomes its initiator
    async fn run_task(&self, credential: &Credential, request: RunTaskRequest) -> Result<TaskId>;

    async fn get_task(&self, credential: &Credential, task_id: TaskId) -> Result<Task>;

    /// Block until the task is terminal
    async fn wait_task(
        &self,
        credential: &Credential,
        task_id: TaskId,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus>;

    /// Report the caller's own outcome; returns the task status after it
    async fn report_status(
        &self,
        credential: &Credential,
        task_id: TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> Result<TaskStatus>;

    async fn heartbeat(&self, credential: &Credential, task_id: TaskId) -> Result<()>;

    /// Next assignment for the caller, `None` on timeout
    async fn claim_assignment(
        &self,
        credential: &Credential,
        timeout: Option<Duration>,
    ) -> Result<Option<Assignment>>;

    async fn write_entry(&self, credential: &Credential, key: &EntryKey, value: Vec<u8>) -> Result<Entry>;

    /// Read an entry, waiting for it to be written
    async fn read_entry(
        &self,
        credential: &Credential,
        key: &EntryKey,
        timeout: Option<Duration>,
    ) -> Result<Entry>;

    async fn try_read_entry(&self, credential: &Credential, key: &EntryKey) -> Result<Option<Entry>>;

    async fn list_entries(&self, credential: &Credential, task_id: TaskId) -> Result<Vec<EntryKey>>;
}
