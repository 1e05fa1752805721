//! Per-identity client handle

use std::sync::Arc;
use std::time::Duration;
use tandem_core::CoordinatorApi;
use tandem_types::{
    Assignment, Credential, Endpoint, Entry, EntryKey, Identity, ProtocolSpec, Result,
    RunTaskRequest, Task, TaskId, TaskStatus, UserId,
};

/// An identity together with the coordinator it talks to.
///
/// Cloning is cheap; clones share the transport.
#[derive(Clone)]
pub struct Node {
    identity: Identity,
    api: Arc<dyn CoordinatorApi>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("user_id", &self.identity.user_id)
            .field("endpoint", &self.identity.endpoint)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(identity: Identity, api: Arc<dyn CoordinatorApi>) -> Self {
        Self { identity, api }
    }

    /// Register a fresh identity with `api` and bind it.
    pub async fn register(api: Arc<dyn CoordinatorApi>, user_id: Option<UserId>) -> Result<Self> {
        let identity = api.register(user_id).await?;
        tracing::debug!(user_id = %identity.user_id, "Registered node");
        Ok(Self::new(identity, api))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.identity.endpoint
    }

    pub fn credential(&self) -> &Credential {
        &self.identity.credential
    }

    /// `<protocol>:<task_id>:<name>`
    pub fn entry_key(&self, protocol: &str, task_id: TaskId, name: &str) -> Result<EntryKey> {
        EntryKey::new(protocol, task_id, name)
    }

    pub async fn resolve(&self, user_id: &UserId) -> Result<Endpoint> {
        self.api.resolve(self.credential(), user_id).await
    }

    pub async fn declare_protocol(&self, spec: ProtocolSpec) -> Result<bool> {
        self.api.declare_protocol(self.credential(), spec).await
    }

    /// Start a task with this node as initiator.
    pub async fn run_task(&self, request: RunTaskRequest) -> Result<TaskId> {
        self.api.run_task(self.credential(), request).await
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        self.api.get_task(self.credential(), task_id).await
    }

    pub async fn wait_task(&self, task_id: TaskId, timeout: Option<Duration>) -> Result<TaskStatus> {
        self.api.wait_task(self.credential(), task_id, timeout).await
    }

    pub async fn report_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> Result<TaskStatus> {
        self.api
            .report_status(self.credential(), task_id, status, reason)
            .await
    }

    pub async fn heartbeat(&self, task_id: TaskId) -> Result<()> {
        self.api.heartbeat(self.credential(), task_id).await
    }

    pub async fn claim_assignment(&self, timeout: Option<Duration>) -> Result<Option<Assignment>> {
        self.api.claim_assignment(self.credential(), timeout).await
    }

    pub async fn write_entry(&self, key: &EntryKey, value: impl Into<Vec<u8>>) -> Result<Entry> {
        self.api
            .write_entry(self.credential(), key, value.into())
            .await
    }

    /// Blocks until the key is written or `timeout` elapses.
    pub async fn read_entry(&self, key: &EntryKey, timeout: Option<Duration>) -> Result<Entry> {
        self.api.read_entry(self.credential(), key, timeout).await
    }

    pub async fn try_read_entry(&self, key: &EntryKey) -> Result<Option<Entry>> {
        self.api.try_read_entry(self.credential(), key).await
    }

    pub async fn list_entries(&self, task_id: TaskId) -> Result<Vec<EntryKey>> {
        self.api.list_entries(self.credential(), task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::Coordinator;
    use tandem_types::{CoordinationError, Participant};

    async fn pair() -> (Node, Node) {
        let api: Arc<dyn CoordinatorApi> = Arc::new(Coordinator::in_memory());
        let alice = Node::register(Arc::clone(&api), None).await.unwrap();
        let bob = Node::register(api, None).await.unwrap();
        alice
            .declare_protocol(
                ProtocolSpec::new("transfer")
                    .with_role("sender")
                    .with_role("receiver"),
            )
            .await
            .unwrap();
        (alice, bob)
    }

    #[tokio::test]
    async fn test_node_acts_as_its_identity() {
        let (alice, bob) = pair().await;
        let task_id = alice
            .run_task(RunTaskRequest::new(
                "transfer",
                Vec::new(),
                vec![
                    Participant::new(alice.user_id().clone(), "sender"),
                    Participant::new(bob.user_id().clone(), "receiver"),
                ],
            ))
            .await
            .unwrap();

        let task = bob.get_task(task_id).await.unwrap();
        assert_eq!(&task.initiator, alice.user_id());

        let key = bob.entry_key("transfer", task_id, "ack").unwrap();
        let entry = bob.write_entry(&key, "ok").await.unwrap();
        assert_eq!(&entry.written_by, bob.user_id());
        assert_eq!(
            alice.try_read_entry(&key).await.unwrap().map(|e| e.value),
            Some(b"ok".to_vec())
        );
        assert_eq!(alice.resolve(bob.user_id()).await.unwrap(), *bob.endpoint());
    }

    #[tokio::test]
    async fn test_entry_key_rejects_colons() {
        let (alice, _) = pair().await;
        assert!(matches!(
            alice.entry_key("transfer", TaskId::generate(), "a:b"),
            Err(CoordinationError::InvalidEntryKey(_))
        ));
    }
}
