//! HTTP transport against `tandemd`

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tandem_core::CoordinatorApi;
use tandem_types::wire::{
    DeclareProtocolResponse, RegisterRequest, ReportStatusRequest, ResolveResponse,
    TaskStatusResponse, WaitTaskRequest,
};
use tandem_types::{
    Assignment, CoordinationError, Credential, Endpoint, Entry, EntryKey, Identity, ProtocolSpec,
    Result, RunTaskRequest, Task, TaskId, TaskStatus, UserId,
};
use tokio::time::Instant;

/// Default timeout for calls that do not block server-side
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest single long-poll request; longer waits are split.
const DEFAULT_POLL_CHUNK: Duration = Duration::from_secs(25);

/// Added to a long-poll's own limit for the HTTP round trip.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Error body written by `tandemd`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_error(self) -> CoordinationError {
        let detail = match self.details {
            Some(serde_json::Value::String(detail)) => detail,
            _ => self.error,
        };
        CoordinationError::from_code(&self.code, detail)
    }
}

/// [`CoordinatorApi`] over HTTP.
///
/// Long waits (`wait_task`, `read_entry`, `claim_assignment`) are issued as a
/// series of bounded requests until the caller's own timeout runs out, so a
/// server-side wait limit never surfaces as a spurious `Timeout`.
pub struct RemoteCoordinator {
    client: Client,
    base_url: Url,
    poll_chunk: Duration,
}

impl RemoteCoordinator {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        let base_url = Url::parse(endpoint.as_str()).map_err(|e| {
            CoordinationError::InvalidRequest(format!("invalid endpoint {endpoint}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CoordinationError::InvalidRequest(format!(
                "endpoint {endpoint} is not an HTTP address"
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url,
            poll_chunk: DEFAULT_POLL_CHUNK,
        })
    }

    /// Override the per-request long-poll bound.
    pub fn with_poll_chunk(mut self, chunk: Duration) -> Self {
        self.poll_chunk = chunk.max(Duration::from_millis(1));
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoordinationError::InvalidRequest("endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder, credential: &Credential) -> RequestBuilder {
        builder.bearer_auth(credential.as_str())
    }

    // ========== Single requests ==========

    async fn wait_task_once(
        &self,
        credential: &Credential,
        task_id: TaskId,
        limit: Duration,
    ) -> Result<TaskStatus> {
        let id = task_id.to_string();
        let url = self.url(&["tasks", &id, "wait"])?;
        let body = WaitTaskRequest {
            timeout_ms: Some(millis(limit)),
        };
        let response = self
            .authorized(self.client.post(url), credential)
            .json(&body)
            .timeout(limit + POLL_SLACK)
            .send()
            .await
            .map_err(transport)?;
        let status: TaskStatusResponse = decode(response).await?;
        Ok(status.status)
    }

    async fn read_entry_once(
        &self,
        credential: &Credential,
        key: &EntryKey,
        limit: Duration,
    ) -> Result<Entry> {
        let key_text = key.to_string();
        let url = self.url(&["entries", &key_text])?;
        let response = self
            .authorized(self.client.get(url), credential)
            .query(&[("wait", "true".to_string()), ("timeout_ms", millis(limit).to_string())])
            .timeout(limit + POLL_SLACK)
            .send()
            .await
            .map_err(transport)?;
        let entry: Option<Entry> = decode(response).await?;
        entry.ok_or_else(|| CoordinationError::Timeout(format!("entry {key} was not written")))
    }

    async fn claim_assignment_once(
        &self,
        credential: &Credential,
        limit: Duration,
    ) -> Result<Option<Assignment>> {
        let url = self.url(&["assignments", "next"])?;
        let response = self
            .authorized(self.client.get(url), credential)
            .query(&[("timeout_ms", millis(limit))])
            .timeout(limit + POLL_SLACK)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

/// Caller-side deadline over a series of long-poll requests.
struct PollDeadline {
    deadline: Option<Instant>,
    chunk: Duration,
}

impl PollDeadline {
    fn new(timeout: Option<Duration>, chunk: Duration) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            chunk,
        }
    }

    fn next_limit(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.chunk),
            None => self.chunk,
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[async_trait]
impl CoordinatorApi for RemoteCoordinator {
    async fn register(&self, user_id: Option<UserId>) -> Result<Identity> {
        let url = self.url(&["identities"])?;
        let response = self
            .client
            .post(url)
            .json(&RegisterRequest { user_id })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn resolve(&self, credential: &Credential, user_id: &UserId) -> Result<Endpoint> {
        let url = self.url(&["identities", user_id.as_str(), "endpoint"])?;
        let response = self
            .authorized(self.client.get(url), credential)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let resolved: ResolveResponse = decode(response).await?;
        Ok(resolved.endpoint)
    }

    async fn declare_protocol(&self, credential: &Credential, spec: ProtocolSpec) -> Result<bool> {
        let url = self.url(&["protocols"])?;
        let response = self
            .authorized(self.client.post(url), credential)
            .json(&spec)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let declared: DeclareProtocolResponse = decode(response).await?;
        Ok(declared.created)
    }

    async fn run_task(&self, credential: &Credential, request: RunTaskRequest) -> Result<TaskId> {
        let url = self.url(&["tasks"])?;
        // A synchronous run is held open by the server until the task ends.
        let builder = self
            .authorized(self.client.post(url), credential)
            .json(&request);
        let builder = if request.options.synchronous {
            builder
        } else {
            builder.timeout(REQUEST_TIMEOUT)
        };
        let response = builder.send().await.map_err(transport)?;
        let started: TaskStatusResponse = decode(response).await?;
        Ok(started.task_id)
    }

    async fn get_task(&self, credential: &Credential, task_id: TaskId) -> Result<Task> {
        let id = task_id.to_string();
        let url = self.url(&["tasks", &id])?;
        let response = self
            .authorized(self.client.get(url), credential)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn wait_task(
        &self,
        credential: &Credential,
        task_id: TaskId,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus> {
        let poll = PollDeadline::new(timeout, self.poll_chunk);
        loop {
            match self
                .wait_task_once(credential, task_id, poll.next_limit())
                .await
            {
                Err(e) if e.is_timeout() && !poll.expired() => continue,
                result => return result,
            }
        }
    }

    async fn report_status(
        &self,
        credential: &Credential,
        task_id: TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> Result<TaskStatus> {
        let id = task_id.to_string();
        let url = self.url(&["tasks", &id, "status"])?;
        let response = self
            .authorized(self.client.post(url), credential)
            .json(&ReportStatusRequest { status, reason })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let reported: TaskStatusResponse = decode(response).await?;
        Ok(reported.status)
    }

    async fn heartbeat(&self, credential: &Credential, task_id: TaskId) -> Result<()> {
        let id = task_id.to_string();
        let url = self.url(&["tasks", &id, "heartbeat"])?;
        let response = self
            .authorized(self.client.post(url), credential)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        expect_empty(response).await
    }

    async fn claim_assignment(
        &self,
        credential: &Credential,
        timeout: Option<Duration>,
    ) -> Result<Option<Assignment>> {
        let poll = PollDeadline::new(timeout, self.poll_chunk);
        loop {
            match self
                .claim_assignment_once(credential, poll.next_limit())
                .await?
            {
                None if !poll.expired() => continue,
                assignment => return Ok(assignment),
            }
        }
    }

    async fn write_entry(&self, credential: &Credential, key: &EntryKey, value: Vec<u8>) -> Result<Entry> {
        let key_text = key.to_string();
        let url = self.url(&["entries", &key_text])?;
        let response = self
            .authorized(self.client.put(url), credential)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(value)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn read_entry(
        &self,
        credential: &Credential,
        key: &EntryKey,
        timeout: Option<Duration>,
    ) -> Result<Entry> {
        let poll = PollDeadline::new(timeout, self.poll_chunk);
        loop {
            match self
                .read_entry_once(credential, key, poll.next_limit())
                .await
            {
                Err(e) if e.is_timeout() && !poll.expired() => continue,
                result => return result,
            }
        }
    }

    async fn try_read_entry(&self, credential: &Credential, key: &EntryKey) -> Result<Option<Entry>> {
        let key_text = key.to_string();
        let url = self.url(&["entries", &key_text])?;
        let response = self
            .authorized(self.client.get(url), credential)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn list_entries(&self, credential: &Credential, task_id: TaskId) -> Result<Vec<EntryKey>> {
        let id = task_id.to_string();
        let url = self.url(&["tasks", &id, "entries"])?;
        let response = self
            .authorized(self.client.get(url), credential)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(error: reqwest::Error) -> CoordinationError {
    CoordinationError::Transport(error.to_string())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn error_from(response: Response) -> CoordinationError {
    let status = response.status();
    match response.bytes().await {
        Ok(body) => match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(error) => error.into_error(),
            Err(_) => CoordinationError::Transport(format!(
                "HTTP {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )),
        },
        Err(e) => transport(e),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        response.json().await.map_err(transport)
    } else {
        Err(error_from(response).await)
    }
}

async fn expect_empty(response: Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from(response).await)
    }
}
