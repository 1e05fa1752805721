//! Task records, participants and the lifecycle state machine.

use crate::encoding::base64_bytes;
use crate::ids::{TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One participant of a task and the role it plays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub role: String,
}

impl Participant {
    pub fn new(user_id: UserId, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
        }
    }
}

/// Task lifecycle: `Created -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Edges of the lifecycle graph.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A status the task has held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: TaskStatus,
    pub at: DateTime<Utc>,
}

/// A participant's own outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantReport {
    pub user_id: UserId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Why a task ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// A participant reported failure.
    ParticipantFailed {
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A participant stopped reporting and was presumed dead.
    LivenessTimeout { user_id: UserId },
}

impl FailureReason {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::ParticipantFailed { user_id, .. } | Self::LivenessTimeout { user_id } => user_id,
        }
    }
}

/// The record of one task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub protocol_name: String,
    pub initiator: UserId,
    pub participants: Vec<Participant>,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub reports: Vec<ParticipantReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl Task {
    /// A fresh record in `Created`.
    pub fn new(
        protocol_name: impl Into<String>,
        initiator: UserId,
        participants: Vec<Participant>,
        payload: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::generate(),
            protocol_name: protocol_name.into(),
            initiator,
            participants,
            payload,
            status: TaskStatus::Created,
            created_at: now,
            updated_at: now,
            transitions: vec![Transition {
                status: TaskStatus::Created,
                at: now,
            }],
            reports: Vec::new(),
            failure: None,
        }
    }

    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| &p.user_id == user_id)
    }

    pub fn role_of(&self, user_id: &UserId) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| &p.user_id == user_id)
            .map(|p| p.role.as_str())
    }

    /// Participants and the initiator may observe a task.
    pub fn can_observe(&self, user_id: &UserId) -> bool {
        &self.initiator == user_id || self.is_participant(user_id)
    }

    pub fn report_of(&self, user_id: &UserId) -> Option<&ParticipantReport> {
        self.reports.iter().find(|r| &r.user_id == user_id)
    }

    /// Participants that have not reported yet.
    pub fn pending_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(|p| self.report_of(&p.user_id).is_none())
    }
}

/// Options of one `run_task` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Block the initiator until the task is terminal.
    #[serde(default)]
    pub synchronous: bool,
    /// Override of the coordinator's default liveness timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_timeout_ms: Option<u64>,
}

impl RunOptions {
    pub fn synchronous() -> Self {
        Self {
            synchronous: true,
            ..Self::default()
        }
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn liveness_timeout(&self) -> Option<Duration> {
        self.liveness_timeout_ms.map(Duration::from_millis)
    }
}

/// Everything needed to start a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTaskRequest {
    pub protocol_name: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub options: RunOptions,
}

impl RunTaskRequest {
    pub fn new(
        protocol_name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        participants: Vec<Participant>,
    ) -> Self {
        Self {
            protocol_name: protocol_name.into(),
            payload: payload.into(),
            participants,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

/// The work order delivered to one participant once its role is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub protocol_name: String,
    pub role: String,
    pub participants: Vec<Participant>,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub liveness_timeout_ms: u64,
}

impl Assignment {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}
