//! Error taxonomy shared by every coordination service.
//!
//! Each variant carries a human-readable detail and maps to a stable wire
//! code so that remote callers can rebuild the same error on their side.

use thiserror::Error;

/// Errors surfaced by the registry, the entry store and the task lifecycle
/// manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The named user id is not registered.
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    /// A registration asked for a user id that is already taken.
    #[error("identity already registered: {0}")]
    DuplicateIdentity(String),

    /// Missing, invalid or expired credential, or the caller is not allowed
    /// to touch the named task or scope.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The participant set does not satisfy the protocol's role requirements.
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    /// The (scope, key) pair already holds a value.
    #[error("entry already exists: {0}")]
    EntryExists(String),

    /// A blocking call ran out of time. The underlying record is untouched.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The task already reached `Completed` or `Failed`.
    #[error("task already terminal: {0}")]
    TaskAlreadyTerminal(String),

    /// The participant missed its liveness deadline and was presumed dead.
    #[error("participant presumed dead: {0}")]
    LivenessTimeout(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A protocol was declared again with different role requirements.
    #[error("protocol conflict: {0}")]
    ProtocolConflict(String),

    #[error("invalid entry key: {0}")]
    InvalidEntryKey(String),

    /// A status report that the lifecycle does not allow.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A storage backend failed; nothing was applied.
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// The remote coordinator could not be reached or answered garbage.
    #[error("transport error: {0}")]
    Transport(String),
}

impl CoordinationError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownIdentity(_) => "UNKNOWN_IDENTITY",
            Self::DuplicateIdentity(_) => "DUPLICATE_IDENTITY",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidParticipants(_) => "INVALID_PARTICIPANTS",
            Self::EntryExists(_) => "ENTRY_EXISTS",
            Self::Timeout(_) => "TIMEOUT",
            Self::TaskAlreadyTerminal(_) => "TASK_ALREADY_TERMINAL",
            Self::LivenessTimeout(_) => "LIVENESS_TIMEOUT",
            Self::UnknownTask(_) => "UNKNOWN_TASK",
            Self::UnknownProtocol(_) => "UNKNOWN_PROTOCOL",
            Self::ProtocolConflict(_) => "PROTOCOL_CONFLICT",
            Self::InvalidEntryKey(_) => "INVALID_ENTRY_KEY",
            Self::InvalidStatus(_) => "INVALID_STATUS",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Backend(_) => "BACKEND_UNAVAILABLE",
            Self::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// The detail string without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::UnknownIdentity(d)
            | Self::DuplicateIdentity(d)
            | Self::Unauthorized(d)
            | Self::InvalidParticipants(d)
            | Self::EntryExists(d)
            | Self::Timeout(d)
            | Self::TaskAlreadyTerminal(d)
            | Self::LivenessTimeout(d)
            | Self::UnknownTask(d)
            | Self::UnknownProtocol(d)
            | Self::ProtocolConflict(d)
            | Self::InvalidEntryKey(d)
            | Self::InvalidStatus(d)
            | Self::InvalidRequest(d)
            | Self::Backend(d)
            | Self::Transport(d) => d,
        }
    }

    /// Rebuild an error from its wire code. Unknown codes become
    /// [`CoordinationError::Transport`].
    pub fn from_code(code: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match code {
            "UNKNOWN_IDENTITY" => Self::UnknownIdentity(detail),
            "DUPLICATE_IDENTITY" => Self::DuplicateIdentity(detail),
            "UNAUTHORIZED" => Self::Unauthorized(detail),
            "INVALID_PARTICIPANTS" => Self::InvalidParticipants(detail),
            "ENTRY_EXISTS" => Self::EntryExists(detail),
            "TIMEOUT" => Self::Timeout(detail),
            "TASK_ALREADY_TERMINAL" => Self::TaskAlreadyTerminal(detail),
            "LIVENESS_TIMEOUT" => Self::LivenessTimeout(detail),
            "UNKNOWN_TASK" => Self::UnknownTask(detail),
            "UNKNOWN_PROTOCOL" => Self::UnknownProtocol(detail),
            "PROTOCOL_CONFLICT" => Self::ProtocolConflict(detail),
            "INVALID_ENTRY_KEY" => Self::InvalidEntryKey(detail),
            "INVALID_STATUS" => Self::InvalidStatus(detail),
            "INVALID_REQUEST" => Self::InvalidRequest(detail),
            "BACKEND_UNAVAILABLE" => Self::Backend(detail),
            other => Self::Transport(format!("{other}: {detail}")),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for coordination operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        let errors = [
            CoordinationError::UnknownIdentity("bob".into()),
            CoordinationError::DuplicateIdentity("bob".into()),
            CoordinationError::Unauthorized("expired".into()),
            CoordinationError::InvalidParticipants("missing receiver".into()),
            CoordinationError::EntryExists("k".into()),
            CoordinationError::Timeout("read".into()),
            CoordinationError::TaskAlreadyTerminal("t".into()),
            CoordinationError::LivenessTimeout("bob".into()),
            CoordinationError::UnknownTask("t".into()),
            CoordinationError::UnknownProtocol("p".into()),
            CoordinationError::ProtocolConflict("p".into()),
            CoordinationError::InvalidEntryKey("k".into()),
            CoordinationError::InvalidStatus("running".into()),
            CoordinationError::InvalidRequest("empty".into()),
            CoordinationError::Backend("disk".into()),
        ];
        for error in errors {
            let rebuilt = CoordinationError::from_code(error.code(), error.detail());
            assert_eq!(rebuilt, error);
        }
    }

    #[test]
    fn test_unknown_code_becomes_transport() {
        let error = CoordinationError::from_code("TEAPOT", "short and stout");
        assert!(matches!(error, CoordinationError::Transport(_)));
    }

    #[test]
    fn test_display_includes_detail() {
        let error = CoordinationError::EntryExists("transfer:1:file".into());
        assert_eq!(error.to_string(), "entry already exists: transfer:1:file");
    }
}
