//! Playbook error types

use tandem_types::CoordinationError;
use thiserror::Error;

/// Playbook errors
#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("Invalid playbook: {0}")]
    Spec(String),

    #[error("Playbook TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Step failed: {0}")]
    Step(String),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for playbook operations
pub type Result<T> = std::result::Result<T, PlaybookError>;
