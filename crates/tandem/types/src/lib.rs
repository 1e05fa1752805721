//! Tandem core types
//!
//! Shared vocabulary of the coordination substrate:
//!
//! - **Identifiers**: [`UserId`], [`TaskId`]
//! - **Identity**: [`Identity`], [`Credential`], [`Endpoint`]
//! - **Protocols**: [`ProtocolSpec`], [`RoleRequirement`]
//! - **Tasks**: [`Task`], [`TaskStatus`], [`Participant`], [`Assignment`]
//! - **Entries**: [`Entry`], [`EntryKey`]
//! - **Errors**: [`CoordinationError`], the taxonomy every service reports
//! - **Wire**: HTTP request and response bodies shared by daemon and client

#![deny(unsafe_code)]

pub mod encoding;
pub mod entry;
pub mod error;
pub mod identity;
pub mod ids;
pub mod protocol;
pub mod task;
pub mod wire;

pub use entry::{Entry, EntryKey};
pub use error::{CoordinationError, Result};
pub use identity::{Credential, CredentialClaims, CredentialScope, Endpoint, Identity};
pub use ids::{TaskId, UserId};
pub use protocol::{ProtocolSpec, RoleRequirement};
pub use task::{
    Assignment, FailureReason, Participant, ParticipantReport, RunOptions, RunTaskRequest, Task,
    TaskStatus, Transition,
};
