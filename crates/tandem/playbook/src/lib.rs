//! Tandem Playbook - running a participant's side of a protocol
//!
//! Once a task's roles are final, every participant receives an
//! [`Assignment`](tandem_types::Assignment). The [`ParticipantAgent`] claims
//! it, builds an [`ExecutionContext`] and hands it to the [`Launcher`]
//! registered for the role:
//!
//! - [`ProcessLauncher`]: one external program, given `--addr`/`--jwt`
//!   arguments and `TANDEM_*` environment variables
//! - [`StepLauncher`]: the declarative steps of a playbook TOML
//! - [`InProcessLauncher`]: an async closure, for tests and demos
//!
//! Exit code 0 is reported as `Completed`, anything else as `Failed`.

#![deny(unsafe_code)]

pub mod agent;
pub mod context;
pub mod error;
pub mod launcher;
pub mod process;
pub mod spec;
pub mod steps;
pub mod template;

pub use agent::{AgentConfig, ParticipantAgent};
pub use context::ExecutionContext;
pub use error::{PlaybookError, Result};
pub use launcher::{InProcessLauncher, Launcher, RunningPlaybook};
pub use process::ProcessLauncher;
pub use spec::{PackageSpec, ProtocolPlaybook, RolePlaybook, Step, StepAction};
pub use steps::StepLauncher;
