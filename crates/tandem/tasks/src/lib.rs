//! Tandem Task Lifecycle Manager
//!
//! - **ProtocolCatalog**: declared protocols and their role requirements
//! - **TaskManager**: task records, status transitions, waiting, liveness
//!   and garbage collection
//! - **Dispatcher**: one assignment inbox per participant
//!
//! ## Lifecycle
//!
//! ```text
//! Created -> Running -> Completed
//!                   \-> Failed
//! ```
//!
//! A task fails as soon as one participant reports failure or misses its
//! liveness deadline, and completes once every participant reported success.

#![deny(unsafe_code)]

pub mod catalog;
pub mod dispatch;
pub mod manager;

pub use catalog::ProtocolCatalog;
pub use dispatch::Dispatcher;
pub use manager::{TaskManager, TaskManagerConfig, TaskStats};
