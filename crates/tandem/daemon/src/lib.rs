//! Tandem daemon library
//!
//! This module provides the components of `tandemd`:
//! - REST API exposing the coordinator
//! - Configuration loading
//! - Garbage-collection scheduler
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use scheduler::Scheduler;
pub use server::Server;
