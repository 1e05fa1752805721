//! Tandem Core - the coordinator
//!
//! [`Coordinator`] puts the registry, the entry store and the task manager
//! behind one authenticated surface. [`CoordinatorApi`] is the seam clients
//! program against: the coordinator implements it in-process, and
//! `tandem-node` implements it over HTTP against `tandemd`.

#![deny(unsafe_code)]

pub mod api;
pub mod coordinator;

pub use api::CoordinatorApi;
pub use coordinator::{Coordinator, CoordinatorConfig};
