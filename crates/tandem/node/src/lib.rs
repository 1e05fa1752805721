//! Tandem Node - the handle a participant process holds
//!
//! A [`Node`] binds one [`Identity`](tandem_types::Identity) to a
//! [`CoordinatorApi`](tandem_core::CoordinatorApi) transport and attaches the
//! credential to every call:
//!
//! - in-process, against a [`Coordinator`](tandem_core::Coordinator)
//! - over HTTP, against `tandemd` through [`RemoteCoordinator`]
//!
//! A [`Connector`] turns the `(endpoint, credential)` pair a launched
//! program receives into a ready [`Node`].

#![deny(unsafe_code)]

pub mod connector;
pub mod node;
pub mod remote;

pub use connector::{Connector, LocalConnector, RemoteConnector};
pub use node::Node;
pub use remote::RemoteCoordinator;
