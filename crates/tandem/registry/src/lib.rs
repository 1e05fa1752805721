//! Tandem Registry - identities, endpoints and credentials
//!
//! The registry hands out an [`Identity`](tandem_types::Identity) per
//! participant and later checks the bearer credential that comes with every
//! call:
//!
//! - **TokenIssuer**: signs and verifies Ed25519 bearer credentials
//! - **RegistryBackend**: where identity records live
//! - **EphemeralBackend**: process-lifetime, session-scoped credentials
//! - **FileBackend**: JSON file, long-lived credentials
//!
//! ## Ephemeral vs Durable
//!
//! Local demos and tests register throw-away identities with the ephemeral
//! backend. A daemon that must keep identities across restarts uses the file
//! backend together with a configured signing seed.

#![deny(unsafe_code)]

pub mod backend;
pub mod ephemeral;
pub mod file;
pub mod registry;
pub mod token;

pub use backend::{IdentityRecord, RegistryBackend};
pub use ephemeral::EphemeralBackend;
pub use file::FileBackend;
pub use registry::{Registry, RegistryConfig};
pub use token::TokenIssuer;
