//! API request handlers

mod entries;
mod identities;
mod system;
mod tasks;

pub use entries::*;
pub use identities::*;
pub use system::*;
pub use tasks::*;
