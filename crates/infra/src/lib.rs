//! Infrastructure layer: the supervisor that turns a list of DSNs into
//! running watch sessions.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorConfig};
