//! # spawnkit-common
//!
//! Types shared by the spawnkit crates: the error taxonomy reported by
//! process launching and waiting, and the process identifier newtype.

pub mod errors;
pub mod types;

pub use errors::{ErrorKind, SpawnError, SpawnResult};
pub use types::ProcessId;
