//! Identifier types shared across the spawnkit crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric OS process identifier.
///
/// # Example
/// ```
/// use spawnkit_common::ProcessId;
///
/// let pid = ProcessId::from(1234);
/// assert_eq!(pid.as_u32(), 1234);
/// assert_eq!(pid.to_string(), "1234");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    pub fn new(pid: u32) -> Self {
        Self(pid)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl From<ProcessId> for u32 {
    fn from(pid: ProcessId) -> Self {
        pid.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
