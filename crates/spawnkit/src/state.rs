use spawnkit_common::{SpawnError, SpawnResult};
use std::fmt;

/// Lifecycle of a [`ChildProcess`](crate::ChildProcess).
///
/// `NoProcess` never changes. `Running` moves to `Exited` once a wait
/// observes termination, and `Exited` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The handle was never attached to a process
    NoProcess,
    /// The process was spawned and has not been observed to exit
    Running,
    /// The process exited with the given normalized code
    Exited(i32),
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::NoProcess => write!(f, "no_process"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited(code) => write!(f, "exited({})", code),
        }
    }
}

impl ProcessState {
    /// Check if no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::NoProcess | ProcessState::Exited(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }

    /// Recorded exit code, or the error describing why there is none.
    pub fn exit_code(&self, pid: Option<u32>) -> SpawnResult<i32> {
        match (self, pid) {
            (ProcessState::Exited(code), _) => Ok(*code),
            (ProcessState::Running, Some(pid)) => Err(SpawnError::not_exited(pid)),
            _ => Err(SpawnError::NoProcess),
        }
    }

    /// Check if a transition from the current state to `target` is valid
    pub fn can_transition_to(&self, target: ProcessState) -> bool {
        match (self, target) {
            (ProcessState::Running, ProcessState::Exited(_)) => true,
            (ProcessState::Running, ProcessState::Running) => true,
            // Exited is final; re-recording the same code is a no-op
            (ProcessState::Exited(a), ProcessState::Exited(b)) => *a == b,
            (ProcessState::NoProcess, ProcessState::NoProcess) => true,
            _ => false,
        }
    }
}
