//! Handle to a spawned process.

use crate::builder::ProcessBuilder;
use crate::spawner::{PlatformProcess, ProcessControl};
use crate::state::ProcessState;
use chrono::{DateTime, Utc};
use spawnkit_common::{ProcessId, SpawnError, SpawnResult};
use std::time::Duration;
use tracing::{debug, info};

/// Owned handle to one child process.
///
/// A handle is either the "no process" sentinel or refers to exactly one OS
/// process for its whole lifetime. Waiting moves it from
/// [`ProcessState::Running`] to [`ProcessState::Exited`]; the exit code is
/// then fixed and can be read any number of times.
///
/// The native handle is released as soon as the exit is recorded, or when
/// the `ChildProcess` is dropped. Dropping never kills the process.
///
/// # Example
/// ```rust,no_run
/// use spawnkit::ChildProcess;
///
/// let mut child = ChildProcess::spawn("/bin/true")?;
/// let code = child.wait_for_exit()?;
/// assert_eq!(code, 0);
/// assert_eq!(child.exit_code()?, 0);
/// # Ok::<(), spawnkit::SpawnError>(())
/// ```
#[derive(Debug)]
pub struct ChildProcess<P: ProcessControl = PlatformProcess> {
    pid: Option<ProcessId>,
    native: Option<P>,
    state: ProcessState,
    started_at: Option<DateTime<Utc>>,
}

impl<P: ProcessControl> Default for ChildProcess<P> {
    fn default() -> Self {
        Self {
            pid: None,
            native: None,
            state: ProcessState::NoProcess,
            started_at: None,
        }
    }
}

impl ChildProcess<PlatformProcess> {
    /// Handle that refers to no process.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses `command_line` and starts it with no redirection and the
    /// inherited environment.
    pub fn spawn(command_line: &str) -> SpawnResult<Self> {
        ProcessBuilder::parse(command_line)?.start()
    }
}

impl<P: ProcessControl> ChildProcess<P> {
    /// Wraps a freshly spawned native process.
    pub fn from_native(native: P) -> Self {
        Self {
            pid: Some(ProcessId::new(native.id())),
            native: Some(native),
            state: ProcessState::Running,
            started_at: Some(Utc::now()),
        }
    }

    pub fn id(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// True until a wait has observed the process exit.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Wall-clock time the process was spawned.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Blocks until the process exits and returns its exit code.
    ///
    /// Reaps the process on POSIX. Calling it again after the process exited
    /// returns the recorded code without touching the OS. Fails with
    /// [`SpawnError::NoProcess`] on the sentinel handle.
    pub fn wait_for_exit(&mut self) -> SpawnResult<i32> {
        if let Some(code) = self.recorded()? {
            return Ok(code);
        }
        let native = self.native.as_mut().ok_or(SpawnError::NoProcess)?;
        debug!("Waiting for process {}", native.id());
        let code = native.wait()?;
        self.record_exit(code);
        Ok(code)
    }

    /// Like [`wait_for_exit`](Self::wait_for_exit) but gives up after
    /// `timeout`, returning `None` while the process keeps running.
    pub fn wait_for_exit_timeout(&mut self, timeout: Duration) -> SpawnResult<Option<i32>> {
        if let Some(code) = self.recorded()? {
            return Ok(Some(code));
        }
        let native = self.native.as_mut().ok_or(SpawnError::NoProcess)?;
        let outcome = native.wait_timeout(timeout)?;
        match outcome {
            Some(code) => self.record_exit(code),
            None => debug!("Process {} still running after {:?}", native.id(), timeout),
        }
        Ok(outcome)
    }

    /// Non-blocking check; `None` while the process is still running.
    pub fn try_wait(&mut self) -> SpawnResult<Option<i32>> {
        if let Some(code) = self.recorded()? {
            return Ok(Some(code));
        }
        let native = self.native.as_mut().ok_or(SpawnError::NoProcess)?;
        let outcome = native.try_wait()?;
        if let Some(code) = outcome {
            self.record_exit(code);
        }
        Ok(outcome)
    }

    /// Exit code recorded by the last successful wait.
    ///
    /// Fails with [`SpawnError::NotExited`] before any wait observed the exit
    /// and with [`SpawnError::NoProcess`] on the sentinel handle.
    pub fn exit_code(&self) -> SpawnResult<i32> {
        self.state.exit_code(self.pid.map(|pid| pid.as_u32()))
    }

    /// `Ok(Some)` once exited, `Ok(None)` while running.
    fn recorded(&self) -> SpawnResult<Option<i32>> {
        match self.state {
            ProcessState::Exited(code) => Ok(Some(code)),
            ProcessState::Running => Ok(None),
            ProcessState::NoProcess => Err(SpawnError::NoProcess),
        }
    }

    fn record_exit(&mut self, code: i32) {
        debug_assert!(self.state.can_transition_to(ProcessState::Exited(code)));
        self.state = ProcessState::Exited(code);
        // Nothing left to wait on; release the native handle now.
        self.native = None;
        if let Some(pid) = self.pid {
            info!("Process {} exited with code {}", pid, code);
        }
    }
}
