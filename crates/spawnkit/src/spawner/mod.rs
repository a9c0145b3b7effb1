//! Platform process creation.
//!
//! [`ProcessSpawner`] is the seam between the portable builder and the OS.
//! Exactly one implementation is compiled in, chosen by target:
//!
//! - **Unix**: [`PosixSpawner`] forks, sets up the child with raw system
//!   calls and replaces its image with `execve`.
//! - **Windows**: [`NativeSpawner`] calls `CreateProcessW` with a quoted
//!   command line and an inheritable output handle.
//!
//! [`PlatformSpawner`] names the one selected for the current build.

use crate::command_line::CommandLine;
use crate::environment::Environment;
use spawnkit_common::SpawnResult;
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[cfg(unix)]
mod posix;
#[cfg(unix)]
pub use posix::{PosixProcess, PosixSpawner};

#[cfg(windows)]
mod native;
#[cfg(windows)]
pub use native::{NativeProcess, NativeSpawner};

/// Spawner compiled in for the current target.
#[cfg(unix)]
pub type PlatformSpawner = PosixSpawner;
/// Spawner compiled in for the current target.
#[cfg(windows)]
pub type PlatformSpawner = NativeSpawner;

/// Native process type produced by [`PlatformSpawner`].
pub type PlatformProcess = <PlatformSpawner as ProcessSpawner>::Process;

/// Borrowed view of a builder's configuration for one spawn.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub command_line: &'a CommandLine,
    /// `None` inherits the caller's environment
    pub environment: Option<&'a Environment>,
    pub working_directory: Option<&'a Path>,
    /// Create-or-truncate target for the child's standard output
    pub standard_output: Option<&'a Path>,
}

/// Creates OS processes from a [`SpawnRequest`].
pub trait ProcessSpawner {
    type Process: ProcessControl;

    /// Starts the process and returns without waiting for it.
    ///
    /// On error no process is left running.
    fn spawn(&self, request: &SpawnRequest<'_>) -> SpawnResult<Self::Process>;
}

/// Wait operations on a live native process.
///
/// Exit codes are normalized to `i32` by the implementation.
pub trait ProcessControl: fmt::Debug + Send {
    fn id(&self) -> u32;

    /// Blocks until the process terminates.
    fn wait(&mut self) -> SpawnResult<i32>;

    /// Returns `None` if the process is still running.
    fn try_wait(&mut self) -> SpawnResult<Option<i32>>;

    /// Blocks for at most `timeout`; `None` if the process is still running.
    fn wait_timeout(&mut self, timeout: Duration) -> SpawnResult<Option<i32>>;
}
