//! Error types for the spawnkit crates.
//!
//! Every fallible operation returns [`SpawnResult`]. Nothing on the spawn or
//! wait paths panics: callers always get a [`SpawnError`] describing what
//! went wrong, and [`SpawnError::kind`] gives the coarse category when the
//! details don't matter.
//!
//! ```
//! use spawnkit_common::{ErrorKind, SpawnError, SpawnResult};
//!
//! fn locate(path: &str) -> SpawnResult<()> {
//!     Err(SpawnError::executable_not_found(path))
//! }
//!
//! let err = locate("/no/such/tool").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::ExecutableNotFound);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for spawnkit operations.
pub type SpawnResult<T> = std::result::Result<T, SpawnError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The command line could not be tokenized or contains an interior NUL.
    InvalidCommandLine,
    /// An environment variable name or value cannot be passed to the OS.
    InvalidEnvironment,
    /// The executable does not exist.
    ExecutableNotFound,
    /// The standard output redirection target could not be set up.
    Redirect,
    /// The child could not change into the requested working directory.
    WorkingDirectory,
    /// The OS refused to create the process or to replace its image.
    Spawn,
    /// Waiting on the process failed.
    Wait,
    /// The handle does not refer to any process.
    NoProcess,
    /// The process has not been waited on yet.
    NotExited,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidCommandLine => "invalid_command_line",
            ErrorKind::InvalidEnvironment => "invalid_environment",
            ErrorKind::ExecutableNotFound => "executable_not_found",
            ErrorKind::Redirect => "redirect",
            ErrorKind::WorkingDirectory => "working_directory",
            ErrorKind::Spawn => "spawn",
            ErrorKind::Wait => "wait",
            ErrorKind::NoProcess => "no_process",
            ErrorKind::NotExited => "not_exited",
        };
        f.write_str(name)
    }
}

/// Error raised while launching or waiting on a child process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("Invalid command line: {reason}")]
    InvalidCommandLine { reason: String },

    #[error("Invalid environment variable '{name}': {reason}")]
    InvalidEnvironment { name: String, reason: String },

    #[error("Executable not found: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("Failed to redirect standard output to {}: {reason}", path.display())]
    RedirectFailed {
        path: PathBuf,
        reason: String,
        os_code: Option<i32>,
    },

    #[error("Failed to change working directory to {}: {reason}", path.display())]
    WorkingDirectory {
        path: PathBuf,
        reason: String,
        os_code: Option<i32>,
    },

    #[error("Process spawn failed: {executable} - {reason}")]
    SpawnFailed {
        executable: String,
        reason: String,
        os_code: Option<i32>,
    },

    /// The child was created but replacing its image failed.
    #[error("Process exec failed: {executable} - {reason}")]
    ExecFailed {
        executable: String,
        reason: String,
        os_code: Option<i32>,
    },

    #[error("Wait failed for process {pid}: {reason}")]
    WaitFailed {
        pid: u32,
        reason: String,
        os_code: Option<i32>,
    },

    #[error("Handle does not refer to a process")]
    NoProcess,

    #[error("Process {pid} has not exited yet")]
    NotExited { pid: u32 },
}

impl SpawnError {
    pub fn invalid_command_line(reason: impl Into<String>) -> Self {
        Self::InvalidCommandLine {
            reason: reason.into(),
        }
    }

    pub fn invalid_environment(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnvironment {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn executable_not_found(path: impl AsRef<Path>) -> Self {
        Self::ExecutableNotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn redirect_failed(path: impl AsRef<Path>, reason: impl Into<String>, os_code: Option<i32>) -> Self {
        Self::RedirectFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
            os_code,
        }
    }

    pub fn working_directory(path: impl AsRef<Path>, reason: impl Into<String>, os_code: Option<i32>) -> Self {
        Self::WorkingDirectory {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
            os_code,
        }
    }

    pub fn spawn_failed(executable: impl Into<String>, reason: impl Into<String>, os_code: Option<i32>) -> Self {
        Self::SpawnFailed {
            executable: executable.into(),
            reason: reason.into(),
            os_code,
        }
    }

    pub fn exec_failed(executable: impl Into<String>, reason: impl Into<String>, os_code: Option<i32>) -> Self {
        Self::ExecFailed {
            executable: executable.into(),
            reason: reason.into(),
            os_code,
        }
    }

    pub fn wait_failed(pid: u32, reason: impl Into<String>, os_code: Option<i32>) -> Self {
        Self::WaitFailed {
            pid,
            reason: reason.into(),
            os_code,
        }
    }

    pub fn not_exited(pid: u32) -> Self {
        Self::NotExited { pid }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpawnError::InvalidCommandLine { .. } => ErrorKind::InvalidCommandLine,
            SpawnError::InvalidEnvironment { .. } => ErrorKind::InvalidEnvironment,
            SpawnError::ExecutableNotFound { .. } => ErrorKind::ExecutableNotFound,
            SpawnError::RedirectFailed { .. } => ErrorKind::Redirect,
            SpawnError::WorkingDirectory { .. } => ErrorKind::WorkingDirectory,
            SpawnError::SpawnFailed { .. } | SpawnError::ExecFailed { .. } => ErrorKind::Spawn,
            SpawnError::WaitFailed { .. } => ErrorKind::Wait,
            SpawnError::NoProcess => ErrorKind::NoProcess,
            SpawnError::NotExited { .. } => ErrorKind::NotExited,
        }
    }

    /// OS error code (errno / `GetLastError`) behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SpawnError::RedirectFailed { os_code, .. }
            | SpawnError::WorkingDirectory { os_code, .. }
            | SpawnError::SpawnFailed { os_code, .. }
            | SpawnError::ExecFailed { os_code, .. }
            | SpawnError::WaitFailed { os_code, .. } => *os_code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SpawnError::executable_not_found("/missing").kind(),
            ErrorKind::ExecutableNotFound
        );
        assert_eq!(
            SpawnError::exec_failed("sh", "boom", Some(2)).kind(),
            ErrorKind::Spawn
        );
        assert_eq!(
            SpawnError::spawn_failed("sh", "boom", None).kind(),
            ErrorKind::Spawn
        );
        assert_eq!(SpawnError::NoProcess.kind(), ErrorKind::NoProcess);
        assert_eq!(SpawnError::not_exited(42).kind(), ErrorKind::NotExited);
    }

    #[test]
    fn test_raw_os_error() {
        let err = SpawnError::working_directory("/nope", "No such file or directory", Some(2));
        assert_eq!(err.raw_os_error(), Some(2));
        assert_eq!(SpawnError::NoProcess.raw_os_error(), None);
        assert_eq!(SpawnError::invalid_command_line("empty").raw_os_error(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = SpawnError::executable_not_found("/no/such/tool");
        assert_eq!(err.to_string(), "Executable not found: /no/such/tool");

        let err = SpawnError::wait_failed(17, "ECHILD", Some(10));
        assert!(err.to_string().contains("process 17"));

        assert_eq!(ErrorKind::WorkingDirectory.to_string(), "working_directory");
    }
}
