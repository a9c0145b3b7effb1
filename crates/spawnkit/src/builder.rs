//! Launch configuration and spawning.

use crate::child::ChildProcess;
use crate::command_line::CommandLine;
use crate::environment::Environment;
use crate::spawner::{PlatformSpawner, ProcessSpawner, SpawnRequest};
use spawnkit_common::{SpawnError, SpawnResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Accumulates everything needed to launch a process.
///
/// Setters only record values; nothing touches the filesystem until
/// [`start`](Self::start). A builder can be started any number of times,
/// each start creating an independent process.
///
/// # Example
/// ```rust,no_run
/// use spawnkit::{CommandLine, ProcessBuilder};
///
/// let mut builder = ProcessBuilder::new(CommandLine::new("/bin/ls").arg("-l"));
/// builder
///     .set_working_directory("/tmp")
///     .redirect_standard_output_to_file("/tmp/listing.txt");
///
/// let mut child = builder.start()?;
/// child.wait_for_exit()?;
/// # Ok::<(), spawnkit::SpawnError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    command_line: CommandLine,
    environment: Option<Environment>,
    working_directory: Option<PathBuf>,
    standard_output: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Builder that lets the child inherit the caller's environment.
    pub fn new(command_line: CommandLine) -> Self {
        Self {
            command_line,
            environment: None,
            working_directory: None,
            standard_output: None,
        }
    }

    /// Builder from a textual command line, tokenized by [`CommandLine::parse`].
    pub fn parse(command_line: &str) -> SpawnResult<Self> {
        Ok(Self::new(CommandLine::parse(command_line)?))
    }

    /// Builder whose child sees exactly `environment`.
    pub fn with_environment(command_line: CommandLine, environment: Environment) -> Self {
        Self {
            environment: Some(environment),
            ..Self::new(command_line)
        }
    }

    pub fn set_environment(&mut self, environment: Environment) -> &mut Self {
        self.environment = Some(environment);
        self
    }

    /// Directory the child changes into before its image is replaced.
    pub fn set_working_directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Sends the child's standard output to `path`. The file is created, or
    /// truncated if it already exists, when the process starts.
    pub fn redirect_standard_output_to_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.standard_output = Some(path.into());
        self
    }

    pub fn command_line(&self) -> &CommandLine {
        &self.command_line
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn standard_output_file(&self) -> Option<&Path> {
        self.standard_output.as_deref()
    }

    fn request(&self) -> SpawnRequest<'_> {
        SpawnRequest {
            command_line: &self.command_line,
            environment: self.environment.as_ref(),
            working_directory: self.working_directory.as_deref(),
            standard_output: self.standard_output.as_deref(),
        }
    }

    /// Starts the process with the spawner compiled in for this platform.
    ///
    /// Returns as soon as the process is running; it does not wait.
    pub fn start(&self) -> SpawnResult<ChildProcess> {
        self.start_with(&PlatformSpawner::default())
    }

    /// Starts the process with a specific spawner.
    pub fn start_with<S: ProcessSpawner>(&self, spawner: &S) -> SpawnResult<ChildProcess<S::Process>> {
        debug!(
            "Starting {} (cwd: {:?}, stdout: {:?}, explicit environment: {})",
            self.command_line,
            self.working_directory,
            self.standard_output,
            self.environment.is_some()
        );
        match spawner.spawn(&self.request()) {
            Ok(native) => Ok(ChildProcess::from_native(native)),
            Err(e) => {
                warn!("Failed to start {}: {}", self.command_line, e);
                Err(e)
            }
        }
    }

    /// Starts the process, reporting failure as a "no process" handle plus
    /// the error instead of a `Result`.
    pub fn start_or_invalid(&self) -> (ChildProcess, Option<SpawnError>) {
        match self.start() {
            Ok(child) => (child, None),
            Err(e) => (ChildProcess::none(), Some(e)),
        }
    }
}

impl From<CommandLine> for ProcessBuilder {
    fn from(command_line: CommandLine) -> Self {
        Self::new(command_line)
    }
}
