//! # spawnkit
//!
//! Cross-platform child process launching.
//!
//! This crate provides:
//! - [`CommandLine`]: executable plus arguments, tokenized or quoted
//! - [`Environment`]: explicit environment for a child
//! - [`ProcessBuilder`]: launch configuration (environment, working
//!   directory, standard output redirection) and spawning
//! - [`ChildProcess`]: waiting and exit code retrieval
//! - [`LaunchConfig`]: YAML launch files
//!
//! Process creation is platform specific: `fork` + `execve` on Unix,
//! `CreateProcessW` on Windows. See [`spawner`].
//!
//! ```rust,no_run
//! use spawnkit::{CommandLine, ProcessBuilder};
//!
//! let mut builder = ProcessBuilder::new(CommandLine::new("/bin/echo").arg("hello"));
//! builder.redirect_standard_output_to_file("hello.txt");
//!
//! let mut child = builder.start()?;
//! assert_eq!(child.wait_for_exit()?, 0);
//! # Ok::<(), spawnkit::SpawnError>(())
//! ```

#![deny(unsafe_code)]

pub mod builder;
pub mod child;
pub mod command_line;
pub mod config;
pub mod environment;
pub mod spawner;
pub mod state;

pub use builder::ProcessBuilder;
pub use child::ChildProcess;
pub use command_line::CommandLine;
pub use config::LaunchConfig;
pub use environment::Environment;
pub use spawner::{PlatformSpawner, ProcessControl, ProcessSpawner, SpawnRequest};
pub use state::ProcessState;

pub use spawnkit_common::{ErrorKind, ProcessId, SpawnError, SpawnResult};
