//! YAML launch files.
//!
//! A launch file describes one process:
//!
//! ```yaml
//! program: /usr/bin/printf
//! args: ["%s", "hello"]
//! env:
//!   LANG: C
//! inherit_env: true
//! working_directory: /tmp
//! stdout: out.txt
//! timeout: 5s
//! ```
//!
//! `command` may be given instead of `program` + `args`, as one string
//! tokenized by [`CommandLine::parse`].

use crate::builder::ProcessBuilder;
use crate::command_line::CommandLine;
use crate::environment::Environment;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One process launch, as read from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    /// Whole command line as text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Executable path, used with `args`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Variables for the child; when absent the environment is inherited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Environment>,

    /// Start `env` from a snapshot of the caller's environment
    #[serde(default)]
    pub inherit_env: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    /// Standard output redirection target (created or truncated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,

    /// Upper bound on how long a runner waits for the process
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub timeout: Option<Duration>,
}

impl LaunchConfig {
    /// Load a launch file from disk
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read launch file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load a launch description from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: LaunchConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML launch configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.command, &self.program) {
            (Some(_), Some(_)) => return Err(anyhow!("Specify either 'command' or 'program', not both")),
            (None, None) => return Err(anyhow!("One of 'command' or 'program' is required")),
            (Some(_), None) if !self.args.is_empty() => {
                return Err(anyhow!("'args' can only be used together with 'program'"))
            }
            (None, Some(program)) if program.trim().is_empty() => {
                return Err(anyhow!("'program' cannot be empty"))
            }
            _ => {}
        }

        if self.inherit_env && self.env.is_none() {
            return Err(anyhow!("'inherit_env' requires an 'env' section"));
        }

        if let Some(env) = &self.env {
            env.validate().context("Invalid 'env' section")?;
        }

        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(anyhow!("'timeout' must be greater than 0"));
            }
        }

        Ok(())
    }

    /// Resolved command line
    pub fn command_line(&self) -> Result<CommandLine> {
        match (&self.command, &self.program) {
            (Some(command), _) => CommandLine::parse(command).context("Invalid 'command'"),
            (None, Some(program)) => Ok(CommandLine::new(program.as_str()).args(self.args.iter().cloned())),
            (None, None) => Err(anyhow!("One of 'command' or 'program' is required")),
        }
    }

    /// Resolved environment; `None` means inherit.
    pub fn environment(&self) -> Option<Environment> {
        let env = self.env.as_ref()?;
        if self.inherit_env {
            let mut merged = Environment::from_current();
            merged.extend(env.iter());
            Some(merged)
        } else {
            Some(env.clone())
        }
    }

    /// Builder configured from this launch description
    pub fn to_builder(&self) -> Result<ProcessBuilder> {
        self.validate()?;
        let mut builder = ProcessBuilder::new(self.command_line()?);
        if let Some(env) = self.environment() {
            builder.set_environment(env);
        }
        if let Some(dir) = &self.working_directory {
            builder.set_working_directory(dir);
        }
        if let Some(stdout) = &self.stdout {
            builder.redirect_standard_output_to_file(stdout);
        }
        Ok(builder)
    }
}

/// Parse `"250ms"`, `"5s"`, `"2m"` or `"1h"`
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    // Check for "ms" BEFORE "s" since "ms" ends with 's'
    let (number, unit_millis) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        return Err(format!("Invalid duration (expected ms, s, m or h suffix): {}", s));
    };
    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    value
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("Duration out of range: {}", s))
}

fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{}ms", millis)
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&super::format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
