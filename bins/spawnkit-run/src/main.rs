use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use spawnkit::config::parse_duration;
use spawnkit::{CommandLine, Environment, LaunchConfig, ProcessBuilder};

/// Exit code used when the child outlives `--timeout`
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Launch a process, wait for it and exit with its exit code
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Launch file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Redirect the child's standard output to FILE (created or truncated)
    #[arg(long, value_name = "FILE")]
    stdout: Option<PathBuf>,

    /// Working directory for the child
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Set a variable for the child (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Start the child with only the variables given by --env
    #[arg(long)]
    clear_env: bool,

    /// Stop waiting after this long, e.g. "500ms" or "5s" (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Program and arguments (overrides config)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PROGRAM")]
    command: Vec<String>,
}

fn main() {
    let args = Args::parse();

    initialize_logging(args.debug);

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let config = match &args.config {
        Some(path) => {
            info!("Config file: {}", path.display());
            Some(LaunchConfig::load_from_file(path)?)
        }
        None => None,
    };

    let timeout = args.timeout.or(config.as_ref().and_then(|c| c.timeout));
    let builder = build(&args, config.as_ref())?;

    info!("Launching: {}", builder.command_line());
    let mut child = builder.start().context("Failed to launch process")?;

    let code = match timeout {
        Some(limit) => match child.wait_for_exit_timeout(limit)? {
            Some(code) => code,
            None => {
                if let Some(pid) = child.id() {
                    warn!("Process {} still running after {:?}; leaving it running", pid, limit);
                }
                return Ok(TIMEOUT_EXIT_CODE);
            }
        },
        None => child.wait_for_exit()?,
    };

    info!("Process exited with code {}", code);
    Ok(code)
}

/// Combine the launch file and the command line flags; flags win.
fn build(args: &Args, config: Option<&LaunchConfig>) -> Result<ProcessBuilder> {
    let mut builder = match (config, args.command.split_first()) {
        (_, Some((program, rest))) => {
            let command_line = CommandLine::new(program.as_str()).args(rest.iter().cloned());
            let mut builder = ProcessBuilder::new(command_line);
            if let Some(config) = config {
                apply_config_settings(&mut builder, config);
            }
            builder
        }
        (Some(config), None) => config.to_builder()?,
        (None, None) => return Err(anyhow!("Nothing to run: give a PROGRAM or --config FILE")),
    };

    if args.clear_env || !args.env.is_empty() {
        // --clear-env drops anything inherited, but keeps the launch file's own variables.
        let mut environment = if args.clear_env {
            config.and_then(|c| c.env.clone()).unwrap_or_default()
        } else {
            builder
                .environment()
                .cloned()
                .unwrap_or_else(Environment::from_current)
        };
        environment.extend(args.env.iter().cloned());
        environment.validate().context("Invalid --env value")?;
        builder.set_environment(environment);
    }

    if let Some(dir) = &args.cwd {
        builder.set_working_directory(dir);
    }
    if let Some(stdout) = &args.stdout {
        builder.redirect_standard_output_to_file(stdout);
    }

    Ok(builder)
}

/// Launch file settings other than the command itself.
fn apply_config_settings(builder: &mut ProcessBuilder, config: &LaunchConfig) {
    if let Some(env) = config.environment() {
        builder.set_environment(env);
    }
    if let Some(dir) = &config.working_directory {
        builder.set_working_directory(dir);
    }
    if let Some(stdout) = &config.stdout {
        builder.redirect_standard_output_to_file(stdout);
    }
}

fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("Missing variable name in '{}'", s)),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("Expected KEY=VALUE, got '{}'", s)),
    }
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("spawnkit-run").chain(argv.iter().copied()))
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(parse_env_pair("A=b=c").unwrap(), ("A".to_string(), "b=c".to_string()));
        assert_eq!(parse_env_pair("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }

    #[test]
    fn test_trailing_command_keeps_hyphen_arguments() {
        let args = args(&["--timeout", "2s", "--", "ls", "-la", "/tmp"]);
        assert_eq!(args.timeout, Some(Duration::from_secs(2)));
        assert_eq!(args.command, vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn test_build_requires_something_to_run() {
        assert!(build(&args(&[]), None).is_err());
    }

    #[test]
    fn test_clear_env_keeps_only_flags() {
        let builder = build(&args(&["--clear-env", "--env", "A=1", "prog"]), None).unwrap();
        let env = builder.environment().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("A"), Some("1"));
    }

    #[test]
    fn test_env_without_clear_inherits() {
        let builder = build(&args(&["--env", "SPAWNKIT_RUN_TEST=1", "prog"]), None).unwrap();
        let env = builder.environment().unwrap();
        assert_eq!(env.get("SPAWNKIT_RUN_TEST"), Some("1"));
        assert!(env.len() >= Environment::from_current().len());
    }

    #[test]
    fn test_flags_override_config() {
        let config = LaunchConfig::load_from_string(
            "program: /bin/echo\nargs: [from-config]\nworking_directory: /config-dir\nstdout: config.txt\n",
        )
        .unwrap();
        let builder = build(&args(&["--stdout", "flag.txt"]), Some(&config)).unwrap();
        assert_eq!(builder.command_line().argv(), vec!["/bin/echo", "from-config"]);
        assert_eq!(builder.standard_output_file(), Some(std::path::Path::new("flag.txt")));
        assert_eq!(builder.working_directory(), Some(std::path::Path::new("/config-dir")));

        let builder = build(&args(&["other", "x"]), Some(&config)).unwrap();
        assert_eq!(builder.command_line().argv(), vec!["other", "x"]);
        assert_eq!(builder.standard_output_file(), Some(std::path::Path::new("config.txt")));
    }
}
