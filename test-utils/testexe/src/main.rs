use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tracing::{error, info};

/// Test executable for spawnkit end-to-end testing
///
/// Everything it reports goes to standard output, so tests can capture it
/// through redirection. Its own logs go to standard error.
#[derive(Parser, Debug)]
#[command(name = "testexe")]
#[command(about = "Helper executable for process spawning tests", long_about = None)]
struct Args {
    /// Exit code to return
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    exit_code: i32,

    /// Text written verbatim to standard output
    #[arg(long)]
    stdout_text: Option<String>,

    /// Write the current working directory to standard output
    #[arg(long)]
    print_cwd: bool,

    /// Write the value of this environment variable (or "<unset>")
    #[arg(long)]
    print_env: Option<String>,

    /// Write every remaining argument as "[arg]"
    #[arg(long)]
    print_args: bool,

    /// Milliseconds to sleep before exiting
    #[arg(long, default_value = "0")]
    sleep_ms: u64,

    /// Extra arguments, echoed with --print-args
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    info!("Starting testexe with args: {:?}", args);

    if let Err(e) = write_report(&args) {
        error!("Failed to write to standard output: {}", e);
        std::process::exit(1);
    }

    if args.sleep_ms > 0 {
        info!("Sleeping {}ms", args.sleep_ms);
        std::thread::sleep(Duration::from_millis(args.sleep_ms));
    }

    info!("Exiting with code {}", args.exit_code);
    std::process::exit(args.exit_code);
}

fn write_report(args: &Args) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Some(text) = &args.stdout_text {
        out.write_all(text.as_bytes())?;
    }

    if args.print_cwd {
        let cwd = std::env::current_dir()?;
        writeln!(out, "{}", cwd.display())?;
    }

    if let Some(name) = &args.print_env {
        match std::env::var(name) {
            Ok(value) => write!(out, "{}", value)?,
            Err(_) => write!(out, "<unset>")?,
        }
    }

    if args.print_args {
        for arg in &args.rest {
            write!(out, "[{}]", arg)?;
        }
    }

    out.flush()
}
