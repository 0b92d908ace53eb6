//! meteor-adapter - stream candidate/reference pairs through METEOR.
//!
//! Reads `candidate ||| reference` lines on stdin, scores each one with a
//! METEOR process running in `-stdio` mode, and writes one score per line on
//! stdout. Logs go to stderr so they never mix with scores.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meteor_adapter::bridge::{serve, MalformedPolicy, ServeError};
use meteor_adapter::config::{self, ConfigError, ConfigLayer};
use meteor_adapter::scorer::ScorerCommand;

/// Exit code for configuration and launch failures.
const EXIT_SETUP_FAILURE: u8 = 2;

/// Exit code for failures while serving requests.
const EXIT_RUNTIME_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "meteor-adapter", version)]
#[command(about = "Bridge `candidate ||| reference` lines on stdin to METEOR's stdio scorer")]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Java launcher [env: METEOR_JAVA] [default: java]
    #[arg(long)]
    java: Option<String>,

    /// METEOR jar [env: METEOR_JAR]
    #[arg(long)]
    jar: Option<PathBuf>,

    /// JVM heap ceiling, passed as -Xmx [env: METEOR_MEMORY] [default: 2G]
    #[arg(long)]
    memory: Option<String>,

    /// Do not lowercase text before scoring
    #[arg(long)]
    no_lower: bool,

    /// Target language code [env: METEOR_LANGUAGE] [default: en]
    #[arg(short, long)]
    language: Option<String>,

    /// METEOR task mode [env: METEOR_TASK] [default: tune]
    #[arg(short, long)]
    task: Option<String>,

    /// What to do with a line that is not `candidate ||| reference` (abort, skip)
    #[arg(long, value_name = "POLICY")]
    on_malformed: Option<MalformedPolicy>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Run this command as the scorer instead of METEOR
    #[arg(last = true, value_name = "SCORER_COMMAND")]
    scorer_command: Vec<String>,
}

impl Cli {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            java: self.java.clone(),
            jar: self.jar.clone(),
            memory: self.memory.clone(),
            lowercase: self.no_lower.then_some(false),
            language: self.language.clone(),
            task: self.task.clone(),
            on_malformed: self.on_malformed,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging (stderr only: stdout carries scores)
    let default_filter = if cli.verbose {
        "meteor_adapter=debug"
    } else {
        "meteor_adapter=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    info!("Starting meteor-adapter v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Each error message carries its cause, so print only the top level.
            eprintln!("Error: {}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let file = cli
        .config
        .as_deref()
        .map(ConfigLayer::from_file)
        .transpose()?;

    let adapter = config::resolve(
        cli.layer(),
        ConfigLayer::from_env(),
        file,
        ScorerCommand::from_argv(&cli.scorer_command),
    );
    let command = adapter.scorer_command()?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let summary = serve(command, adapter.on_malformed, stdin.lock(), stdout.lock())?;

    info!(
        "meteor-adapter exited cleanly after {} requests",
        summary.requests
    );
    Ok(())
}

/// Map a failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_SETUP_FAILURE;
    }
    match err.downcast_ref::<ServeError>() {
        Some(ServeError::Start(_)) => EXIT_SETUP_FAILURE,
        _ => EXIT_RUNTIME_FAILURE,
    }
}
