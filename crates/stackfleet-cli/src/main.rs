mod cmd;
mod output;
mod root;

use clap::Parser;
use cmd::run::{RunArgs, RunExit};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackfleet",
    about = "Drive a fleet of Pulumi stacks through refresh and update (or destroy) concurrently",
    version
)]
struct Cli {
    /// `destroy` tears the fleet down; anything else (or nothing) updates it
    mode: Option<String>,

    /// Fleet config file (default: stackfleet.yaml in the current directory, if present)
    #[arg(long, env = "STACKFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the Pulumi program (default: ./program, else nearest Pulumi.yaml)
    #[arg(long)]
    program_dir: Option<PathBuf>,

    /// Number of stacks in the fleet
    #[arg(long, short = 'n')]
    fleet_size: Option<usize>,

    /// Maximum number of stacks in flight at once (default: unbounded)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Per-stack timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Base seed for generated config values (default: time-based)
    #[arg(long)]
    seed: Option<u64>,

    /// Path to the pulumi executable
    #[arg(long, env = "PULUMI_BIN")]
    pulumi: Option<PathBuf>,

    /// Exit with code 2 if any stack failed
    #[arg(long)]
    fail_on_error: bool,

    /// Print the fleet result as JSON after the completion marker
    #[arg(long, short = 'j')]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = RunArgs {
        mode: cli.mode,
        config: cli.config,
        program_dir: cli.program_dir,
        fleet_size: cli.fleet_size,
        max_parallel: cli.max_parallel,
        timeout_secs: cli.timeout,
        seed: cli.seed,
        pulumi: cli.pulumi,
        fail_on_error: cli.fail_on_error,
        json: cli.json,
    };

    if let Err(e) = cmd::run::run(args) {
        if let Some(exit) = e.downcast_ref::<RunExit>() {
            eprintln!("{exit}");
            std::process::exit(exit.exit_code());
        }
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
