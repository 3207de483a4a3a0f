use anyhow::Context;
use pulumi_driver::{PulumiWorkspace, WorkspaceOptions};
use stackfleet_core::{
    config::{FleetConfig, WarnLevel},
    CancellationToken, Fleet, Mode, Reporter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::output::{print_failures, print_json};
use crate::root::resolve_program_dir;

// ---------------------------------------------------------------------------
// RunExit — typed non-zero exit codes (no std::process::exit in library code)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RunExit {
    StacksFailed { failed: usize, total: usize },
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::StacksFailed { .. } => 2,
        }
    }
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunExit::StacksFailed { failed, total } => {
                write!(f, "{failed} of {total} stack(s) failed")
            }
        }
    }
}

impl std::error::Error for RunExit {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Command-line inputs after parsing; flags override the config file.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub mode: Option<String>,
    pub config: Option<PathBuf>,
    pub program_dir: Option<PathBuf>,
    pub fleet_size: Option<usize>,
    pub max_parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub seed: Option<u64>,
    pub pulumi: Option<PathBuf>,
    pub fail_on_error: bool,
    pub json: bool,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;

    let mut config = FleetConfig::load_or_default(args.config.as_deref(), &cwd)
        .context("failed to load fleet config")?;
    apply_overrides(&mut config, &args);

    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            warn!("{}", w.message);
        }
    }
    config.ensure_valid().context("invalid fleet config")?;

    let program_dir =
        resolve_program_dir(args.program_dir.as_deref(), config.program_dir.as_deref(), &cwd);
    let workspace = PulumiWorkspace::new(WorkspaceOptions::from(&config.pulumi))
        .context("cannot run pulumi")?;

    let mode = Mode::from_arg(args.mode.as_deref());
    let mut fleet = Fleet::new(Arc::new(workspace), Reporter::stdout(), config, &program_dir);
    if let Some(seed) = args.seed {
        fleet = fleet.with_seed(seed);
    }
    info!(
        mode = %mode,
        fleet_size = fleet.config().fleet_size,
        seed = fleet.seed(),
        program_dir = %program_dir.display(),
        "starting fleet"
    );

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; cancelling in-flight stacks");
                on_signal.cancel();
            }
        });
        fleet.run(mode, &cancel).await
    })?;

    if args.json {
        print_json(&result)?;
    } else {
        print_failures(&result);
    }

    if args.fail_on_error && result.failed() > 0 {
        return Err(RunExit::StacksFailed {
            failed: result.failed(),
            total: result.len(),
        }
        .into());
    }
    Ok(())
}

fn apply_overrides(config: &mut FleetConfig, args: &RunArgs) {
    if let Some(n) = args.fleet_size {
        config.fleet_size = n;
    }
    if let Some(n) = args.max_parallel {
        config.max_parallel = Some(n);
    }
    if let Some(secs) = args.timeout_secs {
        config.stack_timeout_secs = Some(secs);
    }
    if let Some(path) = &args.pulumi {
        config.pulumi.executable = Some(path.clone());
    }
}
