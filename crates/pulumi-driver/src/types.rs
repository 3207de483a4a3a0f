use stackfleet_core::config::PulumiSettings;
use stackfleet_core::Outputs;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::{PulumiError, Result};

// ─── Operation ────────────────────────────────────────────────────────────

/// One `pulumi` subcommand the workspace knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `stack select --create`: select the stack, creating it if absent.
    SelectOrCreate,
    ConfigSet,
    Refresh,
    Up,
    Destroy,
    /// `stack output --json --show-secrets`
    StackOutput,
}

impl Operation {
    pub fn subcommand(self) -> &'static [&'static str] {
        match self {
            Operation::SelectOrCreate => &["stack", "select", "--create"],
            Operation::ConfigSet => &["config", "set"],
            Operation::Refresh => &["refresh", "--yes", "--skip-preview"],
            Operation::Up => &["up", "--yes", "--skip-preview"],
            Operation::Destroy => &["destroy", "--yes", "--skip-preview"],
            Operation::StackOutput => &["stack", "output", "--json", "--show-secrets"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::SelectOrCreate => "stack select",
            Operation::ConfigSet => "config set",
            Operation::Refresh => "refresh",
            Operation::Up => "up",
            Operation::Destroy => "destroy",
            Operation::StackOutput => "stack output",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── WorkspaceOptions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct WorkspaceOptions {
    /// Path or bare name of the `pulumi` binary. Defaults to `pulumi` on `PATH`.
    pub executable: Option<PathBuf>,
    /// Extra environment for every invocation (passphrase, backend URL, …).
    pub env: BTreeMap<String, String>,
}

impl From<&PulumiSettings> for WorkspaceOptions {
    fn from(settings: &PulumiSettings) -> Self {
        WorkspaceOptions {
            executable: settings.executable.clone(),
            env: settings.env.clone(),
        }
    }
}

// ─── Invocation ───────────────────────────────────────────────────────────

/// A fully resolved `pulumi` command line for one stack.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub executable: PathBuf,
    pub operation: Operation,
    /// Positional operands (e.g. config key and value), passed after `--` so
    /// values starting with `-` are not read as flags.
    pub args: Vec<String>,
    pub stack: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    /// Arguments passed to the executable, excluding the executable itself.
    pub fn argv(&self) -> Vec<String> {
        let mut argv: Vec<String> = self
            .operation
            .subcommand()
            .iter()
            .map(|s| s.to_string())
            .collect();
        argv.push("--stack".to_string());
        argv.push(self.stack.clone());
        argv.push("--non-interactive".to_string());
        if !self.args.is_empty() {
            argv.push("--".to_string());
            argv.extend(self.args.iter().cloned());
        }
        argv
    }

    /// `pulumi up --stack lt-0`-style label for logs and errors.
    pub fn label(&self) -> String {
        format!("pulumi {} --stack {}", self.operation, self.stack)
    }
}

// ─── Outputs ──────────────────────────────────────────────────────────────

/// Parse the JSON object printed by `pulumi stack output --json`.
///
/// Empty output means the stack declares no outputs.
pub fn parse_outputs(text: &str) -> Result<Outputs> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Outputs::new());
    }
    serde_json::from_str::<Outputs>(trimmed).map_err(|source| PulumiError::Parse {
        output: trimmed.to_string(),
        source,
    })
}
