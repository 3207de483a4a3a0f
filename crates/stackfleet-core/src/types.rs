use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// The lifecycle phase a stack failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    HandleAcquisition,
    Configuration,
    Refresh,
    Update,
    Destroy,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::HandleAcquisition => "handle_acquisition",
            Stage::Configuration => "configuration",
            Stage::Refresh => "refresh",
            Stage::Update => "update",
            Stage::Destroy => "destroy",
        }
    }

    /// What the stack was doing, as read in `Failed to <action>: ...`.
    pub fn action(self) -> &'static str {
        match self {
            Stage::HandleAcquisition => "create or select stack",
            Stage::Configuration => "set config",
            Stage::Refresh => "refresh stack",
            Stage::Update => "update stack",
            Stage::Destroy => "destroy stack",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Whether a fleet run applies the program or tears it down. Fixed for the
/// whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Update,
    Destroy,
}

impl Mode {
    /// `"destroy"` selects teardown; anything else, including no argument,
    /// selects update.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("destroy") => Mode::Destroy,
            _ => Mode::Update,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Update => "update",
            Mode::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StackIdentity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackIdentity(String);

impl StackIdentity {
    /// `"<prefix>-<index>"`, e.g. `lt-3`.
    pub fn for_index(prefix: &str, index: usize) -> Self {
        StackIdentity(format!("{prefix}-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StackIdentity {
    fn from(s: &str) -> Self {
        StackIdentity(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// StackHandle
// ---------------------------------------------------------------------------

/// Exclusive reference to one stack's persisted state, handed out by
/// [`StackProvider::upsert`](crate::provider::StackProvider::upsert).
///
/// Deliberately not `Clone`: the runner that acquired it is the only owner.
#[derive(Debug)]
pub struct StackHandle {
    identity: StackIdentity,
    workspace: PathBuf,
}

impl StackHandle {
    pub fn new(identity: StackIdentity, workspace: impl Into<PathBuf>) -> Self {
        StackHandle {
            identity,
            workspace: workspace.into(),
        }
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

// ---------------------------------------------------------------------------
// ConfigurationSet
// ---------------------------------------------------------------------------

/// Ordered key/value pairs applied to a stack before refresh.
///
/// Insertion order is application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigurationSet {
    entries: Vec<(String, String)>,
}

impl ConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an earlier value in place without changing order.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Stack outputs as returned by an update.
pub type Outputs = BTreeMap<String, serde_json::Value>;

/// Terminal result of one lifecycle run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LifecycleOutcome {
    Succeeded {
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        outputs: Outputs,
    },
    Failed {
        stage: Stage,
        cause: String,
    },
}

impl LifecycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LifecycleOutcome::Succeeded { .. })
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            LifecycleOutcome::Failed { stage, .. } => Some(*stage),
            LifecycleOutcome::Succeeded { .. } => None,
        }
    }

    pub fn output(&self, key: &str) -> Option<&serde_json::Value> {
        match self {
            LifecycleOutcome::Succeeded { outputs } => outputs.get(key),
            LifecycleOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReport {
    pub stack: StackIdentity,
    #[serde(flatten)]
    pub outcome: LifecycleOutcome,
}

// ---------------------------------------------------------------------------
// FleetResult
// ---------------------------------------------------------------------------

/// Every stack outcome of one fleet run, in index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetResult {
    pub run_id: uuid::Uuid,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stacks: Vec<StackReport>,
}

impl FleetResult {
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.stacks.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn outcome_for(&self, stack: &str) -> Option<&LifecycleOutcome> {
        self.stacks
            .iter()
            .find(|r| r.stack.as_str() == stack)
            .map(|r| &r.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StackReport> {
        self.stacks.iter().filter(|r| !r.outcome.is_success())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
