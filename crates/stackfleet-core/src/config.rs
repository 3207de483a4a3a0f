use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "stackfleet.yaml";

/// Config key the region value is applied under.
pub const REGION_KEY: &str = "aws:region";

/// Numeric tunables read by the deployed program, in application order.
pub const TUNABLE_KEYS: [&str; 3] = ["x", "y", "z"];

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TunableRange
// ---------------------------------------------------------------------------

/// Closed interval the numeric tunables are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunableRange {
    #[serde(default = "default_min")]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: u32,
}

fn default_min() -> u32 {
    10
}

fn default_max() -> u32 {
    100
}

impl Default for TunableRange {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
        }
    }
}

// ---------------------------------------------------------------------------
// PulumiSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulumiSettings {
    /// Path to the `pulumi` binary; resolved from `PATH` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Extra environment for every `pulumi` invocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// FleetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_fleet_size")]
    pub fleet_size: usize,
    #[serde(default = "default_stack_prefix")]
    pub stack_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_dir: Option<PathBuf>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub tunables: TunableRange,
    /// Static keys applied after the generated ones, in key order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_config: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_timeout_secs: Option<u64>,
    #[serde(default)]
    pub pulumi: PulumiSettings,
}

fn default_fleet_size() -> usize {
    100
}

fn default_stack_prefix() -> String {
    "lt".to_string()
}

fn default_region() -> String {
    "us-east-2".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            fleet_size: default_fleet_size(),
            stack_prefix: default_stack_prefix(),
            program_dir: None,
            region: default_region(),
            tunables: TunableRange::default(),
            extra_config: BTreeMap::new(),
            max_parallel: None,
            stack_timeout_secs: None,
            pulumi: PulumiSettings::default(),
        }
    }
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FleetError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: FleetConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `explicit` if given, else `stackfleet.yaml` in `cwd` if present,
    /// else the defaults.
    pub fn load_or_default(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = cwd.join(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            Self::load(&fallback)
        } else {
            Ok(Self::default())
        }
    }

    pub fn stack_timeout(&self) -> Option<Duration> {
        self.stack_timeout_secs.map(Duration::from_secs)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.tunables.min > self.tunables.max {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "tunables.min ({}) is greater than tunables.max ({})",
                    self.tunables.min, self.tunables.max
                ),
            });
        }

        if self.stack_prefix.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "stack_prefix must not be empty".to_string(),
            });
        }

        if self.max_parallel == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_parallel must be at least 1".to_string(),
            });
        }

        if self.stack_timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "stack_timeout_secs must be at least 1".to_string(),
            });
        }

        if self.fleet_size == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "fleet_size is 0: no stacks will be driven".to_string(),
            });
        }

        for key in self.extra_config.keys() {
            if key == REGION_KEY || TUNABLE_KEYS.contains(&key.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "extra_config key '{key}' overrides a generated value"
                    ),
                });
            }
        }

        warnings
    }

    /// Fail on the first error-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(FleetError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
