//! Per-stack configuration values.
//!
//! Each runner owns its own [`ConfigGenerator`], so no random source is shared
//! between tasks. Seeds are derived from a fleet-wide base seed and the
//! runner index.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{FleetConfig, TunableRange, REGION_KEY, TUNABLE_KEYS};
use crate::types::ConfigurationSet;

/// A base seed taken from the wall clock.
pub fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Mix a runner index into the base seed (splitmix64 finalizer) so adjacent
/// indices get unrelated streams.
pub fn runner_seed(base: u64, index: usize) -> u64 {
    let mut z = base.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug)]
pub struct ConfigGenerator {
    rng: StdRng,
    region: String,
    range: TunableRange,
    extra: BTreeMap<String, String>,
}

impl ConfigGenerator {
    pub fn new(seed: u64, region: impl Into<String>, range: TunableRange) -> Self {
        ConfigGenerator {
            rng: StdRng::seed_from_u64(seed),
            region: region.into(),
            range,
            extra: BTreeMap::new(),
        }
    }

    /// Generator for runner `index` using the region, range and extra keys
    /// from `config`.
    pub fn for_runner(config: &FleetConfig, base_seed: u64, index: usize) -> Self {
        let mut generator = Self::new(
            runner_seed(base_seed, index),
            config.region.clone(),
            config.tunables,
        );
        generator.extra = config.extra_config.clone();
        generator
    }

    /// Region first, then `x`, `y`, `z` drawn independently from the closed
    /// range, then any static extras.
    pub fn generate(&mut self) -> ConfigurationSet {
        let mut set = ConfigurationSet::new();
        set.insert(REGION_KEY, self.region.clone());
        for key in TUNABLE_KEYS {
            let value = self.rng.gen_range(self.range.min..=self.range.max);
            set.insert(key, value.to_string());
        }
        for (key, value) in &self.extra {
            set.insert(key.clone(), value.clone());
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
