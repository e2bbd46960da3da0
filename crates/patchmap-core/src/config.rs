//! `[distribution]` TOML configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::strategy::Strategy;

/// Default knapsack refinement cutoff.
pub const DEFAULT_EFFICIENCY: f64 = 0.9;

/// Recognized options of the distribution core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Strategy name as written in the file. Resolved by [`Self::strategy`].
    pub strategy: Option<String>,
    #[serde(alias = "v")]
    pub verbose: bool,
    /// Knapsack refinement stops once efficiency exceeds this, `(0, 1]`.
    pub efficiency: f64,
    /// SFC degrades to knapsack when `items < sfc_threshold * workers`.
    pub sfc_threshold: usize,
    pub proximity: ProximityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Topology description read by the IO rank.
    pub topology_file: Option<PathBuf>,
    /// Experimental: derive run targets from rescaled resident load
    /// instead of the knapsack pass.
    pub blend_resident_load: bool,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            strategy: None,
            verbose: false,
            efficiency: DEFAULT_EFFICIENCY,
            sfc_threshold: 0,
            proximity: ProximityConfig::default(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    distribution: DistributionConfig,
}

impl DistributionConfig {
    /// Read the `[distribution]` table of a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse the `[distribution]` table. A missing table yields defaults.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.distribution.normalized())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        let file = ConfigFile {
            distribution: self.clone(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    /// Resolve the configured strategy.
    ///
    /// An unknown name is reported and `fallback` is kept.
    pub fn strategy_or(&self, fallback: Strategy) -> Strategy {
        match self.strategy.as_deref() {
            None => fallback,
            Some(name) => match name.parse() {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, keeping = %fallback, "ignoring configured strategy");
                    fallback
                }
            },
        }
    }

    /// Resolve the configured strategy, falling back to the default (SFC).
    pub fn strategy(&self) -> Strategy {
        self.strategy_or(Strategy::default())
    }

    /// Reset out-of-range values to their defaults, with a warning.
    pub fn normalized(mut self) -> Self {
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            warn!(
                efficiency = self.efficiency,
                default = DEFAULT_EFFICIENCY,
                "efficiency must lie in (0, 1]; using default"
            );
            self.efficiency = DEFAULT_EFFICIENCY;
        }
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy.name().to_string());
        self
    }
}
