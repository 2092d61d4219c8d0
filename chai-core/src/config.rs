use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DependencyType;

/// Top-level CHAI configuration, matching `chai.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaiConfig {
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub rank: RankConfig,
}

impl ChaiConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::NotFound(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rank.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Queue cached packages missing from the batch for deletion.
    pub full_reconciliation: bool,
}

/// TeaRank settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Probability of following a dependency edge rather than teleporting.
    pub damping: f64,
    /// Stop once the L1 change between iterations drops below this.
    pub tolerance: f64,
    pub max_iterations: u32,
    /// Update nodes in parallel within an iteration.
    pub parallel: bool,
    pub weights: EdgeWeights,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-9,
            max_iterations: 100,
            parallel: true,
            weights: EdgeWeights::default(),
        }
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "rank.damping must be in (0, 1), got {}",
                self.damping
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "rank.tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "rank.max_iterations must be at least 1".into(),
            ));
        }
        self.weights.validate()
    }
}

/// Mapping from dependency type to TeaRank edge weight.
///
/// Either a named preset or an explicit table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeWeights {
    Preset(WeightPreset),
    Table(WeightTable),
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self::Preset(WeightPreset::Linear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightPreset {
    /// Runtime 6, build 5, … recommended 1.
    Linear,
    /// Runtime 32, build 16, … recommended 1.
    Geometric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    pub runtime: f64,
    pub build: f64,
    pub test: f64,
    pub development: f64,
    pub optional: f64,
    pub recommended: f64,
}

impl EdgeWeights {
    pub fn weight(&self, dep_type: DependencyType) -> f64 {
        // 6 for runtime down to 1 for recommended.
        let position = f64::from(7 - dep_type.priority());
        match self {
            Self::Preset(WeightPreset::Linear) => position,
            Self::Preset(WeightPreset::Geometric) => 2f64.powf(position - 1.0),
            Self::Table(t) => match dep_type {
                DependencyType::Runtime => t.runtime,
                DependencyType::Build => t.build,
                DependencyType::Test => t.test,
                DependencyType::Development => t.development,
                DependencyType::Optional => t.optional,
                DependencyType::Recommended => t.recommended,
            },
        }
    }

    /// Weights must be finite, positive, and strictly decreasing with priority.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights: Vec<f64> = DependencyType::ALL.iter().map(|t| self.weight(*t)).collect();
        if let Some((t, w)) = DependencyType::ALL
            .iter()
            .zip(&weights)
            .find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(ConfigError::Invalid(format!(
                "rank.weights.{t} must be positive and finite, got {w}"
            )));
        }
        for (i, pair) in weights.windows(2).enumerate() {
            if pair[0] <= pair[1] {
                return Err(ConfigError::Invalid(format!(
                    "rank.weights.{} ({}) must exceed rank.weights.{} ({})",
                    DependencyType::ALL[i],
                    pair[0],
                    DependencyType::ALL[i + 1],
                    pair[1]
                )));
            }
        }
        Ok(())
    }
}
