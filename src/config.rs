//! Run configuration.
//!
//! Options can come from a JSON file; fields left out take their defaults,
//! which match the usual four-chain run of 1000 tuning and 2000 retained
//! iterations at a 0.9 acceptance target.

use crate::error::{CctError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Options controlling the compound sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Retained draws per chain.
    pub draws: usize,
    /// Tuning iterations per chain, discarded before recording.
    pub tune: usize,
    /// Number of independent chains.
    pub chains: usize,
    /// Target mean acceptance probability for step-size adaptation.
    pub target_accept: f64,
    /// Base seed; each chain derives its own stream from it.
    pub seed: u64,
    /// Maximum number of trajectory doublings per NUTS transition.
    pub max_treedepth: usize,
    /// Fraction of divergent draws above which a run is unreliable.
    pub max_divergence_rate: f64,
    /// Half-width of the uniform jitter applied to initial unconstrained
    /// competences.
    pub jitter: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 2000,
            tune: 1000,
            chains: 4,
            target_accept: 0.9,
            seed: 42,
            max_treedepth: 10,
            max_divergence_rate: 0.05,
            jitter: 1.0,
        }
    }
}

impl SamplerConfig {
    /// Checks every option before any sampling starts.
    pub fn validate(&self) -> Result<()> {
        if self.draws == 0 {
            return Err(CctError::Config("draws must be positive".into()));
        }
        if self.chains == 0 {
            return Err(CctError::Config("chains must be positive".into()));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(CctError::Config(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if self.max_treedepth == 0 {
            return Err(CctError::Config("max_treedepth must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.max_divergence_rate) {
            return Err(CctError::Config(format!(
                "max_divergence_rate must lie in [0, 1], got {}",
                self.max_divergence_rate
            )));
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(CctError::Config(format!(
                "jitter must be finite and non-negative, got {}",
                self.jitter
            )));
        }
        Ok(())
    }

    /// Total retained samples, `draws × chains`.
    pub fn total_draws(&self) -> usize {
        self.draws * self.chains
    }
}

/// Sampler options plus summary options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sampler options, flattened into the top level of the JSON file.
    #[serde(flatten)]
    pub sampler: SamplerConfig,
    /// Probability mass of the reported highest-density interval.
    pub hdi_prob: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            hdi_prob: 0.94,
        }
    }
}

impl AnalysisConfig {
    /// Reads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| CctError::io(path, err))?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates sampler and summary options.
    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;
        if !(self.hdi_prob > 0.0 && self.hdi_prob < 1.0) {
            return Err(CctError::Config(format!(
                "hdi_prob must lie in (0, 1), got {}",
                self.hdi_prob
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampler.total_draws(), 8000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"draws": 300, "chains": 2, "hdi_prob": 0.9}"#).unwrap();
        assert_eq!(config.sampler.draws, 300);
        assert_eq!(config.sampler.chains, 2);
        assert_eq!(config.sampler.tune, 1000);
        assert_eq!(config.sampler.target_accept, 0.9);
        assert_eq!(config.hdi_prob, 0.9);
    }

    #[test]
    fn test_rejects_out_of_range_options() {
        let mut config = SamplerConfig::default();
        config.target_accept = 1.0;
        assert!(matches!(config.validate(), Err(CctError::Config(_))));
        config.target_accept = f64::NAN;
        assert!(config.validate().is_err());
        let config = SamplerConfig {
            chains: 0,
            ..SamplerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SamplerConfig {
            draws: 0,
            ..SamplerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("cct_config_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run.json");
        fs::write(&path, r#"{"seed": 7, "tune": 10}"#).unwrap();
        let config = AnalysisConfig::from_json_file(&path).unwrap();
        assert_eq!(config.sampler.seed, 7);
        assert_eq!(config.sampler.tune, 10);
        fs::remove_dir_all(&dir).unwrap();
    }
}
