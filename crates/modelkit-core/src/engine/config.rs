use crate::core::error::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TARGET_OCCUPANCY: f64 = 10.0;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::InvalidValue(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonbondedAlgorithm {
    /// Uniform voxel grid; near-linear in the number of particles.
    #[default]
    Grid,
    /// Every pair is tested; only sensible for small particle sets.
    Quadratic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct GridConfig {
    /// Expected number of particles per voxel used to size the grid.
    #[serde(default = "default_target_occupancy")]
    pub target_occupancy: f64,
}

fn default_target_occupancy() -> f64 {
    DEFAULT_TARGET_OCCUPANCY
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            target_occupancy: DEFAULT_TARGET_OCCUPANCY,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_occupancy.is_finite() && self.target_occupancy > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "target_occupancy",
                reason: format!("must be positive and finite, got {}", self.target_occupancy),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NonbondedConfig {
    /// Pairs whose surface distance is at most this value are reported.
    pub cutoff: f64,
    /// Motion tolerated before the cached candidate list must be rebuilt.
    pub slack: f64,
    /// Upper bound on the candidate list; exceeding it fails the rebuild.
    #[serde(default)]
    pub max_candidates: Option<usize>,
    #[serde(default)]
    pub algorithm: NonbondedAlgorithm,
    #[serde(default)]
    pub grid: GridConfig,
}

impl NonbondedConfig {
    pub fn new(cutoff: f64, slack: f64) -> Result<Self, ConfigError> {
        NonbondedConfigBuilder::new().cutoff(cutoff).slack(slack).build()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_distance("cutoff", self.cutoff)?;
        validate_distance("slack", self.slack)?;
        self.grid.validate()
    }
}

fn validate_distance(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be a non-negative finite distance, got {value}"),
        });
    }
    Ok(())
}

#[derive(Default)]
pub struct NonbondedConfigBuilder {
    cutoff: Option<f64>,
    slack: Option<f64>,
    max_candidates: Option<usize>,
    algorithm: Option<NonbondedAlgorithm>,
    target_occupancy: Option<f64>,
}

impl NonbondedConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }
    pub fn slack(mut self, slack: f64) -> Self {
        self.slack = Some(slack);
        self
    }
    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = Some(max);
        self
    }
    pub fn algorithm(mut self, algorithm: NonbondedAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
    pub fn target_occupancy(mut self, occupancy: f64) -> Self {
        self.target_occupancy = Some(occupancy);
        self
    }

    pub fn build(self) -> Result<NonbondedConfig, ConfigError> {
        let config = NonbondedConfig {
            cutoff: self
                .cutoff
                .ok_or(ConfigError::MissingParameter("cutoff"))?,
            slack: self.slack.ok_or(ConfigError::MissingParameter("slack"))?,
            max_candidates: self.max_candidates,
            algorithm: self.algorithm.unwrap_or_default(),
            grid: GridConfig {
                target_occupancy: self
                    .target_occupancy
                    .unwrap_or(DEFAULT_TARGET_OCCUPANCY),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_config_with_defaults() {
        let config = NonbondedConfigBuilder::new()
            .cutoff(5.0)
            .slack(1.0)
            .build()
            .unwrap();
        assert_eq!(config.cutoff, 5.0);
        assert_eq!(config.slack, 1.0);
        assert_eq!(config.max_candidates, None);
        assert_eq!(config.algorithm, NonbondedAlgorithm::Grid);
        assert_eq!(config.grid.target_occupancy, DEFAULT_TARGET_OCCUPANCY);
    }

    #[test]
    fn builder_reports_missing_parameters() {
        let result = NonbondedConfigBuilder::new().slack(1.0).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("cutoff")));
        let result = NonbondedConfigBuilder::new().cutoff(1.0).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("slack")));
    }

    #[test]
    fn negative_or_non_finite_distances_are_rejected() {
        assert!(matches!(
            NonbondedConfig::new(-1.0, 0.5),
            Err(ConfigError::InvalidParameter { name: "cutoff", .. })
        ));
        assert!(matches!(
            NonbondedConfig::new(1.0, -0.5),
            Err(ConfigError::InvalidParameter { name: "slack", .. })
        ));
        assert!(NonbondedConfig::new(f64::NAN, 0.5).is_err());
        assert!(
            NonbondedConfigBuilder::new()
                .cutoff(1.0)
                .slack(0.0)
                .target_occupancy(0.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn config_errors_convert_to_value_errors() {
        let err: ModelError = ConfigError::MissingParameter("slack").into();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Value);
    }

    #[test]
    fn deserializes_from_toml_with_defaults() {
        let config: NonbondedConfig = toml::from_str(
            r#"
            cutoff = 6.0
            slack = 1.5
            algorithm = "quadratic"
            "#,
        )
        .unwrap();
        assert_eq!(config.cutoff, 6.0);
        assert_eq!(config.algorithm, NonbondedAlgorithm::Quadratic);
        assert_eq!(config.grid, GridConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_toml_fields_are_rejected() {
        let result: Result<NonbondedConfig, _> = toml::from_str("cutoff = 1.0\nslack = 0.1\nbogus = 3\n");
        assert!(result.is_err());
    }
}
