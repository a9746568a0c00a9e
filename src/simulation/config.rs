//! Configuration for a single simulation run.
//!
//! A [`RunConfig`] carries everything the loop needs: environment shape,
//! step count, snapshot cadence, the list of models and their
//! hyperparameters. It can be built in code with the builder methods, parsed
//! from the `simulate` command line, or loaded from a JSON file.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulation::error::SimError;
use crate::simulation::strategy::StrategyKind;

/// Reward family emitted by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardDistribution {
    /// Gaussian with the arm's expected reward as mean and unit variance.
    Normal,
    /// Bernoulli with the arm's expected reward as success probability.
    Binomial,
}

impl RewardDistribution {
    /// External name of the distribution.
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardDistribution::Normal => "normal",
            RewardDistribution::Binomial => "binomial",
        }
    }
}

impl fmt::Display for RewardDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardDistribution {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(RewardDistribution::Normal),
            "binomial" => Ok(RewardDistribution::Binomial),
            other => Err(SimError::UnsupportedRewardDistribution(other.to_string())),
        }
    }
}

/// Configuration for one simulation run.
///
/// # Example
/// ```
/// use ts_bandit_sim::simulation::{RewardDistribution, RunConfig, StrategyKind};
///
/// let config = RunConfig::new("demo", 100, 10, 0.5, 5, RewardDistribution::Binomial, 1)
///     .with_models(vec![StrategyKind::BetaPriorsSampling]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Experiment name, used as the log directory name.
    pub name: String,

    /// Number of interaction steps.
    pub steps: u64,

    /// Model snapshots are persisted on every `save_every`-th step.
    #[serde(default = "default_save_every")]
    pub save_every: u64,

    /// Number of arms.
    pub arms_nb: usize,

    /// L2 norm of the true linear parameter vector, in `[0, 1]`.
    pub a: f64,

    /// Dimensionality of the context vectors.
    pub d: usize,

    /// Reward family.
    pub reward_distribution: RewardDistribution,

    /// Seed for the environment and every model.
    pub seed: u64,

    /// Semi-parametric: std of reward given expected reward.
    #[serde(default)]
    pub sigma_1: Option<f64>,

    /// Semi-parametric: std of expected reward given the linear parameter.
    #[serde(default)]
    pub sigma_2: Option<f64>,

    /// Semi-parametric: std of the linear parameter.
    #[serde(default)]
    pub sigma_3: Option<f64>,

    /// Linear-Gaussian posterior scale.
    #[serde(default)]
    pub v: Option<f64>,

    /// Models to run side by side, in call order.
    pub models: Vec<StrategyKind>,
}

fn default_save_every() -> u64 {
    1
}

impl RunConfig {
    /// Create a configuration without models or hyperparameters.
    pub fn new(
        name: impl Into<String>,
        steps: u64,
        arms_nb: usize,
        a: f64,
        d: usize,
        reward_distribution: RewardDistribution,
        seed: u64,
    ) -> Self {
        Self {
            name: name.into(),
            steps,
            save_every: default_save_every(),
            arms_nb,
            a,
            d,
            reward_distribution,
            seed,
            sigma_1: None,
            sigma_2: None,
            sigma_3: None,
            v: None,
            models: Vec::new(),
        }
    }

    /// Builder method: set the models to run.
    pub fn with_models(mut self, models: Vec<StrategyKind>) -> Self {
        self.models = models;
        self
    }

    /// Builder method: set the snapshot cadence.
    pub fn with_save_every(mut self, save_every: u64) -> Self {
        self.save_every = save_every;
        self
    }

    /// Builder method: set the linear-Gaussian scale `v`.
    pub fn with_v(mut self, v: f64) -> Self {
        self.v = Some(v);
        self
    }

    /// Builder method: set the three semi-parametric noise levels.
    pub fn with_sigmas(mut self, sigma_1: f64, sigma_2: f64, sigma_3: f64) -> Self {
        self.sigma_1 = Some(sigma_1);
        self.sigma_2 = Some(sigma_2);
        self.sigma_3 = Some(sigma_3);
        self
    }

    /// Environment constructor arguments.
    pub fn environment_params(&self) -> EnvironmentParams {
        EnvironmentParams {
            arms_nb: self.arms_nb,
            a: self.a,
            d: self.d,
            reward_distribution: self.reward_distribution,
            seed: self.seed,
        }
    }

    /// Constructor arguments for one model, checking its hyperparameters.
    pub fn strategy_params(&self, kind: StrategyKind) -> Result<StrategyParams, ConfigError> {
        let require = |value: Option<f64>, name: &'static str| -> Result<f64, ConfigError> {
            let value = value.ok_or(ConfigError::MissingHyperparameter {
                strategy: kind,
                name,
            })?;
            if value.is_finite() && value > 0.0 {
                Ok(value)
            } else {
                Err(ConfigError::InvalidValue {
                    field: name,
                    reason: format!("must be a positive finite number, got {}", value),
                })
            }
        };

        let params = match kind {
            StrategyKind::BetaPriorsSampling => StrategyParams::BetaPriors {
                arms_nb: self.arms_nb,
                seed: self.seed,
            },
            StrategyKind::GaussianPriorsSampling => StrategyParams::GaussianPriors {
                arms_nb: self.arms_nb,
                seed: self.seed,
            },
            StrategyKind::LinearGaussianSampling => StrategyParams::LinearGaussian {
                arms_nb: self.arms_nb,
                d: self.d,
                v: require(self.v, "v")?,
                seed: self.seed,
            },
            StrategyKind::LinearSemiParametricSampling => StrategyParams::LinearSemiParametric {
                arms_nb: self.arms_nb,
                d: self.d,
                sigma_1: require(self.sigma_1, "sigma_1")?,
                sigma_2: require(self.sigma_2, "sigma_2")?,
                sigma_3: require(self.sigma_3, "sigma_3")?,
                seed: self.seed,
            },
        };
        Ok(params)
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.save_every == 0 {
            return Err(ConfigError::InvalidValue {
                field: "save_every",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.arms_nb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "arms_nb",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.d == 0 {
            return Err(ConfigError::InvalidValue {
                field: "d",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.a) {
            return Err(ConfigError::InvalidValue {
                field: "a",
                reason: format!("{} is out of range [0, 1]", self.a),
            });
        }
        if self.models.is_empty() {
            return Err(ConfigError::NoStrategies);
        }

        for (i, kind) in self.models.iter().enumerate() {
            if self.models[..i].contains(kind) {
                return Err(ConfigError::DuplicateStrategy(*kind));
            }
            self.strategy_params(*kind)?;
        }

        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Arguments the environment is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentParams {
    /// Number of arms (`N`).
    pub arms_nb: usize,
    /// Norm of the true parameter vector.
    pub a: f64,
    /// Context dimensionality.
    pub d: usize,
    /// Reward family.
    pub reward_distribution: RewardDistribution,
    /// Seed of the environment's generator.
    pub seed: u64,
}

/// Arguments one model is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StrategyParams {
    /// Beta-Bernoulli model.
    BetaPriors {
        /// Number of arms.
        arms_nb: usize,
        /// Generator seed.
        seed: u64,
    },
    /// Independent Gaussian model.
    GaussianPriors {
        /// Number of arms.
        arms_nb: usize,
        /// Generator seed.
        seed: u64,
    },
    /// Linear-Gaussian model.
    LinearGaussian {
        /// Number of arms.
        arms_nb: usize,
        /// Context dimensionality.
        d: usize,
        /// Posterior scale.
        v: f64,
        /// Generator seed.
        seed: u64,
    },
    /// Semi-parametric model.
    LinearSemiParametric {
        /// Number of arms.
        arms_nb: usize,
        /// Context dimensionality.
        d: usize,
        /// Reward noise.
        sigma_1: f64,
        /// Arm deviation from the linear trend.
        sigma_2: f64,
        /// Prior std of the linear parameter.
        sigma_3: f64,
        /// Generator seed.
        seed: u64,
    },
}

impl StrategyParams {
    /// Which model these arguments build.
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyParams::BetaPriors { .. } => StrategyKind::BetaPriorsSampling,
            StrategyParams::GaussianPriors { .. } => StrategyKind::GaussianPriorsSampling,
            StrategyParams::LinearGaussian { .. } => StrategyKind::LinearGaussianSampling,
            StrategyParams::LinearSemiParametric { .. } => {
                StrategyKind::LinearSemiParametricSampling
            }
        }
    }
}

/// Options that affect how a run is executed but not its results.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Draw a progress bar on stderr while stepping.
    pub show_progress: bool,
}

/// Errors that can occur when validating or loading a run configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A field is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// A selected model needs a hyperparameter that was not given.
    #[error("{strategy} requires hyperparameter {name}")]
    MissingHyperparameter {
        /// Model missing the value.
        strategy: StrategyKind,
        /// Hyperparameter name.
        name: &'static str,
    },
    /// The same model was listed twice.
    #[error("strategy {0} listed more than once")]
    DuplicateStrategy(StrategyKind),
    /// No models were selected.
    #[error("at least one strategy must be selected")]
    NoStrategies,
    /// Reading the config file failed.
    #[error("failed to read config: {0}")]
    IoError(String),
    /// The config file is not valid JSON for a run.
    #[error("failed to parse config: {0}")]
    ParseError(String),
}

/// Append a wall-clock timestamp so repeated runs never share a log directory.
///
/// The suffix has the form `YYYYmmdd_HHMMSSffffff` (local time, microseconds).
pub fn uniquize_experiment_name(name: &str) -> String {
    format!("{}_{}", name, timestamp_suffix(&chrono::Local::now()))
}

fn timestamp_suffix<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    now.format("%Y%m%d_%H%M%S%6f").to_string()
}
