//! Batch experiment generation.
//!
//! A [`SweepSpec`] describes a family of runs: a few reward distributions,
//! seeds and parameter norms, which models to try per distribution and,
//! optionally, a grid of hyperparameters per model. [`SweepSpec::expand`]
//! turns it into one [`RunConfig`] per job.
//!
//! # Expansion order
//!
//! ```text
//! for distribution in reward_distributions
//!   for seed in seeds
//!     for a in a_values
//!       if the distribution has grid points:
//!         for (model, point) in grid points   -> one single-model job each
//!       else:                                 -> one job with every model
//! ```
//!
//! Grid points are the Cartesian product of each model's hyperparameter
//! ranges, last range varying fastest. Only models available for the
//! distribution contribute points; a model listed with an empty grid
//! contributes exactly one point. Environment overrides keyed by
//! `(distribution, a)` are applied first and grid values win over them.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::simulation::config::{ConfigError, RewardDistribution, RunConfig};
use crate::simulation::error::SimError;
use crate::simulation::strategy::StrategyKind;

/// A tunable model hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hyperparameter {
    /// Semi-parametric reward noise.
    #[serde(rename = "sigma_1")]
    Sigma1,
    /// Semi-parametric arm deviation.
    #[serde(rename = "sigma_2")]
    Sigma2,
    /// Semi-parametric parameter prior.
    #[serde(rename = "sigma_3")]
    Sigma3,
    /// Linear-Gaussian posterior scale.
    #[serde(rename = "v")]
    V,
}

impl Hyperparameter {
    fn apply(self, config: &mut RunConfig, value: f64) {
        let slot = match self {
            Hyperparameter::Sigma1 => &mut config.sigma_1,
            Hyperparameter::Sigma2 => &mut config.sigma_2,
            Hyperparameter::Sigma3 => &mut config.sigma_3,
            Hyperparameter::V => &mut config.v,
        };
        *slot = Some(value);
    }
}

/// A fixed hyperparameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterValue {
    /// Which hyperparameter.
    pub name: Hyperparameter,
    /// Its value.
    pub value: f64,
}

/// Candidate values for one hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterRange {
    /// Which hyperparameter.
    pub name: Hyperparameter,
    /// Values to try, in order.
    pub values: Vec<f64>,
}

/// Hyperparameter grid for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGrid {
    /// Model the grid applies to.
    pub model: StrategyKind,
    /// Ranges combined by Cartesian product; empty means a single point.
    #[serde(default)]
    pub grid: Vec<HyperparameterRange>,
}

impl ModelGrid {
    fn points(&self) -> Vec<Vec<HyperparameterValue>> {
        let mut points = vec![Vec::new()];
        for range in &self.grid {
            points = points
                .into_iter()
                .flat_map(|point| {
                    range.values.iter().map(move |&value| {
                        let mut point = point.clone();
                        point.push(HyperparameterValue {
                            name: range.name,
                            value,
                        });
                        point
                    })
                })
                .collect();
        }
        points
    }
}

/// Models to run against one reward distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentModels {
    /// Reward distribution.
    pub reward_distribution: RewardDistribution,
    /// Models compatible with it.
    pub models: Vec<StrategyKind>,
}

/// Hyperparameters fixed for one `(distribution, a)` environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentOverride {
    /// Reward distribution.
    pub reward_distribution: RewardDistribution,
    /// Parameter norm.
    pub a: f64,
    /// Values to set.
    pub hyperparameters: Vec<HyperparameterValue>,
}

fn default_save_every() -> u64 {
    1
}

/// Description of a batch of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    /// Steps per run.
    pub steps: u64,
    /// Snapshot interval per run.
    #[serde(default = "default_save_every")]
    pub save_every: u64,
    /// Number of arms.
    pub arms_nb: usize,
    /// Context dimensionality.
    pub d: usize,
    /// Distributions to sweep, in order.
    pub reward_distributions: Vec<RewardDistribution>,
    /// Available models per distribution.
    pub models_for_environment: Vec<EnvironmentModels>,
    /// Seeds to sweep.
    pub seeds: Vec<u64>,
    /// Parameter norms to sweep.
    pub a_values: Vec<f64>,
    /// Per-model hyperparameter grids.
    #[serde(default)]
    pub hp_tuning: Vec<ModelGrid>,
    /// Per-environment fixed hyperparameters.
    #[serde(default)]
    pub environment_overrides: Vec<EnvironmentOverride>,
    /// Run name template; `{i}` is replaced by the job index.
    pub name_format: String,
}

impl SweepSpec {
    /// Load a spec from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn models_for(&self, distribution: RewardDistribution) -> Result<&[StrategyKind], ConfigError> {
        self.models_for_environment
            .iter()
            .find(|entry| entry.reward_distribution == distribution)
            .map(|entry| entry.models.as_slice())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "models_for_environment",
                reason: format!("no models listed for {}", distribution),
            })
    }

    fn overrides_for(&self, distribution: RewardDistribution, a: f64) -> &[HyperparameterValue] {
        self.environment_overrides
            .iter()
            .find(|o| o.reward_distribution == distribution && o.a == a)
            .map(|o| o.hyperparameters.as_slice())
            .unwrap_or(&[])
    }

    /// Expand into one validated configuration per job.
    pub fn expand(&self) -> Result<Vec<RunConfig>, ConfigError> {
        if !self.name_format.contains("{i}") {
            return Err(ConfigError::InvalidValue {
                field: "name_format",
                reason: "must contain {i}".to_string(),
            });
        }

        let mut configs = Vec::new();
        for &distribution in &self.reward_distributions {
            let available = self.models_for(distribution)?;
            let grid_points: Vec<(StrategyKind, Vec<HyperparameterValue>)> = self
                .hp_tuning
                .iter()
                .filter(|grid| available.contains(&grid.model))
                .flat_map(|grid| grid.points().into_iter().map(move |p| (grid.model, p)))
                .collect();

            for &seed in &self.seeds {
                for &a in &self.a_values {
                    let mut base = RunConfig::new(
                        String::new(),
                        self.steps,
                        self.arms_nb,
                        a,
                        self.d,
                        distribution,
                        seed,
                    )
                    .with_save_every(self.save_every);
                    for setting in self.overrides_for(distribution, a) {
                        setting.name.apply(&mut base, setting.value);
                    }

                    if grid_points.is_empty() {
                        configs.push(base.with_models(available.to_vec()));
                    } else {
                        for (model, point) in &grid_points {
                            let mut config = base.clone().with_models(vec![*model]);
                            for setting in point {
                                setting.name.apply(&mut config, setting.value);
                            }
                            configs.push(config);
                        }
                    }
                }
            }
        }

        for (i, config) in configs.iter_mut().enumerate() {
            config.name = self.name_format.replace("{i}", &i.to_string());
            config.validate()?;
        }

        tracing::debug!(jobs = configs.len(), "expanded sweep");
        Ok(configs)
    }
}

/// Write each configuration to `<dir>/job_<i>.json`, recreating `dir`.
pub fn write_jobs<P: AsRef<Path>>(configs: &[RunConfig], dir: P) -> Result<Vec<PathBuf>, SimError> {
    let dir = dir.as_ref();
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    let mut paths = Vec::with_capacity(configs.len());
    for (i, config) in configs.iter().enumerate() {
        let path = dir.join(format!("job_{}.json", i));
        let json = serde_json::to_string_pretty(config)?;
        let mut file = File::create(&path)?;
        file.write_all(json.as_bytes())?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_models() -> Vec<StrategyKind> {
        vec![
            StrategyKind::LinearSemiParametricSampling,
            StrategyKind::LinearGaussianSampling,
            StrategyKind::GaussianPriorsSampling,
            StrategyKind::BetaPriorsSampling,
        ]
    }

    fn environments() -> Vec<EnvironmentModels> {
        vec![
            EnvironmentModels {
                reward_distribution: RewardDistribution::Binomial,
                models: all_models(),
            },
            EnvironmentModels {
                reward_distribution: RewardDistribution::Normal,
                models: all_models()[..3].to_vec(),
            },
        ]
    }

    fn range(name: Hyperparameter) -> HyperparameterRange {
        HyperparameterRange {
            name,
            values: vec![0.1, 1.0, 10.0],
        }
    }

    fn tuning_spec() -> SweepSpec {
        SweepSpec {
            steps: 25_000,
            save_every: 1_000,
            arms_nb: 1_000,
            d: 5,
            reward_distributions: vec![RewardDistribution::Binomial, RewardDistribution::Normal],
            models_for_environment: environments(),
            seeds: vec![1, 2, 3],
            a_values: vec![0.5, 1.0],
            hp_tuning: vec![
                ModelGrid {
                    model: StrategyKind::LinearSemiParametricSampling,
                    grid: vec![
                        range(Hyperparameter::Sigma1),
                        range(Hyperparameter::Sigma2),
                        range(Hyperparameter::Sigma3),
                    ],
                },
                ModelGrid {
                    model: StrategyKind::LinearGaussianSampling,
                    grid: vec![range(Hyperparameter::V)],
                },
                ModelGrid {
                    model: StrategyKind::GaussianPriorsSampling,
                    grid: vec![],
                },
                ModelGrid {
                    model: StrategyKind::BetaPriorsSampling,
                    grid: vec![],
                },
            ],
            environment_overrides: vec![],
            name_format: "hp_tuning_{i}".to_string(),
        }
    }

    fn overrides(distribution: RewardDistribution, a: f64, sigma_1: f64, sigma_3: f64) -> EnvironmentOverride {
        let value = |name, value| HyperparameterValue { name, value };
        EnvironmentOverride {
            reward_distribution: distribution,
            a,
            hyperparameters: vec![
                value(Hyperparameter::Sigma1, sigma_1),
                value(Hyperparameter::Sigma2, 0.1),
                value(Hyperparameter::Sigma3, sigma_3),
                value(Hyperparameter::V, 1.0),
            ],
        }
    }

    fn final_spec() -> SweepSpec {
        SweepSpec {
            steps: 200_000,
            save_every: 50_000,
            hp_tuning: vec![],
            environment_overrides: vec![
                overrides(RewardDistribution::Binomial, 0.5, 0.1, 0.1),
                overrides(RewardDistribution::Binomial, 1.0, 0.1, 1.0),
                overrides(RewardDistribution::Normal, 0.5, 1.0, 0.1),
                overrides(RewardDistribution::Normal, 1.0, 1.0, 0.1),
            ],
            seeds: vec![4, 5, 6],
            name_format: "final_experiment_{i}".to_string(),
            ..tuning_spec()
        }
    }

    #[test]
    fn test_tuning_job_count() {
        // binomial: 27 + 3 + 1 + 1 points, normal: 27 + 3 + 1, each over 3 seeds x 2 norms
        let configs = tuning_spec().expand().unwrap();
        assert_eq!(configs.len(), (32 + 31) * 6);
        assert!(configs.iter().all(|c| c.models.len() == 1));
    }

    #[test]
    fn test_tuning_job_order() {
        let configs = tuning_spec().expand().unwrap();

        let first = &configs[0];
        assert_eq!(first.name, "hp_tuning_0");
        assert_eq!(first.reward_distribution, RewardDistribution::Binomial);
        assert_eq!((first.seed, first.a), (1, 0.5));
        assert_eq!(first.models, vec![StrategyKind::LinearSemiParametricSampling]);
        assert_eq!((first.sigma_1, first.sigma_2, first.sigma_3), (Some(0.1), Some(0.1), Some(0.1)));

        // last grid value varies fastest
        assert_eq!(configs[1].sigma_3, Some(1.0));
        assert_eq!(configs[1].sigma_1, Some(0.1));
        assert_eq!(configs[9].sigma_1, Some(1.0));

        assert_eq!(configs[27].models, vec![StrategyKind::LinearGaussianSampling]);
        assert_eq!(configs[27].v, Some(0.1));
        assert_eq!(configs[30].models, vec![StrategyKind::GaussianPriorsSampling]);
        assert_eq!(configs[31].models, vec![StrategyKind::BetaPriorsSampling]);

        // next block: same seed, next norm
        assert_eq!((configs[32].seed, configs[32].a), (1, 1.0));
        assert_eq!((configs[64].seed, configs[64].a), (2, 0.5));

        let normal = &configs[192];
        assert_eq!(normal.reward_distribution, RewardDistribution::Normal);
        assert_eq!(normal.name, "hp_tuning_192");
        assert!(configs[192..]
            .iter()
            .all(|c| c.models != vec![StrategyKind::BetaPriorsSampling]));
    }

    #[test]
    fn test_final_experiment_uses_overrides() {
        let configs = final_spec().expand().unwrap();
        assert_eq!(configs.len(), 12);

        assert_eq!(configs[0].models, all_models());
        assert_eq!(configs[0].steps, 200_000);
        assert_eq!(configs[0].save_every, 50_000);
        assert_eq!(configs[1].a, 1.0);
        assert_eq!(configs[1].sigma_3, Some(1.0));
        assert_eq!(configs[0].sigma_3, Some(0.1));

        let normal = &configs[6];
        assert_eq!(normal.reward_distribution, RewardDistribution::Normal);
        assert_eq!(normal.models.len(), 3);
        assert_eq!(normal.sigma_1, Some(1.0));
        assert_eq!(normal.v, Some(1.0));
    }

    #[test]
    fn test_missing_hyperparameters_fail_expansion() {
        let spec = SweepSpec {
            environment_overrides: vec![],
            ..final_spec()
        };
        assert!(matches!(
            spec.expand(),
            Err(ConfigError::MissingHyperparameter { .. })
        ));
    }

    #[test]
    fn test_name_format_requires_index() {
        let spec = SweepSpec {
            name_format: "static".to_string(),
            ..tuning_spec()
        };
        assert!(matches!(
            spec.expand(),
            Err(ConfigError::InvalidValue { field: "name_format", .. })
        ));
    }

    #[test]
    fn test_spec_json_round_trip() {
        let json = serde_json::to_string(&tuning_spec()).unwrap();
        assert!(json.contains("\"sigma_1\""));
        let parsed: SweepSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tuning_spec());
    }

    #[test]
    fn test_write_jobs() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("jobs");
        let configs = final_spec().expand().unwrap();

        let paths = write_jobs(&configs, &dir).unwrap();
        assert_eq!(paths.len(), 12);
        assert_eq!(paths[3], dir.join("job_3.json"));

        let loaded = RunConfig::from_json_file(&paths[3]).unwrap();
        assert_eq!(loaded, configs[3]);
    }
}
