//! Bandit simulation engine.
//!
//! This module owns everything around the models: the synthetic environment
//! they are evaluated against, the step loop that drives them side by side,
//! run configuration, persistence and batch sweeps.
//!
//! # Overview
//!
//! A run proceeds as follows:
//! 1. Validate a [`RunConfig`] and build the [`Environment`] from its seed
//! 2. Build one model per selected [`StrategyKind`], all seeded identically
//! 3. For every step, let each model choose an arm, draw one reward per
//!    distinct arm and feed that shared reward back to every model that chose it
//! 4. Record the chosen arm and its regret per model
//!
//! # Example
//!
//! ```
//! use ts_bandit_sim::simulation::{
//!     run_simulation, NullSink, RewardDistribution, RunConfig, RunOptions, StrategyKind,
//! };
//!
//! let config = RunConfig::new("doc", 50, 5, 0.5, 3, RewardDistribution::Binomial, 1)
//!     .with_models(vec![StrategyKind::BetaPriorsSampling, StrategyKind::GaussianPriorsSampling]);
//!
//! let history = run_simulation(&config, NullSink, RunOptions::default()).unwrap();
//! assert_eq!(history.regrets(StrategyKind::BetaPriorsSampling).len(), 50);
//! ```
//!
//! # Regret
//!
//! ```text
//! expected_rewards = X^T theta + bias
//! regret(arm)      = max(expected_rewards) - expected_rewards[arm]
//! ```
//!
//! Regret is computed from the environment's expected rewards, never from the
//! noisy observed reward, so it is non-negative and zero exactly for the best arm.

pub mod config;
pub mod environment;
pub mod error;
pub mod runner;
pub mod storage;
pub mod strategy;
pub mod sweep;

pub use config::{
    uniquize_experiment_name, ConfigError, EnvironmentParams, RewardDistribution, RunConfig,
    RunOptions, StrategyParams,
};
pub use environment::Environment;
pub use error::SimError;
pub use runner::{
    run_simulation, save_run_parameters, Choice, RunHistory, RunSummary, Simulation, StepRecord,
    StrategySummary,
};
pub use storage::{DirectorySink, LogSink, NullSink};
pub use strategy::{SamplingStrategy, StrategyKind};
pub use sweep::{
    write_jobs, EnvironmentModels, EnvironmentOverride, Hyperparameter, HyperparameterRange,
    HyperparameterValue, ModelGrid, SweepSpec,
};
