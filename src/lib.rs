//! # Thompson Sampling Bandit Simulator
//!
//! Compares Thompson sampling variants on synthetic multi-armed bandits whose
//! expected rewards are a linear function of per-arm context vectors plus an
//! arm-specific bias.
//!
//! ## Features
//!
//! - **Four models**: Beta-Bernoulli, independent Gaussian, linear-Gaussian
//!   and linear semi-parametric Thompson sampling
//! - **Reproducible runs**: every component owns a generator seeded from the
//!   run seed, and the order of draws within a step is fixed
//! - **Shared rewards**: models that pick the same arm on a step see the same reward
//! - **Persistence**: environment, periodic model snapshots and regret
//!   histories written through a pluggable sink
//! - **Sweeps**: Cartesian-product experiment generation, run in parallel
//!
//! ## Quick Start
//!
//! ```
//! use ts_bandit_sim::simulation::{run_simulation, NullSink, RewardDistribution, RunConfig, RunOptions};
//! use ts_bandit_sim::StrategyKind;
//!
//! let config = RunConfig::new("quick", 100, 10, 0.5, 5, RewardDistribution::Normal, 1)
//!     .with_models(vec![StrategyKind::LinearSemiParametricSampling])
//!     .with_sigmas(1.0, 1.0, 1.0);
//!
//! let history = run_simulation(&config, NullSink, RunOptions::default()).unwrap();
//! let regret = history.cumulative_regret(StrategyKind::LinearSemiParametricSampling);
//! println!("final cumulative regret: {:.2}", regret[regret.len() - 1]);
//! ```
//!
//! ## Modules
//!
//! - [`models`]: The Thompson sampling models
//! - [`simulation`]: Environment, step loop, configuration, persistence, sweeps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Simulation loop                          │
//! │  - choose arms          - one reward per distinct arm           │
//! │  - shared observations  - regret histories + snapshots          │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                        │                        │
//!          ▼                        ▼                        ▼
//!   ┌─────────────┐      ┌─────────────────────┐      ┌─────────────┐
//!   │ Environment │      │  SamplingStrategy   │      │   LogSink   │
//!   │ X, theta,   │      │  Beta │ Gaussian │  │      │ Directory / │
//!   │ bias        │      │  Linear │ SemiPar  │      │ Null        │
//!   └─────────────┘      └─────────────────────┘      └─────────────┘
//! ```

#![warn(missing_docs)]

/// Thompson sampling models.
///
/// One module per model plus the [`models::Strategy`] enum that dispatches
/// between them.
pub mod models;

/// Simulation engine.
///
/// Environment, run loop, configuration, persistence and batch sweeps.
pub mod simulation;

pub use models::Strategy;
pub use simulation::{
    Environment, RewardDistribution, RunConfig, RunHistory, SamplingStrategy, SimError,
    Simulation, StrategyKind,
};
