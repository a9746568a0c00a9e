//! Thompson sampling models.
//!
//! # Overview
//!
//! Each model keeps a posterior over the arms' expected rewards. To choose an
//! arm it draws one sample from that posterior and picks the arm whose
//! sampled value is largest (ties go to the lowest index). Observing a reward
//! updates the posterior and discards the cached sample.
//!
//! | Model | Posterior | Needs context |
//! |-------|-----------|---------------|
//! | [`BetaPriorsSampling`] | `Beta(S + 1, F + 1)` per arm | no |
//! | [`GaussianPriorsSampling`] | `N(mi, 1 / (k + 1))` per arm | no |
//! | [`LinearGaussianSampling`] | `N(B^-1 f, v^2 B^-1)` shared | yes |
//! | [`LinearSemiParametricSampling`] | `theta ~ N(A^-1 b, A^-1)`, then `gamma_j` per arm | yes |
//!
//! [`Strategy`] wraps the four variants so the simulation loop can hold a
//! heterogeneous list and serialize snapshots without boxing.

pub mod beta_priors;
pub mod gaussian_priors;
pub mod linear_gaussian;
pub mod linear_semi_parametric;
pub(crate) mod sampling;

pub use beta_priors::BetaPriorsSampling;
pub use gaussian_priors::GaussianPriorsSampling;
pub use linear_gaussian::LinearGaussianSampling;
pub use linear_semi_parametric::LinearSemiParametricSampling;

use std::sync::Arc;

use nalgebra::DMatrix;
use serde::Serialize;

use crate::simulation::config::StrategyParams;
use crate::simulation::error::SimError;
use crate::simulation::strategy::{SamplingStrategy, StrategyKind};

/// Any of the supported models.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Strategy {
    /// Beta-Bernoulli model.
    BetaPriors(BetaPriorsSampling),
    /// Independent Gaussian model.
    GaussianPriors(GaussianPriorsSampling),
    /// Linear-Gaussian model.
    LinearGaussian(LinearGaussianSampling),
    /// Semi-parametric model.
    LinearSemiParametric(LinearSemiParametricSampling),
}

impl Strategy {
    /// Build a model from its arguments. Linear models keep a handle to `context`.
    pub fn new(params: &StrategyParams, context: &Arc<DMatrix<f64>>) -> Result<Self, SimError> {
        let strategy = match *params {
            StrategyParams::BetaPriors { arms_nb, seed } => {
                Strategy::BetaPriors(BetaPriorsSampling::new(arms_nb, seed))
            }
            StrategyParams::GaussianPriors { arms_nb, seed } => {
                Strategy::GaussianPriors(GaussianPriorsSampling::new(arms_nb, seed))
            }
            StrategyParams::LinearGaussian { arms_nb, d, v, seed } => Strategy::LinearGaussian(
                LinearGaussianSampling::new(arms_nb, d, Arc::clone(context), v, seed)?,
            ),
            StrategyParams::LinearSemiParametric {
                arms_nb,
                d,
                sigma_1,
                sigma_2,
                sigma_3,
                seed,
            } => Strategy::LinearSemiParametric(LinearSemiParametricSampling::new(
                arms_nb,
                d,
                Arc::clone(context),
                sigma_1,
                sigma_2,
                sigma_3,
                seed,
            )?),
        };
        Ok(strategy)
    }

    fn inner(&self) -> &dyn SamplingStrategy {
        match self {
            Strategy::BetaPriors(model) => model,
            Strategy::GaussianPriors(model) => model,
            Strategy::LinearGaussian(model) => model,
            Strategy::LinearSemiParametric(model) => model,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SamplingStrategy {
        match self {
            Strategy::BetaPriors(model) => model,
            Strategy::GaussianPriors(model) => model,
            Strategy::LinearGaussian(model) => model,
            Strategy::LinearSemiParametric(model) => model,
        }
    }
}

impl SamplingStrategy for Strategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    fn arms_nb(&self) -> usize {
        self.inner().arms_nb()
    }

    fn choose_arm(&mut self) -> Result<usize, SimError> {
        self.inner_mut().choose_arm()
    }

    fn observe_reward(&mut self, arm: usize, reward: f64) -> Result<(), SimError> {
        self.inner_mut().observe_reward(arm, reward)
    }

    fn has_cached_sample(&self) -> bool {
        self.inner().has_cached_sample()
    }
}
