//! Sampling strategy trait definition.
//!
//! Every model the simulation loop can drive implements [`SamplingStrategy`].
//! The loop only ever talks to a model through `choose_arm` and
//! `observe_reward`, so adding a model never touches the loop itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::simulation::error::SimError;

/// Identity of a model variant.
///
/// The variant names double as the external strategy names accepted on the
/// command line, in config files and as keys of the run histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Beta-Bernoulli Thompson sampling.
    BetaPriorsSampling,
    /// Independent Gaussian prior per arm.
    GaussianPriorsSampling,
    /// Thompson sampling with linear payoffs and a shared parameter.
    LinearGaussianSampling,
    /// Two-level hierarchical linear model.
    LinearSemiParametricSampling,
}

impl StrategyKind {
    /// All supported strategies, in their canonical order.
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::BetaPriorsSampling,
        StrategyKind::GaussianPriorsSampling,
        StrategyKind::LinearGaussianSampling,
        StrategyKind::LinearSemiParametricSampling,
    ];

    /// External name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::BetaPriorsSampling => "BetaPriorsSampling",
            StrategyKind::GaussianPriorsSampling => "GaussianPriorsSampling",
            StrategyKind::LinearGaussianSampling => "LinearGaussianSampling",
            StrategyKind::LinearSemiParametricSampling => "LinearSemiParametricSampling",
        }
    }

    /// Whether the model needs the environment's context matrix.
    pub fn uses_context(&self) -> bool {
        matches!(
            self,
            StrategyKind::LinearGaussianSampling | StrategyKind::LinearSemiParametricSampling
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SimError::UnknownStrategy(s.to_string()))
    }
}

/// Capability interface shared by all bandit models.
///
/// Implementations own their random number generator, so the sequence of
/// arms a model picks depends only on its seed and the rewards it observed.
///
/// # Contract
/// - `observe_reward` is the only way sufficient statistics change, and it
///   always discards any cached posterior sample.
/// - `choose_arm` always draws a fresh sample; ties resolve to the lowest
///   arm index.
pub trait SamplingStrategy {
    /// Which variant this is.
    fn kind(&self) -> StrategyKind;

    /// Number of arms the model chooses between.
    fn arms_nb(&self) -> usize;

    /// Draw from the posterior and return the arm maximising the draw.
    fn choose_arm(&mut self) -> Result<usize, SimError>;

    /// Fold an observed reward for `arm` into the sufficient statistics.
    fn observe_reward(&mut self, arm: usize, reward: f64) -> Result<(), SimError>;

    /// Whether a posterior sample is currently cached.
    fn has_cached_sample(&self) -> bool;
}

/// Guard used by every model before indexing per-arm state.
pub(crate) fn check_arm(arm: usize, arms_nb: usize) -> Result<(), SimError> {
    if arm < arms_nb {
        Ok(())
    } else {
        Err(SimError::ArmOutOfRange { arm, arms_nb })
    }
}
