//! Error types shared by the environment, the models and the simulation loop.
//!
//! Every error in this crate is fatal for the run it occurs in: there is no
//! retry path, the loop simply propagates the first failure with `?`.

use thiserror::Error;

use crate::simulation::config::ConfigError;

/// Errors raised while building or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// A reward outside the support of the model's likelihood.
    #[error("{strategy} cannot observe reward {reward}: rewards must be exactly 0 or 1")]
    InvalidReward {
        /// Model that rejected the reward.
        strategy: &'static str,
        /// The offending reward.
        reward: f64,
    },

    /// Strategy name not in the supported set.
    #[error("unknown strategy '{0}' (expected one of BetaPriorsSampling, GaussianPriorsSampling, LinearGaussianSampling, LinearSemiParametricSampling)")]
    UnknownStrategy(String),

    /// Reward distribution name not in {normal, binomial}.
    #[error("unsupported reward distribution '{0}' (expected 'normal' or 'binomial')")]
    UnsupportedRewardDistribution(String),

    /// Arm index outside `0..arms_nb`.
    #[error("arm {arm} is out of range for {arms_nb} arms")]
    ArmOutOfRange {
        /// Requested arm.
        arm: usize,
        /// Number of arms available.
        arms_nb: usize,
    },

    /// A constructor argument violates its domain.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Matrix inversion failed.
    #[error("{0} matrix is singular")]
    SingularMatrix(&'static str),

    /// Cholesky factorisation of a covariance matrix failed.
    #[error("{0} covariance is not positive definite")]
    NotPositiveDefinite(&'static str),

    /// A sampling distribution could not be constructed.
    #[error("distribution error: {0}")]
    Distribution(String),

    /// Invalid run configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem failure in a persistence sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure in a persistence sink.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn distribution(err: impl std::fmt::Display) -> Self {
        SimError::Distribution(err.to_string())
    }
}
