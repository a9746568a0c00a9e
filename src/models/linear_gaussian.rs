//! Thompson sampling for contextual bandits with linear payoffs.
//!
//! All arms share one parameter vector. With precision `B` (starting at the
//! identity) and weighted reward sum `f`, the posterior over the parameter is
//! `N(B^-1 f, v^2 B^-1)`. An arm is chosen by drawing a parameter `mi` and
//! taking the arm with the largest `mi^T x_j`.
//!
//! Reference: Agrawal & Goyal, "Thompson Sampling for Contextual Bandits with
//! Linear Payoffs" (ICML 2013).

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::models::sampling::{argmax, invert, sample_multivariate_normal};
use crate::simulation::error::SimError;
use crate::simulation::strategy::{check_arm, SamplingStrategy, StrategyKind};

/// Linear-Gaussian Thompson sampling.
#[derive(Debug, Clone, Serialize)]
pub struct LinearGaussianSampling {
    arms_nb: usize,
    d: usize,
    seed: u64,

    /// Context matrix (d × N), one column per arm. Owned by the environment
    /// and saved there, so snapshots leave it out.
    #[serde(skip)]
    x: Arc<DMatrix<f64>>,

    /// Posterior scale.
    v: f64,

    /// Precision matrix `B`.
    precision: DMatrix<f64>,

    /// Context-weighted reward sum `f`.
    weighted_rewards: DVector<f64>,

    /// Posterior mean `B^-1 f`.
    mi_dashed: DVector<f64>,

    /// Last parameter draw.
    mi: Option<DVector<f64>>,

    /// `mi^T X` for the last draw.
    exp_reward: Option<DVector<f64>>,

    #[serde(skip)]
    rng: StdRng,
}

impl LinearGaussianSampling {
    /// Create a model over the arms described by the columns of `x`.
    ///
    /// # Errors
    /// `InvalidParameter` if `x` is not `d × arms_nb` or `v` is not a positive
    /// finite number.
    pub fn new(
        arms_nb: usize,
        d: usize,
        x: Arc<DMatrix<f64>>,
        v: f64,
        seed: u64,
    ) -> Result<Self, SimError> {
        if x.shape() != (d, arms_nb) {
            return Err(SimError::InvalidParameter {
                name: "x",
                reason: format!("expected shape ({}, {}), got {:?}", d, arms_nb, x.shape()),
            });
        }
        if !(v.is_finite() && v > 0.0) {
            return Err(SimError::InvalidParameter {
                name: "v",
                reason: format!("must be a positive finite number, got {}", v),
            });
        }

        Ok(Self {
            arms_nb,
            d,
            seed,
            x,
            v,
            precision: DMatrix::identity(d, d),
            weighted_rewards: DVector::zeros(d),
            mi_dashed: DVector::zeros(d),
            mi: None,
            exp_reward: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Draw `mi ~ N(mi_dashed, v^2 B^-1)` and cache it.
    pub fn sample_mi(&mut self) -> Result<&DVector<f64>, SimError> {
        let cov = invert(&self.precision, "precision")? * (self.v * self.v);
        let mi = sample_multivariate_normal(&mut self.rng, &self.mi_dashed, &cov, "parameter")?;
        self.exp_reward = None;
        let mi = self.mi.insert(mi);
        Ok(&*mi)
    }

    /// Recompute `exp_reward = mi^T X` from the cached draw.
    ///
    /// Returns `None` when no draw is cached.
    pub fn update_exp_reward(&mut self) -> Option<&DVector<f64>> {
        let mi = self.mi.as_ref()?;
        let exp_reward = self.x.tr_mul(mi);
        let exp_reward = self.exp_reward.insert(exp_reward);
        Some(&*exp_reward)
    }

    /// Precision matrix `B`.
    pub fn precision(&self) -> &DMatrix<f64> {
        &self.precision
    }

    /// Weighted reward sum `f`.
    pub fn weighted_rewards(&self) -> &DVector<f64> {
        &self.weighted_rewards
    }

    /// Posterior mean `B^-1 f`.
    pub fn mi_dashed(&self) -> &DVector<f64> {
        &self.mi_dashed
    }

    /// Cached parameter draw.
    pub fn mi(&self) -> Option<&DVector<f64>> {
        self.mi.as_ref()
    }

    /// Cached per-arm expected rewards of the last draw.
    pub fn exp_reward(&self) -> Option<&DVector<f64>> {
        self.exp_reward.as_ref()
    }

    /// Context dimensionality.
    pub fn d(&self) -> usize {
        self.d
    }

    /// Posterior scale.
    pub fn v(&self) -> f64 {
        self.v
    }
}

impl SamplingStrategy for LinearGaussianSampling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LinearGaussianSampling
    }

    fn arms_nb(&self) -> usize {
        self.arms_nb
    }

    fn choose_arm(&mut self) -> Result<usize, SimError> {
        self.sample_mi()?;
        let exp_reward = self
            .update_exp_reward()
            .ok_or_else(|| SimError::InvalidParameter {
                name: "mi",
                reason: "no parameter draw cached".to_string(),
            })?;
        Ok(argmax(exp_reward.iter()))
    }

    fn observe_reward(&mut self, arm: usize, reward: f64) -> Result<(), SimError> {
        check_arm(arm, self.arms_nb)?;
        let x_i = self.x.column(arm).into_owned();
        self.precision += &x_i * x_i.transpose();
        self.weighted_rewards += &x_i * reward;
        self.mi_dashed = invert(&self.precision, "precision")? * &self.weighted_rewards;

        self.mi = None;
        self.exp_reward = None;
        Ok(())
    }

    fn has_cached_sample(&self) -> bool {
        self.mi.is_some() || self.exp_reward.is_some()
    }
}
