//! Thompson sampling with an independent Gaussian posterior per arm.
//!
//! The posterior of arm `j` after `k[j]` observations is
//! `N(mi[j], 1 / (k[j] + 1))`. The running mean counts the prior as one
//! pseudo-observation of value 0, so after a single reward `r` the mean is
//! `r / 2`, not `r`.
//!
//! Reference: Agrawal & Goyal, "Near-optimal Regret Bounds for Thompson Sampling".

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::models::sampling::argmax;
use crate::simulation::error::SimError;
use crate::simulation::strategy::{check_arm, SamplingStrategy, StrategyKind};

/// Thompson sampling with independent Gaussian priors.
#[derive(Debug, Clone, Serialize)]
pub struct GaussianPriorsSampling {
    arms_nb: usize,
    seed: u64,

    /// Observation count per arm (`k`).
    counts: Vec<u64>,

    /// Posterior mean per arm (`mi`).
    means: Vec<f64>,

    /// Last posterior draw, cleared by every observation.
    theta: Option<Vec<f64>>,

    #[serde(skip)]
    rng: StdRng,
}

impl GaussianPriorsSampling {
    /// Create a model over `arms_nb` arms with no observations.
    pub fn new(arms_nb: usize, seed: u64) -> Self {
        Self {
            arms_nb,
            seed,
            counts: vec![0; arms_nb],
            means: vec![0.0; arms_nb],
            theta: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw `theta[j] ~ N(mi[j], (k[j] + 1)^-1/2)` for every arm and cache it.
    pub fn sample_theta(&mut self) -> Result<&[f64], SimError> {
        let mut theta = Vec::with_capacity(self.arms_nb);
        for (&mean, &count) in self.means.iter().zip(self.counts.iter()) {
            let std_dev = (count as f64 + 1.0).powf(-0.5);
            let normal = Normal::new(mean, std_dev).map_err(SimError::distribution)?;
            theta.push(normal.sample(&mut self.rng));
        }
        let theta = self.theta.insert(theta);
        Ok(theta.as_slice())
    }

    /// Observation count per arm.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Posterior mean per arm.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Cached posterior draw, if one was taken since the last observation.
    pub fn theta(&self) -> Option<&[f64]> {
        self.theta.as_deref()
    }

    /// Seed of the model's generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl SamplingStrategy for GaussianPriorsSampling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GaussianPriorsSampling
    }

    fn arms_nb(&self) -> usize {
        self.arms_nb
    }

    fn choose_arm(&mut self) -> Result<usize, SimError> {
        let theta = self.sample_theta()?;
        Ok(argmax(theta))
    }

    fn observe_reward(&mut self, arm: usize, reward: f64) -> Result<(), SimError> {
        check_arm(arm, self.arms_nb)?;
        let k = self.counts[arm] as f64;
        self.means[arm] = (self.means[arm] * (k + 1.0) + reward) / (k + 2.0);
        self.counts[arm] += 1;
        self.theta = None;
        Ok(())
    }

    fn has_cached_sample(&self) -> bool {
        self.theta.is_some()
    }
}
