//! Beta-Bernoulli Thompson sampling.
//!
//! Each arm keeps a Beta(S + 1, F + 1) posterior over its success
//! probability, starting from the uniform prior. Rewards must be exactly
//! 0 or 1.
//!
//! Reference: Agrawal & Goyal, "Near-optimal Regret Bounds for Thompson Sampling".

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use serde::Serialize;

use crate::models::sampling::argmax;
use crate::simulation::error::SimError;
use crate::simulation::strategy::{check_arm, SamplingStrategy, StrategyKind};

/// Thompson sampling with independent Beta priors.
#[derive(Debug, Clone, Serialize)]
pub struct BetaPriorsSampling {
    arms_nb: usize,
    seed: u64,

    /// Observed successes per arm (`S`).
    successes: Vec<u64>,

    /// Observed failures per arm (`F`).
    failures: Vec<u64>,

    /// Last posterior draw, cleared by every observation.
    theta: Option<Vec<f64>>,

    #[serde(skip)]
    rng: StdRng,
}

impl BetaPriorsSampling {
    /// Create a model over `arms_nb` arms with no observations.
    pub fn new(arms_nb: usize, seed: u64) -> Self {
        Self {
            arms_nb,
            seed,
            successes: vec![0; arms_nb],
            failures: vec![0; arms_nb],
            theta: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw `theta[j] ~ Beta(S[j] + 1, F[j] + 1)` for every arm and cache it.
    pub fn sample_theta(&mut self) -> Result<&[f64], SimError> {
        let mut theta = Vec::with_capacity(self.arms_nb);
        for (&s, &f) in self.successes.iter().zip(self.failures.iter()) {
            let beta = Beta::new(s as f64 + 1.0, f as f64 + 1.0).map_err(SimError::distribution)?;
            theta.push(beta.sample(&mut self.rng));
        }
        let theta = self.theta.insert(theta);
        Ok(theta.as_slice())
    }

    /// Successes per arm.
    pub fn successes(&self) -> &[u64] {
        &self.successes
    }

    /// Failures per arm.
    pub fn failures(&self) -> &[u64] {
        &self.failures
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

impl SamplingStrategy for BetaPriorsSampling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BetaPriorsSampling
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
        if reward == 1.0 {
            self.successes[arm] += 1;
        } else if reward == 0.0 {
            self.failures[arm] += 1;
        } else {
            return Err(SimError::InvalidReward {
                strategy: StrategyKind::BetaPriorsSampling.as_str(),
                reward,
            });
        }
        self.theta = None;
        Ok(())
    }

    fn has_cached_sample(&self) -> bool {
        self.theta.is_some()
    }
}
