//! Synthetic bandit environment.
//!
//! The environment draws a fixed problem instance at construction: a
//! non-negative context matrix `X` (d × N), a non-negative true parameter
//! `theta` with norm `a` and a per-arm bias in `[0, 1 - a)`. The expected
//! reward of arm `j` is `theta^T x_j + bias_j`, which stays in `[0, 1)` so the
//! same instance can emit Bernoulli rewards.
//!
//! After construction only the private generator changes; expected rewards
//! and the regret table are fixed for the whole run.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli, Distribution, Normal, StandardNormal};
use serde::Serialize;

use crate::models::sampling::argmax;
use crate::simulation::config::{EnvironmentParams, RewardDistribution};
use crate::simulation::error::SimError;
use crate::simulation::strategy::check_arm;

/// A fixed synthetic bandit instance with its own reward stream.
#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    /// Number of arms (`N`).
    arms_nb: usize,

    /// Norm of the true parameter vector.
    a: f64,

    /// Context dimensionality.
    d: usize,

    /// Reward family.
    reward_distribution: RewardDistribution,

    /// Seed the instance was generated from.
    seed: u64,

    /// Context matrix, one column per arm. Shared with the linear models.
    x: Arc<DMatrix<f64>>,

    /// True linear parameter.
    theta: DVector<f64>,

    /// Per-arm offset added to the linear part.
    bias: DVector<f64>,

    /// `theta^T X + bias`, one entry per arm.
    expected_rewards: DVector<f64>,

    /// Stream used by `get_reward`; instance generation consumed its prefix.
    #[serde(skip)]
    rng: StdRng,
}

impl Environment {
    /// Generate an instance.
    ///
    /// Draw order on the generator is fixed: `X` row by row, then `theta`,
    /// then the bias. Rewards continue on the same stream.
    ///
    /// # Errors
    /// `InvalidParameter` if `arms_nb` or `d` is zero or `a` lies outside `[0, 1]`.
    pub fn new(
        arms_nb: usize,
        a: f64,
        d: usize,
        reward_distribution: RewardDistribution,
        seed: u64,
    ) -> Result<Self, SimError> {
        if arms_nb == 0 {
            return Err(SimError::InvalidParameter {
                name: "arms_nb",
                reason: "at least one arm is required".to_string(),
            });
        }
        if d == 0 {
            return Err(SimError::InvalidParameter {
                name: "d",
                reason: "context dimensionality must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&a) {
            return Err(SimError::InvalidParameter {
                name: "a",
                reason: format!("{} is out of range [0, 1]", a),
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);

        let raw_x: Vec<f64> = (0..d * arms_nb)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        let x = Self::prepare_context_features(&DMatrix::from_row_slice(d, arms_nb, &raw_x));

        let raw_theta: Vec<f64> = (0..d).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        let theta = Self::prepare_linear_parameter_vector(&DVector::from_vec(raw_theta), a);

        let bias: Vec<f64> = (0..arms_nb).map(|_| rng.gen::<f64>() * (1.0 - a)).collect();
        let bias = DVector::from_vec(bias);

        let expected_rewards = Self::prepare_expected_rewards(&theta, &x, &bias);

        Ok(Self {
            arms_nb,
            a,
            d,
            reward_distribution,
            seed,
            x: Arc::new(x),
            theta,
            bias,
            expected_rewards,
            rng,
        })
    }

    /// Build from the run configuration's environment arguments.
    pub fn from_params(params: &EnvironmentParams) -> Result<Self, SimError> {
        Self::new(
            params.arms_nb,
            params.a,
            params.d,
            params.reward_distribution,
            params.seed,
        )
    }

    /// Make entries non-negative and rescale by the largest column norm.
    ///
    /// A single factor is applied to the whole matrix, so relative scale
    /// between arms is kept and the largest column ends up with norm 1.
    pub fn prepare_context_features(x: &DMatrix<f64>) -> DMatrix<f64> {
        let result = x.abs();
        let max_norm = result
            .column_iter()
            .map(|column| column.norm())
            .fold(0.0, f64::max);
        if max_norm > 0.0 {
            result / max_norm
        } else {
            result
        }
    }

    /// Make entries non-negative and rescale to L2 norm `a`.
    pub fn prepare_linear_parameter_vector(theta: &DVector<f64>, a: f64) -> DVector<f64> {
        let result = theta.abs();
        let norm = result.norm();
        if norm > 0.0 {
            result.map(|value| value / norm * a)
        } else {
            result
        }
    }

    /// `theta^T X + bias` as a vector with one entry per arm.
    pub fn prepare_expected_rewards(
        theta: &DVector<f64>,
        x: &DMatrix<f64>,
        bias: &DVector<f64>,
    ) -> DVector<f64> {
        x.tr_mul(theta) + bias
    }

    /// Draw one reward for `arm`. Consumes the environment's generator.
    pub fn get_reward(&mut self, arm: usize) -> Result<f64, SimError> {
        check_arm(arm, self.arms_nb)?;
        let expected = self.expected_rewards[arm];
        match self.reward_distribution {
            RewardDistribution::Normal => {
                let normal = Normal::new(expected, 1.0).map_err(SimError::distribution)?;
                Ok(normal.sample(&mut self.rng))
            }
            RewardDistribution::Binomial => {
                // x^T theta + bias <= a + (1 - a) up to rounding
                let bernoulli =
                    Bernoulli::new(expected.clamp(0.0, 1.0)).map_err(SimError::distribution)?;
                Ok(if bernoulli.sample(&mut self.rng) { 1.0 } else { 0.0 })
            }
        }
    }

    /// Gap between the best expected reward and `arm`'s expected reward.
    pub fn get_regret(&self, arm: usize) -> Result<f64, SimError> {
        check_arm(arm, self.arms_nb)?;
        Ok(self.expected_rewards.max() - self.expected_rewards[arm])
    }

    /// Lowest-index arm with the highest expected reward.
    pub fn optimal_arm(&self) -> usize {
        argmax(self.expected_rewards.iter())
    }

    /// Context matrix (d × N).
    pub fn context(&self) -> &DMatrix<f64> {
        &self.x
    }

    /// Handle to the context matrix for models that read it.
    pub fn shared_context(&self) -> &Arc<DMatrix<f64>> {
        &self.x
    }

    /// True parameter vector.
    pub fn theta(&self) -> &DVector<f64> {
        &self.theta
    }

    /// Per-arm bias.
    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    /// Expected reward of every arm.
    pub fn expected_rewards(&self) -> &DVector<f64> {
        &self.expected_rewards
    }

    /// Number of arms.
    pub fn arms_nb(&self) -> usize {
        self.arms_nb
    }

    /// Context dimensionality.
    pub fn d(&self) -> usize {
        self.d
    }

    /// Norm of the true parameter vector.
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Reward family.
    pub fn reward_distribution(&self) -> RewardDistribution {
        self.reward_distribution
    }

    /// Seed the instance was generated from.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {} within {} of {}",
            actual,
            tol,
            expected
        );
    }

    #[test]
    fn test_prepare_context_features() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 0.0, 1.0, -2.0, -1.0]);
        let result = Environment::prepare_context_features(&x);
        let expected =
            DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 0.0, 1.0, 2.0, 1.0]) / 5f64.sqrt();
        assert!((result - expected).amax() < 1e-12);
    }

    #[test]
    fn test_prepare_linear_parameter_vector() {
        let theta = DVector::from_vec(vec![0.0, -1.0, 1.0]);
        let result = Environment::prepare_linear_parameter_vector(&theta, 0.5);
        let expected = DVector::from_vec(vec![0.0, 1.0, 1.0]) / 2f64.powf(1.5);
        assert!((result - expected).amax() < 1e-12);
    }

    #[test]
    fn test_prepare_expected_rewards() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.1, 0.1, 0.25, 0.3]);
        let theta = DVector::from_vec(vec![0.0, -1.0, 1.0]);
        let bias = DVector::from_vec(vec![1.0, -1.0]);
        let result = Environment::prepare_expected_rewards(&theta, &x, &bias);
        assert_close(result[0], 1.15, 1e-12);
        assert_close(result[1], -0.8, 1e-12);
    }

    #[test]
    fn test_instance_shape_and_ranges() {
        let env = Environment::new(7, 0.8, 4, RewardDistribution::Binomial, 3).unwrap();
        assert_eq!(env.context().shape(), (4, 7));
        assert_eq!(env.theta().len(), 4);
        assert_eq!(env.expected_rewards().len(), 7);
        assert_close(env.theta().norm(), 0.8, 1e-12);

        let max_norm = env
            .context()
            .column_iter()
            .map(|c| c.norm())
            .fold(0.0, f64::max);
        assert_close(max_norm, 1.0, 1e-12);
        assert!(env.context().iter().all(|&v| v >= 0.0));
        assert!(env.bias().iter().all(|&b| (0.0..0.2).contains(&b)));
        assert!(env.expected_rewards().iter().all(|&r| (0.0..1.0).contains(&r)));
    }

    #[test]
    fn test_same_seed_same_instance() {
        let first = Environment::new(5, 0.5, 3, RewardDistribution::Normal, 11).unwrap();
        let second = Environment::new(5, 0.5, 3, RewardDistribution::Normal, 11).unwrap();
        assert_eq!(first.expected_rewards(), second.expected_rewards());

        let other = Environment::new(5, 0.5, 3, RewardDistribution::Normal, 12).unwrap();
        assert_ne!(first.expected_rewards(), other.expected_rewards());
    }

    #[test]
    fn test_full_margin_has_zero_bias() {
        let env = Environment::new(4, 1.0, 3, RewardDistribution::Binomial, 2).unwrap();
        assert!(env.bias().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_regret() {
        let env = Environment::new(20, 0.5, 5, RewardDistribution::Normal, 1).unwrap();
        let best = env.optimal_arm();
        assert_eq!(env.get_regret(best).unwrap(), 0.0);
        let max = env.expected_rewards().max();
        for arm in 0..env.arms_nb() {
            let regret = env.get_regret(arm).unwrap();
            assert!(regret >= 0.0);
            assert_eq!(regret, max - env.expected_rewards()[arm]);
        }
    }

    #[test]
    fn test_get_reward_normal() {
        let n = 5;
        let mut env = Environment::new(n, 0.9, 3, RewardDistribution::Normal, 1).unwrap();
        let steps = 10_000;
        let mut averages = vec![0.0; n];
        for _ in 0..steps {
            for (arm, average) in averages.iter_mut().enumerate() {
                *average += env.get_reward(arm).unwrap() / steps as f64;
            }
        }
        for (arm, average) in averages.iter().enumerate() {
            assert_close(*average, env.expected_rewards()[arm], 0.1);
        }
    }

    #[test]
    fn test_get_reward_binomial() {
        let n = 5;
        let mut env = Environment::new(n, 0.9, 3, RewardDistribution::Binomial, 1).unwrap();
        let steps = 10_000;
        let mut averages = vec![0.0; n];
        for _ in 0..steps {
            for (arm, average) in averages.iter_mut().enumerate() {
                let reward = env.get_reward(arm).unwrap();
                assert!(reward == 0.0 || reward == 1.0);
                *average += reward / steps as f64;
            }
        }
        for (arm, average) in averages.iter().enumerate() {
            assert_close(*average, env.expected_rewards()[arm], 0.1);
        }
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            Environment::new(0, 0.5, 3, RewardDistribution::Normal, 1),
            Err(SimError::InvalidParameter { name: "arms_nb", .. })
        ));
        assert!(matches!(
            Environment::new(3, 1.5, 3, RewardDistribution::Normal, 1),
            Err(SimError::InvalidParameter { name: "a", .. })
        ));

        let mut env = Environment::new(3, 0.5, 2, RewardDistribution::Normal, 1).unwrap();
        assert!(matches!(env.get_reward(3), Err(SimError::ArmOutOfRange { arm: 3, .. })));
        assert!(matches!(env.get_regret(9), Err(SimError::ArmOutOfRange { arm: 9, .. })));
    }
}
