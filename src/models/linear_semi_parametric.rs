//! Linear semi-parametric Thompson sampling.
//!
//! Two-level model: a shared linear parameter `theta ~ N(0, sigma_3^2 I)`,
//! per-arm expected rewards `gamma_j ~ N(theta^T x_j, sigma_2^2)` and rewards
//! `r ~ N(gamma_j, sigma_1^2)`. Integrating `gamma` out gives the posterior
//! over `theta` with precision
//!
//! ```text
//! A = I / sigma_3^2 + sum_j n_j / (sigma_1^2 + n_j sigma_2^2) * x_j x_j^T
//! b =                 sum_j n_j r_avg_j / (sigma_1^2 + n_j sigma_2^2) * x_j
//! ```
//!
//! and, given `theta`, each `gamma_j` is a precision-weighted blend of the
//! arm's own average `r_avg_j` and the shared trend `theta^T x_j`.
//! `A` and `b` are rebuilt over all arms on every observation.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::models::sampling::{argmax, invert, sample_multivariate_normal};
use crate::simulation::error::SimError;
use crate::simulation::strategy::{check_arm, SamplingStrategy, StrategyKind};

/// Hierarchical linear Thompson sampling.
#[derive(Debug, Clone, Serialize)]
pub struct LinearSemiParametricSampling {
    arms_nb: usize,
    d: usize,
    seed: u64,

    /// Context matrix (d × N), one column per arm. Owned by the environment
    /// and saved there, so snapshots leave it out.
    #[serde(skip)]
    x: Arc<DMatrix<f64>>,

    /// Observation count per arm.
    n: Vec<u64>,

    /// Average observed reward per arm.
    r_avg: Vec<f64>,

    sigma_1: f64,
    sigma_2: f64,
    sigma_3: f64,

    /// Posterior precision of `theta`.
    precision: DMatrix<f64>,

    /// Precision-weighted reward vector `b`.
    b: DVector<f64>,

    theta: Option<DVector<f64>>,
    gamma: Option<DVector<f64>>,

    #[serde(skip)]
    rng: StdRng,
}

impl LinearSemiParametricSampling {
    /// Create a model over the arms described by the columns of `x`.
    ///
    /// # Errors
    /// `InvalidParameter` if `x` is not `d × arms_nb` or any sigma is not a
    /// positive finite number.
    pub fn new(
        arms_nb: usize,
        d: usize,
        x: Arc<DMatrix<f64>>,
        sigma_1: f64,
        sigma_2: f64,
        sigma_3: f64,
        seed: u64,
    ) -> Result<Self, SimError> {
        if x.shape() != (d, arms_nb) {
            return Err(SimError::InvalidParameter {
                name: "x",
                reason: format!("expected shape ({}, {}), got {:?}", d, arms_nb, x.shape()),
            });
        }
        for (name, sigma) in [("sigma_1", sigma_1), ("sigma_2", sigma_2), ("sigma_3", sigma_3)] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(SimError::InvalidParameter {
                    name,
                    reason: format!("must be a positive finite number, got {}", sigma),
                });
            }
        }

        Ok(Self {
            arms_nb,
            d,
            seed,
            x,
            n: vec![0; arms_nb],
            r_avg: vec![0.0; arms_nb],
            sigma_1,
            sigma_2,
            sigma_3,
            precision: Self::initial_precision(d, sigma_3),
            b: DVector::zeros(d),
            theta: None,
            gamma: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn initial_precision(d: usize, sigma_3: f64) -> DMatrix<f64> {
        DMatrix::identity(d, d) * (1.0 / (sigma_3 * sigma_3))
    }

    /// `sigma_1^2 + n_j sigma_2^2` for one arm.
    fn arm_denominator(&self, arm: usize) -> f64 {
        self.sigma_1.powi(2) + self.n[arm] as f64 * self.sigma_2.powi(2)
    }

    fn update_parameters(&mut self) {
        let mut precision = Self::initial_precision(self.d, self.sigma_3);
        let mut b = DVector::<f64>::zeros(self.d);
        for arm in 0..self.arms_nb {
            let n = self.n[arm] as f64;
            let denominator = self.arm_denominator(arm);
            let x_j = self.x.column(arm).into_owned();
            precision += (&x_j * x_j.transpose()) * (n / denominator);
            b += &x_j * (n * self.r_avg[arm] / denominator);
        }
        self.precision = precision;
        self.b = b;
        self.theta = None;
        self.gamma = None;
    }

    /// Posterior mean of `gamma` given a parameter draw.
    pub fn gamma_mean(&self, theta: &DVector<f64>) -> DVector<f64> {
        let trend = self.x.tr_mul(theta);
        DVector::from_iterator(
            self.arms_nb,
            (0..self.arms_nb).map(|arm| {
                let n = self.n[arm] as f64;
                let numerator =
                    self.sigma_2.powi(2) * n * self.r_avg[arm] + self.sigma_1.powi(2) * trend[arm];
                numerator / self.arm_denominator(arm)
            }),
        )
    }

    /// Posterior variance of each `gamma_j`; independent of `theta`.
    pub fn gamma_variance(&self) -> DVector<f64> {
        let scale = (self.sigma_1 * self.sigma_2).powi(2);
        DVector::from_iterator(
            self.arms_nb,
            (0..self.arms_nb).map(|arm| scale / self.arm_denominator(arm)),
        )
    }

    /// Draw `theta ~ N(A^-1 b, A^-1)` and cache it.
    pub fn sample_theta(&mut self) -> Result<&DVector<f64>, SimError> {
        let a_inv = invert(&self.precision, "precision")?;
        let mean = &a_inv * &self.b;
        let theta = sample_multivariate_normal(&mut self.rng, &mean, &a_inv, "theta")?;
        self.gamma = None;
        let theta = self.theta.insert(theta);
        Ok(&*theta)
    }

    /// Draw every `gamma_j` independently given `theta`, caching both.
    pub fn sample_gamma(&mut self, theta: &DVector<f64>) -> Result<&DVector<f64>, SimError> {
        if theta.len() != self.d {
            return Err(SimError::InvalidParameter {
                name: "theta",
                reason: format!("expected length {}, got {}", self.d, theta.len()),
            });
        }
        let mean = self.gamma_mean(theta);
        let variance = self.gamma_variance();

        let mut gamma = DVector::zeros(self.arms_nb);
        for arm in 0..self.arms_nb {
            let normal =
                Normal::new(mean[arm], variance[arm].sqrt()).map_err(SimError::distribution)?;
            gamma[arm] = normal.sample(&mut self.rng);
        }

        self.theta = Some(theta.clone());
        let gamma = self.gamma.insert(gamma);
        Ok(&*gamma)
    }

    /// Observation count per arm.
    pub fn n(&self) -> &[u64] {
        &self.n
    }

    /// Average observed reward per arm.
    pub fn r_avg(&self) -> &[f64] {
        &self.r_avg
    }

    /// Posterior precision `A`.
    pub fn precision(&self) -> &DMatrix<f64> {
        &self.precision
    }

    /// Weighted reward vector `b`.
    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    /// Cached parameter draw.
    pub fn theta(&self) -> Option<&DVector<f64>> {
        self.theta.as_ref()
    }

    /// Cached per-arm draw.
    pub fn gamma(&self) -> Option<&DVector<f64>> {
        self.gamma.as_ref()
    }

    /// Noise levels `(sigma_1, sigma_2, sigma_3)`.
    pub fn sigmas(&self) -> (f64, f64, f64) {
        (self.sigma_1, self.sigma_2, self.sigma_3)
    }
}

impl SamplingStrategy for LinearSemiParametricSampling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LinearSemiParametricSampling
    }

    fn arms_nb(&self) -> usize {
        self.arms_nb
    }

    fn choose_arm(&mut self) -> Result<usize, SimError> {
        let theta = self.sample_theta()?.clone();
        let gamma = self.sample_gamma(&theta)?;
        Ok(argmax(gamma.iter()))
    }

    fn observe_reward(&mut self, arm: usize, reward: f64) -> Result<(), SimError> {
        check_arm(arm, self.arms_nb)?;
        let n = self.n[arm] as f64;
        self.r_avg[arm] = (self.r_avg[arm] * n + reward) / (n + 1.0);
        self.n[arm] += 1;
        self.update_parameters();
        Ok(())
    }

    fn has_cached_sample(&self) -> bool {
        self.theta.is_some() || self.gamma.is_some()
    }
}
