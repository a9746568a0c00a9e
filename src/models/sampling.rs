//! Numerical helpers shared by the models.

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::simulation::error::SimError;

/// Index of the first maximum. NaN entries never win.
pub(crate) fn argmax<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut best_index = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &value) in values.into_iter().enumerate() {
        if value > best_value {
            best_index = i;
            best_value = value;
        }
    }
    best_index
}

/// Inverse of a square matrix, recomputed from scratch.
pub(crate) fn invert(matrix: &DMatrix<f64>, name: &'static str) -> Result<DMatrix<f64>, SimError> {
    matrix
        .clone()
        .try_inverse()
        .ok_or(SimError::SingularMatrix(name))
}

/// One draw from `N(mean, cov)` via the Cholesky factor of `cov`.
///
/// Consumes exactly `mean.len()` standard normal draws from `rng`.
pub(crate) fn sample_multivariate_normal<R: Rng>(
    rng: &mut R,
    mean: &DVector<f64>,
    cov: &DMatrix<f64>,
    name: &'static str,
) -> Result<DVector<f64>, SimError> {
    let cholesky = Cholesky::new(cov.clone()).ok_or(SimError::NotPositiveDefinite(name))?;
    let z = DVector::from_iterator(
        mean.len(),
        (0..mean.len()).map(|_| rng.sample::<f64, _>(StandardNormal)),
    );
    Ok(mean + cholesky.l() * z)
}
