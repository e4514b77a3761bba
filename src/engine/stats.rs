//! Statistical pre-processing: annualized moments, covariance and
//! correlation matrices, and the correlation Cholesky factor.
//!
//! The variate path scales unit-variance correlated draws by per-asset sigma,
//! so the Cholesky factor is taken of the correlation matrix, not the
//! covariance matrix — factorizing the covariance would scale by sigma twice.

use nalgebra::DMatrix;

use crate::core::{Distribution, SimulationError, SimulationSpec};
use crate::engine::align::AlignedReturns;
use crate::math::{mean, sample_std_dev};

/// Immutable statistics block shared read-only by every simulation worker.
///
/// Built once per simulation; `mu` and `sigma` are annualized, matrices are
/// `n x n` over the scenario's assets in ascending-id order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalResources {
    pub mu: Vec<f64>,
    pub sigma: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub correlation: Vec<Vec<f64>>,
    /// Lower-triangular factor with `L * L^T = correlation`.
    pub cholesky_corr: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub distribution: Distribution,
    pub degrees_of_freedom: u32,
}

impl StatisticalResources {
    pub fn n_assets(&self) -> usize {
        self.mu.len()
    }
}

/// Builds the shared statistics block from aligned per-asset return series.
pub fn build_statistics(
    series: &[AlignedReturns],
    spec: &SimulationSpec,
) -> Result<StatisticalResources, SimulationError> {
    if series.is_empty() {
        return Err(SimulationError::InsufficientData(
            "no asset return series".to_string(),
        ));
    }
    for asset in series {
        if asset.returns.len() < 2 {
            return Err(SimulationError::InsufficientData(format!(
                "asset {} has {} observations, need at least 2",
                asset.asset_id,
                asset.returns.len()
            )));
        }
    }

    let n = series.len();
    let mut mu = Vec::with_capacity(n);
    let mut sigma = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for asset in series {
        let factor = asset.annualization_factor as f64;
        mu.push(mean(&asset.returns) * factor);
        sigma.push(sample_std_dev(&asset.returns) * factor.sqrt());
        weights.push(asset.weight);
    }

    let returns: Vec<&[f64]> = series.iter().map(|asset| asset.returns.as_slice()).collect();
    let covariance = covariance_matrix(&returns)?;
    let correlation = correlation_from_covariance(&covariance)?;
    let cholesky_corr = cholesky_lower(&correlation)?;

    Ok(StatisticalResources {
        mu,
        sigma,
        covariance,
        correlation,
        cholesky_corr,
        weights,
        distribution: spec.distribution,
        degrees_of_freedom: spec.degrees_of_freedom,
    })
}

/// Sample covariance matrix (n - 1 denominator) of per-period returns.
///
/// `returns` holds one equally sized observation slice per asset.
pub fn covariance_matrix(returns: &[&[f64]]) -> Result<Vec<Vec<f64>>, SimulationError> {
    let n = returns.len();
    if n == 0 {
        return Err(SimulationError::InsufficientData(
            "no asset return series".to_string(),
        ));
    }
    let t = returns[0].len();
    if t < 2 {
        return Err(SimulationError::InsufficientData(format!(
            "need at least 2 observations, got {t}"
        )));
    }
    if returns.iter().any(|series| series.len() != t) {
        return Err(SimulationError::Numeric(
            "return series have unequal lengths".to_string(),
        ));
    }

    // Observations as rows, assets as columns, columns centered.
    let mut centered = DMatrix::<f64>::zeros(t, n);
    for (j, series) in returns.iter().enumerate() {
        let m = mean(series);
        for (i, value) in series.iter().enumerate() {
            centered[(i, j)] = value - m;
        }
    }

    let cov = centered.transpose() * &centered / (t as f64 - 1.0);

    let mut out = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            out[i][j] = cov[(i, j)];
        }
    }
    Ok(out)
}

/// Correlation matrix from a covariance matrix, diagonal forced to 1.
pub fn correlation_from_covariance(
    covariance: &[Vec<f64>],
) -> Result<Vec<Vec<f64>>, SimulationError> {
    let n = covariance.len();
    for (i, row) in covariance.iter().enumerate() {
        if row[i] <= 0.0 || !row[i].is_finite() {
            return Err(SimulationError::NotPositiveDefinite(format!(
                "asset at index {i} has non-positive variance {}",
                row[i]
            )));
        }
    }

    let mut corr = vec![vec![0.0; n]; n];
    for i in 0..n {
        corr[i][i] = 1.0;
        for j in 0..i {
            let rho = covariance[i][j] / (covariance[i][i] * covariance[j][j]).sqrt();
            corr[i][j] = rho;
            corr[j][i] = rho;
        }
    }
    Ok(corr)
}

/// Strict Cholesky decomposition for symmetric positive-definite matrices.
///
/// Returns lower-triangular `L` with `L * L^T = matrix`, or an error when a
/// leading minor is not positive.
pub fn cholesky_lower(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, SimulationError> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return Err(SimulationError::Numeric(
            "cholesky input must be square and non-empty".to_string(),
        ));
    }

    let mut l = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if !sum.is_finite() || sum <= 0.0 {
                    return Err(SimulationError::NotPositiveDefinite(format!(
                        "leading minor {} is not positive",
                        i + 1
                    )));
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    Ok(l)
}
