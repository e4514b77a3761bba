//! Numerical kernels shared across the engine: normal-distribution
//! approximations, the seeded PCG stream generator, and small vector
//! statistics.

pub mod norm;
pub mod rng;

pub use norm::{normal_cdf, normal_inv_cdf, normal_pdf};
pub use rng::{resolve_master_seed, sample_standard_normal, Pcg64};

use crate::core::SimulationError;

/// Dot product of two equally sized vectors.
pub fn dot(a: &[f64], b: &[f64]) -> Result<f64, SimulationError> {
    if a.len() != b.len() {
        return Err(SimulationError::Numeric(format!(
            "dot product length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Arithmetic mean; 0.0 for an empty sample.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bias-corrected (n - 1) sample standard deviation; 0.0 with fewer than two
/// observations.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>();
    (sum_sq / (n - 1) as f64).max(0.0).sqrt()
}
