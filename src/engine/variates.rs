//! Per-worker correlated variate generation.
//!
//! Each worker owns exactly one [`VariateGenerator`]; the shared
//! [`StatisticalResources`] block is referenced read-only by all of them.
//! One call produces one period's correlated log-return vector: correlated
//! standard normals from the correlation Cholesky, optionally pushed through
//! a Gaussian copula onto Student-t marginals, then scaled into per-period
//! drift and diffusion.

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::core::{Distribution, SimulationError};
use crate::engine::stats::StatisticalResources;
use crate::math::norm::normal_cdf;
use crate::math::rng::{sample_standard_normal, Pcg64};

const UNIFORM_GUARD: f64 = 1.0e-12;

/// Stateful producer of one correlated per-period return vector per call.
#[derive(Debug)]
pub struct VariateGenerator<'a> {
    shared: &'a StatisticalResources,
    rng: Pcg64,
    student_t: Option<StudentsT>,
    z: Vec<f64>,
    correlated: Vec<f64>,
}

impl<'a> VariateGenerator<'a> {
    /// Creates a generator drawing from the `(master_seed, stream)` PCG
    /// stream. The caller resolves the seed-0 randomization sentinel before
    /// constructing workers so one run uses one master seed throughout.
    pub fn new(
        shared: &'a StatisticalResources,
        master_seed: u64,
        stream: u64,
    ) -> Result<Self, SimulationError> {
        let student_t = match shared.distribution {
            Distribution::StandardNormal => None,
            Distribution::StudentT => Some(
                StudentsT::new(0.0, 1.0, f64::from(shared.degrees_of_freedom))
                    .map_err(|e| SimulationError::Numeric(format!("student-t marginal: {e}")))?,
            ),
        };

        let n = shared.n_assets();
        Ok(Self {
            shared,
            rng: Pcg64::from_seed_stream(master_seed, stream),
            student_t,
            z: vec![0.0; n],
            correlated: vec![0.0; n],
        })
    }

    pub fn n_assets(&self) -> usize {
        self.shared.n_assets()
    }

    /// Fills `out` with one period of correlated log returns.
    pub fn next_correlated_returns(
        &mut self,
        periods_per_year: f64,
        out: &mut [f64],
    ) -> Result<(), SimulationError> {
        let n = self.shared.n_assets();
        if out.len() != n {
            return Err(SimulationError::Numeric(format!(
                "output length {} does not match asset count {n}",
                out.len()
            )));
        }

        for z in &mut self.z {
            *z = sample_standard_normal(&mut self.rng);
        }

        // correlated = L * z, lower-triangular apply.
        for i in 0..n {
            let mut sum = 0.0;
            for (j, l_ij) in self.shared.cholesky_corr[i].iter().enumerate().take(i + 1) {
                sum += l_ij * self.z[j];
            }
            self.correlated[i] = sum;
        }

        match &self.student_t {
            None => {
                for i in 0..n {
                    out[i] = log_normal_return(
                        self.shared.mu[i],
                        self.shared.sigma[i],
                        self.correlated[i],
                        periods_per_year,
                    );
                }
            }
            Some(student_t) => {
                for i in 0..n {
                    let u = normal_cdf(self.correlated[i])
                        .clamp(UNIFORM_GUARD, 1.0 - UNIFORM_GUARD);
                    let draw = student_t.inverse_cdf(u);
                    out[i] = log_normal_return(
                        self.shared.mu[i],
                        self.shared.sigma[i],
                        draw,
                        periods_per_year,
                    );
                }
            }
        }

        Ok(())
    }
}

/// One period's log return from annualized moments and a unit-variance draw:
/// `(mu - sigma^2 / 2) / ppy + sigma * draw / sqrt(ppy)`.
#[inline]
pub fn log_normal_return(mu: f64, sigma: f64, draw: f64, periods_per_year: f64) -> f64 {
    (mu - 0.5 * sigma * sigma) / periods_per_year + sigma * draw / periods_per_year.sqrt()
}
