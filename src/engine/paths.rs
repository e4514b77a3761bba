//! Parallel Monte Carlo path engine.
//!
//! Iterations are partitioned into fixed-size jobs seeded into a
//! work-stealing pool up front; each worker task pulls jobs, simulates every
//! iteration in the job with its own variate generator, and writes results
//! into disjoint slots of the output array. Cancellation is checked at job
//! and iteration boundaries, never inside the per-period loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use crate::core::{SimulationError, SimulationSpec};
use crate::engine::stats::StatisticalResources;
use crate::engine::variates::VariateGenerator;
use crate::math::rng::resolve_master_seed;
use crate::math::{dot, mean};

/// Portfolio value every path starts from.
pub const INITIAL_PORTFOLIO_VALUE: f64 = 100.0;
/// Default iterations per job.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
/// Default cap on concurrent worker tasks.
pub const DEFAULT_WORKERS: usize = 8;

/// Inclusive range of simulation indices processed by one worker pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub start: usize,
    pub end: usize,
}

/// Splits `iterations` into jobs of `batch_size` and caps the worker count.
///
/// The final job is truncated to fit; the worker count never exceeds the job
/// count.
pub fn plan_jobs(iterations: usize, batch_size: usize, max_workers: usize) -> (Vec<Job>, usize) {
    let n_jobs = iterations.div_ceil(batch_size);
    let n_workers = n_jobs.min(max_workers).max(1);

    let jobs = (0..n_jobs)
        .map(|i| Job {
            start: i * batch_size,
            end: ((i + 1) * batch_size).min(iterations) - 1,
        })
        .collect();

    (jobs, n_workers)
}

/// Cooperative cancellation flag shared between the caller and the workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// One simulated portfolio path with its derived metrics.
///
/// Immutable after construction: `values[0]` is the initial portfolio value
/// and `values` has length `duration + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub values: Vec<f64>,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub max_drawdown: f64,
}

impl PathResult {
    /// Computes per-path metrics from a simulated value path.
    ///
    /// `values` must hold at least the initial value and one simulated step.
    pub fn from_values(values: Vec<f64>, periods_per_year: f64) -> Self {
        debug_assert!(values.len() >= 2);
        let n = values.len();

        let mut sum_returns = 0.0;
        let mut sum_squared_returns = 0.0;
        let mut peak = 0.0_f64;
        let mut max_drawdown = 0.0_f64;
        for i in 0..n {
            if i != 0 {
                let log_return = (values[i] / values[i - 1]).ln();
                sum_returns += log_return;
                sum_squared_returns += log_return * log_return;
            }

            if values[i] > peak {
                peak = values[i];
            }
            let drawdown = (peak - values[i]) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        let initial_value = values[0];
        let final_value = values[n - 1];
        let total_return = (final_value - initial_value) / initial_value;

        let periods = (n - 1) as f64;
        let total_log_return = (final_value / initial_value).ln();
        let annualized_return = (total_log_return * periods_per_year / periods).exp() - 1.0;

        let annualized_volatility = if n > 2 {
            let mean_return = sum_returns / periods;
            let variance =
                (sum_squared_returns - periods * mean_return * mean_return) / (periods - 1.0);
            variance.max(0.0).sqrt() * periods_per_year.sqrt()
        } else {
            0.0
        };

        Self {
            values,
            final_value,
            total_return,
            annualized_return,
            annualized_volatility,
            max_drawdown,
        }
    }
}

/// Parallel path engine configuration.
#[derive(Debug, Clone)]
pub struct PathEngine {
    batch_size: usize,
    max_workers: usize,
}

impl Default for PathEngine {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_WORKERS,
        }
    }
}

impl PathEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        assert!(max_workers > 0, "max_workers must be > 0");
        self.max_workers = max_workers;
        self
    }

    /// Runs the Monte Carlo simulation and returns one [`PathResult`] per
    /// iteration, indexed by simulation number.
    ///
    /// The first error from any worker cancels the remaining jobs; partial
    /// results are discarded. A cancelled token surfaces as
    /// [`SimulationError::Cancelled`].
    pub fn run(
        &self,
        resources: &StatisticalResources,
        spec: &SimulationSpec,
        cancel: &CancelToken,
    ) -> Result<Vec<PathResult>, SimulationError> {
        if spec.iterations == 0 {
            return Err(SimulationError::Validation(
                "iterations must be at least 1".to_string(),
            ));
        }
        if spec.duration == 0 {
            return Err(SimulationError::Validation(
                "simulation duration must be at least 1 period".to_string(),
            ));
        }

        let (jobs, n_workers) = plan_jobs(spec.iterations, self.batch_size, self.max_workers);
        let master_seed = resolve_master_seed(spec.seed);
        let periods_per_year = spec.cadence.periods_per_year() as f64;
        let n_assets = resources.n_assets();

        tracing::info!(
            iterations = spec.iterations,
            duration = spec.duration,
            cadence = spec.cadence.as_str(),
            batch_size = self.batch_size,
            workers = n_workers,
            jobs = jobs.len(),
            "starting monte carlo simulation"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .build()
            .map_err(|e| SimulationError::Numeric(format!("worker pool: {e}")))?;

        let stop = AtomicBool::new(false);
        let first_error: Mutex<Option<SimulationError>> = Mutex::new(None);
        let record_error = |err: SimulationError| {
            let mut slot = first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            }
            stop.store(true, Ordering::Relaxed);
        };

        let mut results: Vec<Option<PathResult>> = vec![None; spec.iterations];
        let outcome = pool.install(|| {
            results
                .par_chunks_mut(self.batch_size)
                .zip(jobs.par_iter())
                .enumerate()
                .try_for_each(|(job_index, (slots, job))| {
                    if stop.load(Ordering::Relaxed) {
                        return Err(());
                    }
                    if cancel.is_cancelled() {
                        record_error(SimulationError::Cancelled);
                        return Err(());
                    }

                    let mut generator =
                        match VariateGenerator::new(resources, master_seed, job_index as u64 + 1) {
                            Ok(generator) => generator,
                            Err(err) => {
                                record_error(err);
                                return Err(());
                            }
                        };
                    let mut draws = vec![0.0_f64; n_assets];

                    for (offset, slot) in slots.iter_mut().enumerate() {
                        // Late cancellation exits at the iteration boundary,
                        // never inside the period loop.
                        if stop.load(Ordering::Relaxed) {
                            return Err(());
                        }
                        if cancel.is_cancelled() {
                            record_error(SimulationError::Cancelled);
                            return Err(());
                        }

                        let simulation = job.start + offset;
                        let mut value = INITIAL_PORTFOLIO_VALUE;
                        let mut path = vec![0.0_f64; spec.duration + 1];
                        path[0] = value;

                        for period in 0..spec.duration {
                            if let Err(err) =
                                generator.next_correlated_returns(periods_per_year, &mut draws)
                            {
                                record_error(err);
                                return Err(());
                            }
                            let portfolio_return = match dot(&resources.weights, &draws) {
                                Ok(r) => r,
                                Err(err) => {
                                    tracing::error!(
                                        simulation,
                                        period,
                                        "portfolio return dot product failed"
                                    );
                                    record_error(err);
                                    return Err(());
                                }
                            };

                            value *= portfolio_return.exp();
                            path[period + 1] = value;
                        }

                        *slot = Some(PathResult::from_values(path, periods_per_year));
                    }

                    Ok(())
                })
        });

        if outcome.is_err() {
            let err = first_error
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .unwrap_or(SimulationError::Cancelled);
            return Err(err);
        }

        results
            .into_iter()
            .collect::<Option<Vec<PathResult>>>()
            .ok_or_else(|| SimulationError::Numeric("missing path result slot".to_string()))
    }
}

/// Convenience: ensemble mean of the final portfolio values.
pub fn mean_final_value(results: &[PathResult]) -> f64 {
    let finals: Vec<f64> = results.iter().map(|r| r.final_value).collect();
    mean(&finals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Cadence, Distribution};
    use crate::engine::stats::cholesky_lower;
    use approx::assert_relative_eq;

    fn resources(n: usize) -> StatisticalResources {
        let mut correlation = vec![vec![0.0; n]; n];
        for (i, row) in correlation.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        StatisticalResources {
            mu: vec![0.08; n],
            sigma: vec![0.15; n],
            covariance: correlation.clone(),
            cholesky_corr: cholesky_lower(&correlation).unwrap(),
            correlation,
            weights: vec![1.0 / n as f64; n],
            distribution: Distribution::StandardNormal,
            degrees_of_freedom: 0,
        }
    }

    fn spec(iterations: usize, duration: usize, seed: u64) -> SimulationSpec {
        SimulationSpec {
            distribution: Distribution::StandardNormal,
            degrees_of_freedom: 0,
            cadence: Cadence::Weekly,
            duration,
            iterations,
            seed,
            max_lookback: chrono::Duration::weeks(520),
        }
    }

    #[test]
    fn job_partitioning_splits_and_caps_workers() {
        let (jobs, workers) = plan_jobs(10_000, 1_000, 4);
        assert_eq!(jobs.len(), 10);
        assert_eq!(workers, 4);
        assert_eq!(jobs[0].end + 1, jobs[1].start);

        let (jobs, workers) = plan_jobs(3_500, 1_000, 4);
        assert_eq!(jobs.len(), 4);
        assert_eq!(workers, 4);
        assert_eq!(jobs[3].end, 3_499);

        let (jobs, workers) = plan_jobs(10, 1_000, 4);
        assert_eq!(jobs.len(), 1);
        assert_eq!(workers, 1);
        assert_eq!(jobs[0].start, 0);
        assert_eq!(jobs[0].end, 9);
    }

    #[test]
    fn path_metrics_match_hand_computation() {
        // 100 -> 110 -> 99 -> 120.
        let result = PathResult::from_values(vec![100.0, 110.0, 99.0, 120.0], 52.0);

        assert_relative_eq!(result.final_value, 120.0);
        assert_relative_eq!(result.total_return, 0.2);
        // Peak 110, trough 99.
        assert_relative_eq!(result.max_drawdown, (110.0 - 99.0) / 110.0);

        let expected_annualized = ((120.0_f64 / 100.0).ln() * 52.0 / 3.0).exp() - 1.0;
        assert_relative_eq!(result.annualized_return, expected_annualized);

        let log_returns = [
            (110.0_f64 / 100.0).ln(),
            (99.0_f64 / 110.0).ln(),
            (120.0_f64 / 99.0).ln(),
        ];
        let m = log_returns.iter().sum::<f64>() / 3.0;
        let var = log_returns.iter().map(|r| (r - m) * (r - m)).sum::<f64>() / 2.0;
        assert_relative_eq!(
            result.annualized_volatility,
            var.sqrt() * 52.0_f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn single_period_path_has_zero_volatility() {
        let result = PathResult::from_values(vec![100.0, 105.0], 52.0);
        assert_eq!(result.annualized_volatility, 0.0);
        assert_relative_eq!(result.total_return, 0.05);
    }

    #[test]
    fn engine_fills_every_slot_with_positive_paths() {
        let engine = PathEngine::new().with_batch_size(100).with_max_workers(4);
        let results = engine
            .run(&resources(2), &spec(1_050, 12, 42), &CancelToken::new())
            .unwrap();

        assert_eq!(results.len(), 1_050);
        for result in &results {
            assert_eq!(result.values.len(), 13);
            assert_eq!(result.values[0], INITIAL_PORTFOLIO_VALUE);
            assert!(result.values.iter().all(|v| *v > 0.0));
            assert_relative_eq!(result.final_value, result.values[12]);
        }
    }

    #[test]
    fn fixed_seed_reproduces_every_path() {
        let engine = PathEngine::new().with_batch_size(250).with_max_workers(4);
        let shared = resources(2);
        let spec = spec(2_000, 26, 42);

        let a = engine.run(&shared, &spec, &CancelToken::new()).unwrap();
        let b = engine.run(&shared, &spec, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_seed_randomizes_runs() {
        let engine = PathEngine::new().with_batch_size(500).with_max_workers(2);
        let shared = resources(1);
        let spec = spec(500, 8, 0);

        let a = engine.run(&shared, &spec, &CancelToken::new()).unwrap();
        let b = engine.run(&shared, &spec, &CancelToken::new()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cancelled_token_aborts_before_work() {
        let engine = PathEngine::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = engine.run(&resources(1), &spec(10_000, 52, 42), &cancel).unwrap_err();
        assert_eq!(err, SimulationError::Cancelled);
    }
}
