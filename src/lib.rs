//! Montefolio is a portfolio Monte Carlo simulation engine: it turns a
//! scenario (asset weights) and aligned historical log-return series into an
//! ensemble of simulated portfolio value paths and reduces that ensemble to
//! risk metrics (VaR, CVaR, drawdown, probability of loss) and per-time-step
//! percentile bands.
//!
//! The pipeline runs in four stages:
//! - aligning per-asset return history pulled from a persistence collaborator,
//! - estimating annualized moments, the covariance/correlation matrices, and
//!   the correlation Cholesky factor,
//! - fanning batched simulation jobs out over a worker pool, each worker
//!   owning its own correlated variate generator (standard normal, or
//!   Student-t through a Gaussian copula),
//! - reducing the path ensemble to metrics, sample paths, and bands.
//!
//! Numerical considerations:
//! - The correlation (not covariance) Cholesky drives the variate path, so
//!   unit-variance draws are scaled by per-asset sigma exactly once.
//! - Empirical quantiles use the `sorted[floor(q * (len - 1))]` convention
//!   throughout so outputs are stable across platforms.
//! - A non-zero master seed makes every path bit-reproducible: randomness is
//!   a PCG stream keyed by `(master_seed, job index)`.
//!
//! # Quick Start
//! Simulate a one-asset portfolio directly against the engine:
//! ```rust
//! use montefolio::core::{Cadence, Distribution, SimulationSpec};
//! use montefolio::engine::{build_response, CancelToken, PathEngine, StatisticalResources};
//!
//! let resources = StatisticalResources {
//!     mu: vec![0.08],
//!     sigma: vec![0.15],
//!     covariance: vec![vec![0.15 * 0.15 / 52.0]],
//!     correlation: vec![vec![1.0]],
//!     cholesky_corr: vec![vec![1.0]],
//!     weights: vec![1.0],
//!     distribution: Distribution::StandardNormal,
//!     degrees_of_freedom: 0,
//! };
//! let spec = SimulationSpec {
//!     distribution: Distribution::StandardNormal,
//!     degrees_of_freedom: 0,
//!     cadence: Cadence::Weekly,
//!     duration: 52,
//!     iterations: 2_000,
//!     seed: 42,
//!     max_lookback: chrono::Duration::weeks(520),
//! };
//! let results = PathEngine::default()
//!     .run(&resources, &spec, &CancelToken::new())
//!     .unwrap();
//! let response = build_response(&results).unwrap();
//! assert!(response.risk_metrics.mean_final_value > 0.0);
//! ```

pub mod controller;
pub mod core;
pub mod engine;
pub mod math;
pub mod store;

/// Common imports for ergonomic usage.
pub mod prelude {
    pub use crate::controller::SimulationController;
    pub use crate::core::{
        Cadence, Distribution, RiskMetrics, SamplePath, Scenario, ScenarioComponent,
        SimulationError, SimulationRequest, SimulationResponse, SimulationSpec, SimulationStats,
    };
    pub use crate::engine::{CancelToken, PathEngine};
    pub use crate::store::{InMemoryStore, ScenarioStore};
}
