//! The simulation core: return alignment, statistical resources, correlated
//! variate generation, the parallel path engine, and ensemble reduction.

pub mod align;
pub mod paths;
pub mod reduce;
pub mod stats;
pub mod variates;

pub use align::{align_rows, load_aligned_returns, AlignedReturns};
pub use paths::{
    mean_final_value, plan_jobs, CancelToken, Job, PathEngine, PathResult, DEFAULT_BATCH_SIZE,
    DEFAULT_WORKERS, INITIAL_PORTFOLIO_VALUE,
};
pub use reduce::{build_response, conditional_var, empirical_quantile};
pub use stats::{
    build_statistics, cholesky_lower, correlation_from_covariance, covariance_matrix,
    StatisticalResources,
};
pub use variates::{log_normal_return, VariateGenerator};
