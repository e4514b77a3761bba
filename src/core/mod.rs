//! Domain types, the JSON request/response surface, and the crate-wide error
//! enum.

pub mod types;

pub use types::*;

/// Errors surfaced by the simulation pipeline.
///
/// Every stage reports through this enum; the controller performs at most one
/// failure-marking audit write per run and propagates the error unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    /// Requested scenario does not exist.
    NotFound(String),
    /// Scenario or request settings failed validation.
    Validation(String),
    /// Per-asset return series disagree on range or length.
    Alignment(String),
    /// Too few observations to estimate statistics.
    InsufficientData(String),
    /// Correlation matrix could not be Cholesky-factorized.
    NotPositiveDefinite(String),
    /// Numerical issue (length mismatch, empty sample, invalid state).
    Numeric(String),
    /// The caller cancelled the request.
    Cancelled,
    /// The persistence collaborator failed.
    Persistence(String),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Validation(msg) => write!(f, "validation failed: {msg}"),
            Self::Alignment(msg) => write!(f, "alignment failed: {msg}"),
            Self::InsufficientData(msg) => write!(f, "insufficient data: {msg}"),
            Self::NotPositiveDefinite(msg) => write!(f, "matrix not positive definite: {msg}"),
            Self::Numeric(msg) => write!(f, "numeric error: {msg}"),
            Self::Cancelled => write!(f, "simulation cancelled"),
            Self::Persistence(msg) => write!(f, "persistence error: {msg}"),
        }
    }
}

impl std::error::Error for SimulationError {}
