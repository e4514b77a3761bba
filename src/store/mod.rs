//! Persistence contract consumed by the simulation core.
//!
//! The engine never talks to a database directly; it depends on
//! [`ScenarioStore`] for scenario lookup, historical log returns, and the
//! run-history audit trail. Bindings may target SQL, memory, or mocks —
//! [`InMemoryStore`] ships as the reference binding.

pub mod memory;

pub use memory::{InMemoryStore, RunEntry};

use chrono::{DateTime, Utc};

use crate::core::{Scenario, SimulationError, SimulationSpec};

/// Infrastructure failures raised by a store binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing storage failed (connection, lock, query).
    Backend(String),
    /// A run id was referenced that the store never issued.
    UnknownRun(i32),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "storage backend failure: {msg}"),
            Self::UnknownRun(id) => write!(f, "unknown run id {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for SimulationError {
    fn from(err: StoreError) -> Self {
        SimulationError::Persistence(err.to_string())
    }
}

/// One historical log-return observation.
///
/// Returns are `ln(close_t / close_{t-1})` on an adjusted-close basis, in the
/// asset's native cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRow {
    pub asset_id: i32,
    pub timestamp: DateTime<Utc>,
    pub log_return: f64,
}

/// Audit row describing one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub distribution: String,
    pub cadence: String,
    pub duration: usize,
    pub iterations: usize,
    pub seed: u64,
    pub degrees_of_freedom: u32,
    pub max_lookback: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl RunRecord {
    /// Snapshots the settings of a run in storage form.
    pub fn from_spec(
        spec: &SimulationSpec,
        max_lookback: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            distribution: spec.distribution.as_str().to_string(),
            cadence: spec.cadence.as_str().to_string(),
            duration: spec.duration,
            iterations: spec.iterations,
            seed: spec.seed,
            degrees_of_freedom: spec.degrees_of_freedom,
            max_lookback,
            started_at,
        }
    }
}

/// Terminal state of a run-history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Success,
    Failure(String),
}

/// Persistence operations required by the simulation pipeline.
pub trait ScenarioStore: Send + Sync {
    /// Loads a scenario with its components. `Ok(None)` when the id is
    /// unknown.
    fn scenario_by_id(&self, id: i32) -> Result<Option<Scenario>, StoreError>;

    /// Log-return rows for the given assets at or after `from`, ordered by
    /// (asset id ascending, timestamp descending).
    fn time_series_returns(
        &self,
        asset_ids: &[i32],
        from: DateTime<Utc>,
    ) -> Result<Vec<ReturnRow>, StoreError>;

    /// Inserts a pending run-history row and returns the generated run id.
    fn insert_run_history(&self, scenario_id: i32, record: &RunRecord) -> Result<i32, StoreError>;

    /// Marks a run as successfully completed.
    fn mark_run_success(&self, run_id: i32) -> Result<(), StoreError>;

    /// Marks a run as failed with a non-empty message.
    fn mark_run_failure(&self, run_id: i32, message: &str) -> Result<(), StoreError>;
}
