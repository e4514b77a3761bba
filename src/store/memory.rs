//! In-memory [`ScenarioStore`] binding used by tests and embedded callers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::core::Scenario;
use crate::store::{ReturnRow, RunRecord, RunStatus, ScenarioStore, StoreError};

/// One run-history row with its lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub scenario_id: i32,
    pub record: RunRecord,
    pub status: RunStatus,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    scenarios: HashMap<i32, Scenario>,
    returns: Vec<ReturnRow>,
    runs: HashMap<i32, RunEntry>,
    next_run_id: i32,
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scenario(&self, scenario: Scenario) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.scenarios.insert(scenario.id, scenario);
        }
    }

    pub fn insert_returns(&self, rows: Vec<ReturnRow>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.returns.extend(rows);
        }
    }

    /// Snapshot of a run-history row, for inspection.
    pub fn run(&self, run_id: i32) -> Option<RunEntry> {
        self.inner.lock().ok()?.runs.get(&run_id).cloned()
    }

    /// Ids of all runs recorded so far, in insertion order.
    pub fn run_ids(&self) -> Vec<i32> {
        match self.inner.lock() {
            Ok(inner) => {
                let mut ids: Vec<i32> = inner.runs.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
            Err(_) => Vec::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

impl ScenarioStore for InMemoryStore {
    fn scenario_by_id(&self, id: i32) -> Result<Option<Scenario>, StoreError> {
        Ok(self.lock()?.scenarios.get(&id).cloned())
    }

    fn time_series_returns(
        &self,
        asset_ids: &[i32],
        from: DateTime<Utc>,
    ) -> Result<Vec<ReturnRow>, StoreError> {
        let inner = self.lock()?;
        let mut rows: Vec<ReturnRow> = inner
            .returns
            .iter()
            .filter(|row| asset_ids.contains(&row.asset_id) && row.timestamp >= from)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.asset_id
                .cmp(&b.asset_id)
                .then(b.timestamp.cmp(&a.timestamp))
        });
        Ok(rows)
    }

    fn insert_run_history(&self, scenario_id: i32, record: &RunRecord) -> Result<i32, StoreError> {
        let mut inner = self.lock()?;
        inner.next_run_id += 1;
        let run_id = inner.next_run_id;
        inner.runs.insert(
            run_id,
            RunEntry {
                scenario_id,
                record: record.clone(),
                status: RunStatus::Pending,
                ended_at: None,
            },
        );
        Ok(run_id)
    }

    fn mark_run_success(&self, run_id: i32) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let entry = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::UnknownRun(run_id))?;
        entry.status = RunStatus::Success;
        entry.ended_at = Some(Utc::now());
        Ok(())
    }

    fn mark_run_failure(&self, run_id: i32, message: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let entry = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::UnknownRun(run_id))?;
        entry.status = RunStatus::Failure(message.to_string());
        entry.ended_at = Some(Utc::now());
        Ok(())
    }
}
