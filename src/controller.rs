//! Orchestrates a simulation run end to end: scenario load, run-history
//! audit, validation, alignment, statistics, path simulation, and reduction.

use chrono::Utc;

use crate::core::{Cadence, SimulationError, SimulationResponse, SimulationSpec};
use crate::engine::{
    build_response, build_statistics, load_aligned_returns, CancelToken, PathEngine,
};
use crate::store::{RunRecord, ScenarioStore};

/// Drives the simulation pipeline against a persistence collaborator.
///
/// Every run inserts a pending run-history row up front; any later failure
/// marks that row failed exactly once and propagates the error.
#[derive(Debug)]
pub struct SimulationController<S> {
    store: S,
    engine: PathEngine,
    history_cadence: Cadence,
}

impl<S: ScenarioStore> SimulationController<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            engine: PathEngine::default(),
            history_cadence: Cadence::Weekly,
        }
    }

    pub fn with_engine(mut self, engine: PathEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the observation cadence of the stored return history.
    pub fn with_history_cadence(mut self, cadence: Cadence) -> Self {
        self.history_cadence = cadence;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs a scenario simulation and returns the reduced response.
    pub fn run_simulation(
        &self,
        scenario_id: i32,
        spec: &SimulationSpec,
        cancel: &CancelToken,
    ) -> Result<SimulationResponse, SimulationError> {
        let scenario = self
            .store
            .scenario_by_id(scenario_id)?
            .ok_or_else(|| SimulationError::NotFound(format!("scenario {scenario_id}")))?;
        tracing::info!(scenario = %scenario.name, "received simulation request");

        let started_at = Utc::now();
        let max_lookback_date = started_at - spec.max_lookback;
        let run_id = self.store.insert_run_history(
            scenario_id,
            &RunRecord::from_spec(spec, max_lookback_date, started_at),
        )?;

        tracing::info!(scenario = %scenario.name, run_id, "validating scenario");
        if let Err(err) = scenario.validate() {
            return self.fail_run(run_id, err);
        }

        tracing::info!(scenario = %scenario.name, run_id, "aligning return history");
        let series = match load_aligned_returns(
            &self.store,
            &scenario,
            max_lookback_date,
            self.history_cadence,
        ) {
            Ok(series) => series,
            Err(err) => return self.fail_run(run_id, err),
        };

        tracing::info!(scenario = %scenario.name, run_id, "building statistical resources");
        let resources = match build_statistics(&series, spec) {
            Ok(resources) => resources,
            Err(err) => return self.fail_run(run_id, err),
        };

        let results = match self.engine.run(&resources, spec, cancel) {
            Ok(results) => results,
            Err(err) => return self.fail_run(run_id, err),
        };

        let response = match build_response(&results) {
            Ok(response) => response,
            Err(err) => return self.fail_run(run_id, err),
        };

        // If the success write fails there is no point attempting a failure
        // write with the same store.
        self.store.mark_run_success(run_id)?;
        tracing::info!(scenario = %scenario.name, run_id, "simulation completed");

        Ok(response)
    }

    fn fail_run(
        &self,
        run_id: i32,
        err: SimulationError,
    ) -> Result<SimulationResponse, SimulationError> {
        tracing::warn!(run_id, error = %err, "simulation failed");
        if let Err(store_err) = self.store.mark_run_failure(run_id, &err.to_string()) {
            tracing::error!(run_id, error = %store_err, "could not record run failure");
        }
        Err(err)
    }
}
