//! Groups raw per-asset log-return rows into aligned series.
//!
//! Downstream statistics assume one observation per asset per date, so the
//! aligner enforces that every asset in the scenario covers exactly the same
//! window: identical first date, last date, and observation count.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::{Cadence, Scenario, SimulationError};
use crate::store::{ReturnRow, ScenarioStore};

/// Historical log returns for one scenario asset, sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedReturns {
    pub asset_id: i32,
    /// Portfolio weight copied from the scenario component.
    pub weight: f64,
    pub returns: Vec<f64>,
    /// Observation dates, same length as `returns`, non-decreasing.
    pub dates: Vec<DateTime<Utc>>,
    /// Periods per year of the observation cadence.
    pub annualization_factor: usize,
}

/// Loads and aligns return history for every asset in the scenario.
pub fn load_aligned_returns<S>(
    store: &S,
    scenario: &Scenario,
    max_lookback: DateTime<Utc>,
    history_cadence: Cadence,
) -> Result<Vec<AlignedReturns>, SimulationError>
where
    S: ScenarioStore + ?Sized,
{
    let asset_ids: Vec<i32> = scenario.components.iter().map(|c| c.asset_id).collect();
    let rows = store.time_series_returns(&asset_ids, max_lookback)?;
    align_rows(scenario, rows, history_cadence)
}

/// Buckets rows by asset, copies scenario weights, and verifies alignment.
///
/// The result is sorted by ascending asset id so downstream vectors have a
/// deterministic ordering.
pub fn align_rows(
    scenario: &Scenario,
    rows: Vec<ReturnRow>,
    history_cadence: Cadence,
) -> Result<Vec<AlignedReturns>, SimulationError> {
    let mut buckets: HashMap<i32, Vec<(DateTime<Utc>, f64)>> =
        HashMap::with_capacity(scenario.components.len());
    for row in rows {
        buckets
            .entry(row.asset_id)
            .or_default()
            .push((row.timestamp, row.log_return));
    }

    let mut aligned = Vec::with_capacity(scenario.components.len());
    for component in &scenario.components {
        let mut observations = buckets.remove(&component.asset_id).unwrap_or_default();
        if observations.is_empty() {
            return Err(SimulationError::InsufficientData(format!(
                "no return history for asset {}",
                component.asset_id
            )));
        }

        observations.sort_by(|a, b| a.0.cmp(&b.0));
        let (dates, returns): (Vec<_>, Vec<_>) = observations.into_iter().unzip();

        aligned.push(AlignedReturns {
            asset_id: component.asset_id,
            weight: component.weight,
            returns,
            dates,
            annualization_factor: history_cadence.periods_per_year(),
        });
    }

    aligned.sort_by_key(|series| series.asset_id);
    verify_alignment(&aligned)?;
    Ok(aligned)
}

/// Fails unless every series shares the first date, last date, and length of
/// the others.
fn verify_alignment(aligned: &[AlignedReturns]) -> Result<(), SimulationError> {
    let Some(reference) = aligned.first() else {
        return Ok(());
    };

    for series in &aligned[1..] {
        if series.returns.len() != reference.returns.len() {
            return Err(SimulationError::Alignment(format!(
                "series lengths do not align: asset {} has {} observations, asset {} has {}",
                reference.asset_id,
                reference.returns.len(),
                series.asset_id,
                series.returns.len()
            )));
        }
        if series.dates.first() != reference.dates.first() {
            return Err(SimulationError::Alignment(format!(
                "first dates do not align between assets {} and {}",
                reference.asset_id, series.asset_id
            )));
        }
        if series.dates.last() != reference.dates.last() {
            return Err(SimulationError::Alignment(format!(
                "last dates do not align between assets {} and {}",
                reference.asset_id, series.asset_id
            )));
        }
    }

    Ok(())
}
