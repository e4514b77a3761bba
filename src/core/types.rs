use serde::{Deserialize, Serialize};

use crate::core::SimulationError;

/// Absolute tolerance for the scenario weight-sum check.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1.0e-6;

/// Marginal distribution of the per-period random draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// Correlated standard-normal draws.
    StandardNormal,
    /// Student-t marginals with the correlation structure imposed through a
    /// Gaussian copula.
    StudentT,
}

impl Distribution {
    /// Wire code used by the simulation request surface.
    pub fn code(self) -> i32 {
        match self {
            Self::StandardNormal => 0,
            Self::StudentT => 1,
        }
    }

    /// Parses a wire code. Returns `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::StandardNormal),
            1 => Some(Self::StudentT),
            _ => None,
        }
    }

    /// Stable storage name, as documented by the resources endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StandardNormal => "standardNormal",
            Self::StudentT => "studentT",
        }
    }
}

/// Observation or simulation cadence expressed as periods per year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    /// Annualization factor: the number of periods in one year.
    pub fn periods_per_year(self) -> usize {
        match self {
            Self::Daily => 252,
            Self::Weekly => 52,
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::Yearly => 1,
        }
    }

    /// Parses the wire integer (periods per year). Returns `None` for
    /// unrecognized values.
    pub fn from_periods_per_year(periods: usize) -> Option<Self> {
        match periods {
            252 => Some(Self::Daily),
            52 => Some(Self::Weekly),
            12 => Some(Self::Monthly),
            4 => Some(Self::Quarterly),
            1 => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Stable storage name, as documented by the resources endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

/// One scenario allocation: an asset and its portfolio weight.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioComponent {
    pub asset_id: i32,
    pub weight: f64,
}

/// A named set of asset weights to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: i32,
    pub name: String,
    pub floated_weight: bool,
    pub components: Vec<ScenarioComponent>,
}

impl Scenario {
    /// Validates the allocation: non-empty, strictly positive finite weights,
    /// unique asset ids, and weights summing to 1 within tolerance.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.components.is_empty() {
            return Err(SimulationError::Validation(
                "scenario has no components".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::with_capacity(self.components.len());
        let mut weight_sum = 0.0;
        for component in &self.components {
            if !component.weight.is_finite() || component.weight <= 0.0 {
                return Err(SimulationError::Validation(format!(
                    "weight for asset {} must be positive, got {}",
                    component.asset_id, component.weight
                )));
            }
            if !seen.insert(component.asset_id) {
                return Err(SimulationError::Validation(format!(
                    "duplicate asset id {}",
                    component.asset_id
                )));
            }
            weight_sum += component.weight;
        }

        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(SimulationError::Validation(format!(
                "weights must sum to 1.0, got {weight_sum:.6}"
            )));
        }

        Ok(())
    }
}

/// Raw simulation request as received on the wire.
///
/// Integer-coded fields are turned into typed values by [`Self::to_spec`];
/// `maxlookback` is a duration in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    #[serde(rename = "disttype")]
    pub dist_type: i32,
    #[serde(rename = "simulationunitoftime")]
    pub simulation_unit_of_time: usize,
    #[serde(rename = "simulationduration")]
    pub simulation_duration: usize,
    #[serde(rename = "maxlookback")]
    pub max_lookback_secs: i64,
    pub iterations: usize,
    pub seed: u64,
    #[serde(rename = "degreesoffreedom", default)]
    pub degrees_of_freedom: u32,
}

impl SimulationRequest {
    /// Converts the wire request into a validated [`SimulationSpec`].
    pub fn to_spec(&self) -> Result<SimulationSpec, SimulationError> {
        let distribution = Distribution::from_code(self.dist_type).ok_or_else(|| {
            SimulationError::Validation(format!("unknown distribution code {}", self.dist_type))
        })?;
        let cadence =
            Cadence::from_periods_per_year(self.simulation_unit_of_time).ok_or_else(|| {
                SimulationError::Validation(format!(
                    "unknown simulation cadence {}",
                    self.simulation_unit_of_time
                ))
            })?;

        if self.simulation_duration == 0 {
            return Err(SimulationError::Validation(
                "simulation duration must be at least 1 period".to_string(),
            ));
        }
        if self.iterations == 0 {
            return Err(SimulationError::Validation(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.max_lookback_secs <= 0 {
            return Err(SimulationError::Validation(
                "max lookback must be positive".to_string(),
            ));
        }
        if distribution == Distribution::StudentT && self.degrees_of_freedom < 3 {
            return Err(SimulationError::Validation(format!(
                "student-t requires at least 3 degrees of freedom, got {}",
                self.degrees_of_freedom
            )));
        }

        Ok(SimulationSpec {
            distribution,
            degrees_of_freedom: self.degrees_of_freedom,
            cadence,
            duration: self.simulation_duration,
            iterations: self.iterations,
            seed: self.seed,
            max_lookback: chrono::Duration::seconds(self.max_lookback_secs),
        })
    }
}

/// Validated simulation parameters consumed by the engine.
///
/// A seed of 0 requests a randomized, non-reproducible run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSpec {
    pub distribution: Distribution,
    pub degrees_of_freedom: u32,
    pub cadence: Cadence,
    pub duration: usize,
    pub iterations: usize,
    pub seed: u64,
    pub max_lookback: chrono::Duration,
}

/// Scalar risk metrics over the path ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub var95: f64,
    pub var99: f64,
    pub cvar95: f64,
    pub cvar99: f64,
    pub probability_of_loss: f64,
    pub max_drawdown_p95: f64,
    pub mean_final_value: f64,
    pub median_final_value: f64,
}

/// One representative portfolio value path.
///
/// `percentile` is the selection quantile in `[0, 1]`, or -1 for the two
/// extreme paths (maximum drawdown, highest volatility).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePath {
    pub percentile: f64,
    pub label: String,
    pub values: Vec<f64>,
}

/// Per-time-step ensemble bands; every vector has length `duration + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStats {
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
    pub p5: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p95: Vec<f64>,
}

/// Full simulation output returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    #[serde(rename = "riskMetrics")]
    pub risk_metrics: RiskMetrics,
    #[serde(rename = "samplePaths")]
    pub sample_paths: Vec<SamplePath>,
    #[serde(rename = "simulationStats")]
    pub simulation_stats: SimulationStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(components: Vec<(i32, f64)>) -> Scenario {
        Scenario {
            id: 1,
            name: "balanced".to_string(),
            floated_weight: false,
            components: components
                .into_iter()
                .map(|(asset_id, weight)| ScenarioComponent { asset_id, weight })
                .collect(),
        }
    }

    #[test]
    fn valid_scenario_passes_validation() {
        scenario(vec![(1, 0.6), (2, 0.4)]).validate().unwrap();
    }

    #[test]
    fn weight_sum_mismatch_is_rejected_with_sum_in_message() {
        let err = scenario(vec![(1, 0.6), (2, 0.5)]).validate().unwrap_err();
        assert!(err.to_string().contains("sum"), "got: {err}");
    }

    #[test]
    fn duplicate_asset_id_is_rejected() {
        let err = scenario(vec![(1, 0.5), (1, 0.5)]).validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn empty_and_non_positive_weights_are_rejected() {
        assert!(scenario(vec![]).validate().is_err());
        assert!(scenario(vec![(1, 1.0), (2, 0.0)]).validate().is_err());
        assert!(scenario(vec![(1, 1.5), (2, -0.5)]).validate().is_err());
    }

    #[test]
    fn request_parses_wire_field_names() {
        let json = r#"{
            "disttype": 1,
            "simulationunitoftime": 52,
            "simulationduration": 104,
            "maxlookback": 31536000,
            "iterations": 10000,
            "seed": 42,
            "degreesoffreedom": 5
        }"#;
        let request: SimulationRequest = serde_json::from_str(json).unwrap();
        let spec = request.to_spec().unwrap();

        assert_eq!(spec.distribution, Distribution::StudentT);
        assert_eq!(spec.cadence, Cadence::Weekly);
        assert_eq!(spec.duration, 104);
        assert_eq!(spec.iterations, 10_000);
        assert_eq!(spec.max_lookback, chrono::Duration::days(365));
    }

    #[test]
    fn request_validation_rejects_bad_settings() {
        let base = SimulationRequest {
            dist_type: 0,
            simulation_unit_of_time: 52,
            simulation_duration: 52,
            max_lookback_secs: 3600,
            iterations: 100,
            seed: 0,
            degrees_of_freedom: 0,
        };

        let mut bad = base.clone();
        bad.dist_type = 7;
        assert!(bad.to_spec().is_err());

        let mut bad = base.clone();
        bad.simulation_unit_of_time = 53;
        assert!(bad.to_spec().is_err());

        let mut bad = base.clone();
        bad.iterations = 0;
        assert!(bad.to_spec().is_err());

        let mut bad = base.clone();
        bad.dist_type = 1;
        bad.degrees_of_freedom = 2;
        assert!(bad.to_spec().is_err());

        assert!(base.to_spec().is_ok());
    }

    #[test]
    fn response_serializes_with_documented_keys() {
        let response = SimulationResponse {
            risk_metrics: RiskMetrics {
                var95: -0.1,
                var99: -0.2,
                cvar95: -0.15,
                cvar99: -0.25,
                probability_of_loss: 0.3,
                max_drawdown_p95: 0.2,
                mean_final_value: 105.0,
                median_final_value: 104.0,
            },
            sample_paths: vec![SamplePath {
                percentile: 0.5,
                label: "Median".to_string(),
                values: vec![100.0, 101.0],
            }],
            simulation_stats: SimulationStats {
                mean: vec![100.0, 101.0],
                std_dev: vec![0.0, 1.0],
                p5: vec![100.0, 99.0],
                p25: vec![100.0, 100.0],
                p50: vec![100.0, 101.0],
                p75: vec![100.0, 102.0],
                p95: vec![100.0, 103.0],
            },
        };

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("riskMetrics").is_some());
        assert!(value.get("samplePaths").is_some());
        assert!(value.get("simulationStats").is_some());
        assert!(value["riskMetrics"].get("probabilityOfLoss").is_some());
        assert!(value["riskMetrics"].get("maxDrawdownP95").is_some());
        assert!(value["simulationStats"].get("stdDev").is_some());
    }

    #[test]
    fn distribution_and_cadence_names_round_trip() {
        assert_eq!(Distribution::StandardNormal.as_str(), "standardNormal");
        assert_eq!(Distribution::StudentT.as_str(), "studentT");
        assert_eq!(Distribution::from_code(1), Some(Distribution::StudentT));
        assert_eq!(Distribution::from_code(2), None);

        for cadence in [
            Cadence::Daily,
            Cadence::Weekly,
            Cadence::Monthly,
            Cadence::Quarterly,
            Cadence::Yearly,
        ] {
            assert_eq!(
                Cadence::from_periods_per_year(cadence.periods_per_year()),
                Some(cadence)
            );
        }
        assert_eq!(Cadence::Weekly.as_str(), "weekly");
    }
}
