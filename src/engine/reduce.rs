//! Reduces a path ensemble to risk metrics, representative sample paths, and
//! per-time-step percentile bands.
//!
//! The ensemble is sorted once by final value; every quantile below uses the
//! `sorted[floor(q * (len - 1))]` empirical convention so outputs are
//! bit-stable across platforms. Total return is a monotone function of final
//! value, so the same order serves both.

use std::cmp::Ordering;

use crate::core::{RiskMetrics, SamplePath, SimulationError, SimulationResponse, SimulationStats};
use crate::engine::paths::PathResult;
use crate::math::{mean, sample_std_dev};

const PERCENTILE_LABELS: [(f64, &str); 5] = [
    (0.05, "5th Percentile"),
    (0.25, "25th Percentile"),
    (0.50, "Median"),
    (0.75, "75th Percentile"),
    (0.95, "95th Percentile"),
];

/// Sentinel percentile for the two extreme sample paths.
const EXTREME_PERCENTILE: f64 = -1.0;

/// Empirical quantile of an ascending-sorted sample: `sorted[floor(q * (len - 1))]`.
pub fn empirical_quantile(sorted: &[f64], q: f64) -> Result<f64, SimulationError> {
    if sorted.is_empty() {
        return Err(SimulationError::Numeric(
            "empirical quantile of empty sample".to_string(),
        ));
    }
    let index = (q * (sorted.len() - 1) as f64).floor() as usize;
    Ok(sorted[index.min(sorted.len() - 1)])
}

/// Conditional value-at-risk: mean of the lowest `ceil(alpha * len)` values
/// of an ascending-sorted sample.
pub fn conditional_var(sorted: &[f64], alpha: f64) -> Result<f64, SimulationError> {
    if sorted.is_empty() {
        return Err(SimulationError::Numeric(
            "conditional value-at-risk of empty sample".to_string(),
        ));
    }
    let cutoff = ((alpha * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    Ok(mean(&sorted[..cutoff]))
}

/// Builds the full simulation response from the path ensemble.
pub fn build_response(results: &[PathResult]) -> Result<SimulationResponse, SimulationError> {
    if results.is_empty() {
        return Err(SimulationError::Numeric(
            "no simulation results to reduce".to_string(),
        ));
    }

    // One ascending final-value order, ties broken by original index.
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by(|&a, &b| {
        results[a]
            .final_value
            .partial_cmp(&results[b].final_value)
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let risk_metrics = calculate_risk_metrics(results, &order)?;
    let sample_paths = select_sample_paths(results, &order);
    let simulation_stats = calculate_summary_stats(results)?;

    Ok(SimulationResponse {
        risk_metrics,
        sample_paths,
        simulation_stats,
    })
}

fn calculate_risk_metrics(
    results: &[PathResult],
    order: &[usize],
) -> Result<RiskMetrics, SimulationError> {
    let n = results.len();
    let total_returns: Vec<f64> = order.iter().map(|&i| results[i].total_return).collect();
    let final_values: Vec<f64> = order.iter().map(|&i| results[i].final_value).collect();

    let var95 = empirical_quantile(&total_returns, 0.05)?;
    let var99 = empirical_quantile(&total_returns, 0.01)?;
    let cvar95 = conditional_var(&total_returns, 0.05)?;
    let cvar99 = conditional_var(&total_returns, 0.01)?;

    let loss_count = total_returns.iter().filter(|r| **r < 0.0).count();
    let probability_of_loss = loss_count as f64 / n as f64;

    // Drawdowns are not monotone in final value, so they get their own sort.
    let mut max_drawdowns: Vec<f64> = results.iter().map(|r| r.max_drawdown).collect();
    max_drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let max_drawdown_p95 = empirical_quantile(&max_drawdowns, 0.95)?;

    Ok(RiskMetrics {
        var95,
        var99,
        cvar95,
        cvar99,
        probability_of_loss,
        max_drawdown_p95,
        mean_final_value: mean(&final_values),
        median_final_value: empirical_quantile(&final_values, 0.50)?,
    })
}

fn select_sample_paths(results: &[PathResult], order: &[usize]) -> Vec<SamplePath> {
    let n = results.len();
    let mut sample_paths = Vec::with_capacity(PERCENTILE_LABELS.len() + 2);

    for (percentile, label) in PERCENTILE_LABELS {
        let index = (percentile * (n - 1) as f64).floor() as usize;
        sample_paths.push(SamplePath {
            percentile,
            label: label.to_string(),
            values: results[order[index.min(n - 1)]].values.clone(),
        });
    }

    // Extremes scan the original order, so ties pick the lower index.
    let mut max_drawdown_index = 0;
    let mut max_volatility_index = 0;
    for (i, result) in results.iter().enumerate() {
        if result.max_drawdown > results[max_drawdown_index].max_drawdown {
            max_drawdown_index = i;
        }
        if result.annualized_volatility > results[max_volatility_index].annualized_volatility {
            max_volatility_index = i;
        }
    }

    sample_paths.push(SamplePath {
        percentile: EXTREME_PERCENTILE,
        label: "Maximum Drawdown".to_string(),
        values: results[max_drawdown_index].values.clone(),
    });
    sample_paths.push(SamplePath {
        percentile: EXTREME_PERCENTILE,
        label: "Highest Volatility".to_string(),
        values: results[max_volatility_index].values.clone(),
    });

    sample_paths
}

fn calculate_summary_stats(results: &[PathResult]) -> Result<SimulationStats, SimulationError> {
    let n_results = results.len();
    let n_steps = results[0].values.len();

    let mut stats = SimulationStats {
        mean: Vec::with_capacity(n_steps),
        std_dev: Vec::with_capacity(n_steps),
        p5: Vec::with_capacity(n_steps),
        p25: Vec::with_capacity(n_steps),
        p50: Vec::with_capacity(n_steps),
        p75: Vec::with_capacity(n_steps),
        p95: Vec::with_capacity(n_steps),
    };

    let mut column = vec![0.0_f64; n_results];
    for step in 0..n_steps {
        for (slot, result) in column.iter_mut().zip(results.iter()) {
            *slot = result.values[step];
        }
        column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        stats.mean.push(mean(&column));
        stats.std_dev.push(sample_std_dev(&column));
        stats.p5.push(empirical_quantile(&column, 0.05)?);
        stats.p25.push(empirical_quantile(&column, 0.25)?);
        stats.p50.push(empirical_quantile(&column, 0.50)?);
        stats.p75.push(empirical_quantile(&column, 0.75)?);
        stats.p95.push(empirical_quantile(&column, 0.95)?);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn path(values: Vec<f64>) -> PathResult {
        PathResult::from_values(values, 52.0)
    }

    #[test]
    fn empirical_quantile_uses_floor_convention() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        // floor(0.05 * 4) = 0, floor(0.5 * 4) = 2, floor(0.95 * 4) = 3.
        assert_eq!(empirical_quantile(&sorted, 0.05).unwrap(), 1.0);
        assert_eq!(empirical_quantile(&sorted, 0.50).unwrap(), 3.0);
        assert_eq!(empirical_quantile(&sorted, 0.95).unwrap(), 4.0);
        assert_eq!(empirical_quantile(&sorted, 1.0).unwrap(), 5.0);
        assert!(empirical_quantile(&[], 0.5).is_err());
    }

    #[test]
    fn conditional_var_averages_the_tail() {
        let sorted = [-0.5, -0.3, -0.1, 0.2, 0.4, 0.6, 0.7, 0.8, 0.9, 1.0];
        // ceil(0.25 * 10) = 3 values in the tail.
        let cvar = conditional_var(&sorted, 0.25).unwrap();
        assert_relative_eq!(cvar, (-0.5 - 0.3 - 0.1) / 3.0);
        // ceil(0.01 * 10) = 1: just the worst value.
        assert_relative_eq!(conditional_var(&sorted, 0.01).unwrap(), -0.5);
    }

    #[test]
    fn response_has_expected_shapes_and_ordering() {
        let results: Vec<PathResult> = (0..40)
            .map(|i| {
                let end = 80.0 + i as f64;
                path(vec![100.0, 0.5 * (100.0 + end), end])
            })
            .collect();

        let response = build_response(&results).unwrap();

        assert_eq!(response.sample_paths.len(), 7);
        for sample in &response.sample_paths {
            assert_eq!(sample.values.len(), 3);
        }
        assert_eq!(response.sample_paths[2].label, "Median");
        assert_eq!(response.sample_paths[5].label, "Maximum Drawdown");
        assert_eq!(response.sample_paths[5].percentile, -1.0);
        assert_eq!(response.sample_paths[6].label, "Highest Volatility");

        let stats = &response.simulation_stats;
        for band in [
            &stats.mean,
            &stats.std_dev,
            &stats.p5,
            &stats.p25,
            &stats.p50,
            &stats.p75,
            &stats.p95,
        ] {
            assert_eq!(band.len(), 3);
        }
        // Bands at the initial step collapse onto the initial value.
        assert_relative_eq!(stats.mean[0], 100.0);
        assert_eq!(stats.std_dev[0], 0.0);
        assert_relative_eq!(stats.p5[0], 100.0);

        // Band ordering at the terminal step.
        assert!(stats.p5[2] <= stats.p25[2]);
        assert!(stats.p25[2] <= stats.p50[2]);
        assert!(stats.p50[2] <= stats.p75[2]);
        assert!(stats.p75[2] <= stats.p95[2]);
    }

    #[test]
    fn risk_metrics_on_a_known_ensemble() {
        // Final values 81..=120 over initial 100.
        let results: Vec<PathResult> = (0..40)
            .map(|i| {
                let end = 81.0 + i as f64;
                path(vec![100.0, 0.5 * (100.0 + end), end])
            })
            .collect();

        let response = build_response(&results).unwrap();
        let metrics = &response.risk_metrics;

        // floor(0.05 * 39) = 1 -> second-worst total return.
        assert_relative_eq!(metrics.var95, (82.0 - 100.0) / 100.0);
        // floor(0.01 * 39) = 0 -> worst total return.
        assert_relative_eq!(metrics.var99, (81.0 - 100.0) / 100.0);
        // ceil(0.05 * 40) = 2 -> mean of two worst.
        assert_relative_eq!(metrics.cvar95, ((81.0 - 100.0) + (82.0 - 100.0)) / 200.0);
        // 19 of 40 paths lose money.
        assert_relative_eq!(metrics.probability_of_loss, 19.0 / 40.0);
        assert_relative_eq!(metrics.mean_final_value, (81.0 + 120.0) / 2.0);
        // floor(0.5 * 39) = 19 -> final value 100.
        assert_relative_eq!(metrics.median_final_value, 100.0);
        assert!(metrics.cvar99 <= metrics.var99);
    }

    #[test]
    fn extreme_ties_pick_the_lower_original_index() {
        // Identical drawdown/volatility across all paths.
        let results = vec![
            path(vec![100.0, 90.0, 108.0]),
            path(vec![100.0, 90.0, 108.0]),
            path(vec![100.0, 90.0, 108.0]),
        ];
        let response = build_response(&results).unwrap();
        assert_eq!(response.sample_paths[5].values, results[0].values);
        assert_eq!(response.sample_paths[6].values, results[0].values);
    }

    #[test]
    fn empty_ensemble_is_a_numeric_error() {
        assert!(matches!(
            build_response(&[]).unwrap_err(),
            SimulationError::Numeric(_)
        ));
    }
}
