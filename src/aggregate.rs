// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Result Aggregator

//! Reduces the trial records of one run into the ensemble result:
//! summary statistics over completed trials, per-axis sensitivity and the
//! failure breakdown.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::monte_carlo::{Axis, AxisLevel, CentralEstimate, TrialRecord};

// ─── Status ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnsembleStatus {
    Ok,
    /// More trials failed than the configured tolerance.
    Degraded { failure_rate: f64 },
    /// No trial completed; no numeric summary exists.
    AllFailed,
}

// ─── Summary Statistics ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PercentileBound {
    pub percentile: f64,
    pub value: f64,
}

/// Statistics over the completed-trial estimates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimateSummary {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Coefficient of variation, `std_dev / |mean|` (0 when the mean is 0).
    pub cv: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<PercentileBound>,
}

impl EstimateSummary {
    /// `None` for an empty sample.
    pub fn from_samples(samples: &[f64], percentiles: &[f64]) -> Option<Self> {
        let n = samples.len();
        if n == 0 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        let cv = if mean != 0.0 { std_dev / mean.abs() } else { 0.0 };

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Self {
            n,
            mean,
            std_dev,
            cv,
            min: sorted[0],
            max: sorted[n - 1],
            percentiles: percentiles
                .iter()
                .map(|&p| PercentileBound { percentile: p, value: percentile(&sorted, p) })
                .collect(),
        })
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles.iter().find(|b| b.percentile == p).map(|b| b.value)
    }
}

/// Linear interpolation between the order statistics bracketing `p`
/// (0-100) of an ascending slice. Clamped to the bracketing pair, so
/// larger `p` never yields a smaller bound.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let (a, b) = (sorted[lo], sorted[hi]);
            (a + (b - a) * (pos - lo as f64)).clamp(a, b)
        }
    }
}

// ─── Sensitivity ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelGroup {
    pub label: String,
    pub count: usize,
    pub mean: f64,
}

/// How much of the ensemble spread one axis explains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AxisSensitivity {
    pub axis: Axis,
    /// Between-group share of the total sum of squares (η², in [0, 1]).
    pub variance_share: f64,
    pub groups: Vec<LevelGroup>,
}

fn axis_sensitivity(axis: Axis, completed: &[(&TrialRecord, f64)], bins: usize) -> AxisSensitivity {
    let mut discrete: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut continuous: Vec<(f64, usize, f64)> = Vec::new();
    for (trial, estimate) in completed {
        match trial.assumptions.level(axis) {
            AxisLevel::Discrete(label) => {
                let slot = discrete.entry(label).or_insert((0.0, 0));
                slot.0 += estimate;
                slot.1 += 1;
            }
            AxisLevel::Continuous(value) => continuous.push((value, trial.index, *estimate)),
        }
    }

    let mut groups: Vec<LevelGroup> = discrete
        .into_iter()
        .map(|(label, (sum, count))| LevelGroup { label, count, mean: sum / count as f64 })
        .collect();

    if !continuous.is_empty() {
        continuous.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let n = continuous.len();
        let bins = bins.clamp(1, n);
        for b in 0..bins {
            let chunk = &continuous[b * n / bins..(b + 1) * n / bins];
            let (lo, hi) = (chunk[0].0, chunk[chunk.len() - 1].0);
            groups.push(LevelGroup {
                label: format!("[{lo:.4}, {hi:.4}]"),
                count: chunk.len(),
                mean: chunk.iter().map(|c| c.2).sum::<f64>() / chunk.len() as f64,
            });
        }
    }

    let n = completed.len() as f64;
    let grand = completed.iter().map(|c| c.1).sum::<f64>() / n;
    let total_ss = completed.iter().map(|c| (c.1 - grand).powi(2)).sum::<f64>();
    let between_ss = groups.iter().map(|g| g.count as f64 * (g.mean - grand).powi(2)).sum::<f64>();
    let variance_share = if total_ss > 0.0 { (between_ss / total_ss).clamp(0.0, 1.0) } else { 0.0 };

    AxisSensitivity { axis, variance_share, groups }
}

// ─── EnsembleResult ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnsembleResult {
    pub status: EnsembleStatus,
    pub seed: u64,
    pub n_trials: usize,
    pub n_completed: usize,
    pub n_failed: usize,
    pub failure_rate: f64,
    pub central: CentralEstimate,
    pub summary: Option<EstimateSummary>,
    pub sensitivity: Vec<AxisSensitivity>,
    /// Failed-trial counts keyed by failure kind.
    pub failures: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
    pub trials: Vec<TrialRecord>,
}

impl EnsembleResult {
    pub fn mean(&self) -> Option<f64> {
        self.summary.as_ref().map(|s| s.mean)
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.summary.as_ref()?.percentile(p)
    }

    pub fn sensitivity_for(&self, axis: Axis) -> Option<&AxisSensitivity> {
        self.sensitivity.iter().find(|s| s.axis == axis)
    }

    pub fn completed_estimates(&self) -> Vec<f64> {
        self.trials.iter().filter_map(|t| t.outcome.estimate()).collect()
    }
}

/// Assemble the ensemble result from the central pass and the trial
/// records, which must already be in index order.
pub fn aggregate_ensemble(
    config: &AnalysisConfig,
    axes: &[Axis],
    central: CentralEstimate,
    trials: Vec<TrialRecord>,
) -> EnsembleResult {
    let completed: Vec<(&TrialRecord, f64)> = trials
        .iter()
        .filter_map(|t| t.outcome.estimate().map(|e| (t, e)))
        .collect();

    let mut failures: BTreeMap<String, usize> = BTreeMap::new();
    for reason in trials.iter().filter_map(|t| t.outcome.failure()) {
        *failures.entry(reason.kind().to_string()).or_insert(0) += 1;
    }

    let n_trials = trials.len();
    let n_completed = completed.len();
    let n_failed = n_trials - n_completed;
    let failure_rate = if n_trials > 0 { n_failed as f64 / n_trials as f64 } else { 0.0 };

    let mut warnings = Vec::new();
    let status = if n_completed == 0 {
        warnings.push(format!("all {n_trials} trials failed"));
        EnsembleStatus::AllFailed
    } else if failure_rate > config.monte_carlo.max_failure_rate {
        warnings.push(format!(
            "{n_failed} of {n_trials} trials failed ({:.1}%), above the {:.1}% tolerance",
            failure_rate * 100.0,
            config.monte_carlo.max_failure_rate * 100.0
        ));
        EnsembleStatus::Degraded { failure_rate }
    } else {
        EnsembleStatus::Ok
    };
    if let Some(reason) = central.outcome.failure() {
        warnings.push(format!("central estimate failed: {reason}"));
    }
    for w in &warnings {
        warn!("{w}");
    }

    let estimates: Vec<f64> = completed.iter().map(|c| c.1).collect();
    let summary = EstimateSummary::from_samples(&estimates, &config.percentiles);

    let sensitivity = if n_completed == 0 {
        Vec::new()
    } else {
        axes.iter()
            .map(|&axis| axis_sensitivity(axis, &completed, config.monte_carlo.sensitivity_bins))
            .collect()
    };

    EnsembleResult {
        status,
        seed: config.monte_carlo.seed,
        n_trials,
        n_completed,
        n_failed,
        failure_rate,
        central,
        summary,
        sensitivity,
        failures,
        warnings,
        trials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monte_carlo::{Assumptions, TrialDiagnostics, TrialOutcome};
    use crate::regression::{FitError, FitResult, RegressionFamily};

    fn fit() -> FitResult {
        FitResult {
            family: RegressionFamily::Ols,
            slope: 1.0,
            intercept: 0.0,
            estimate: 1.0,
            r_squared: 1.0,
            residual_se: 0.0,
            n_obs: 12,
        }
    }

    fn trial(index: usize, assumptions: Assumptions, estimate: Option<f64>) -> TrialRecord {
        let outcome = match estimate {
            Some(estimate) => TrialOutcome::Completed { estimate, fit: fit() },
            None => TrialOutcome::Failed { reason: FitError::DegenerateCovariate { variance: 0.0 } },
        };
        TrialRecord { index, assumptions, diagnostics: TrialDiagnostics::default(), outcome }
    }

    fn central(config: &AnalysisConfig) -> CentralEstimate {
        CentralEstimate {
            assumptions: Assumptions::central(config),
            diagnostics: TrialDiagnostics::default(),
            outcome: TrialOutcome::Completed { estimate: 10.0, fit: fit() },
        }
    }

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert!((percentile(&sorted, 10.0) - 1.4).abs() < 1e-12);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn summary_statistics() {
        let s = EstimateSummary::from_samples(&[4.0, 2.0, 6.0, 8.0], &[5.0, 50.0, 95.0])
            .expect("test: non-empty");
        assert_eq!(s.mean, 5.0);
        assert!((s.std_dev - (20.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!((s.min, s.max), (2.0, 8.0));
        assert_eq!(s.percentile(50.0), Some(5.0));
        assert!(s.percentile(5.0) <= s.percentile(50.0));
        assert!(s.percentile(50.0) <= s.percentile(95.0));
        assert!(EstimateSummary::from_samples(&[], &[50.0]).is_none());
    }

    #[test]
    fn status_tracks_failure_rate() {
        let config = AnalysisConfig::default();
        let a = Assumptions::central(&config);

        let ok: Vec<_> = (0..10).map(|i| trial(i, a.clone(), if i < 9 { Some(1.0) } else { None })).collect();
        let result = aggregate_ensemble(&config, &[], central(&config), ok);
        assert_eq!(result.status, EnsembleStatus::Ok);
        assert_eq!(result.failures.get("degenerate_covariate"), Some(&1));

        let degraded: Vec<_> = (0..10).map(|i| trial(i, a.clone(), if i < 5 { Some(1.0) } else { None })).collect();
        let result = aggregate_ensemble(&config, &[], central(&config), degraded);
        assert_eq!(result.status, EnsembleStatus::Degraded { failure_rate: 0.5 });
        assert_eq!(result.warnings.len(), 1);

        let failed: Vec<_> = (0..4).map(|i| trial(i, a.clone(), None)).collect();
        let result = aggregate_ensemble(&config, &[], central(&config), failed);
        assert_eq!(result.status, EnsembleStatus::AllFailed);
        assert!(result.summary.is_none());
        assert_eq!(result.mean(), None);
        assert_eq!(result.n_failed, 4);
    }

    #[test]
    fn discrete_axis_explaining_everything_has_full_share() {
        let config = AnalysisConfig::default();
        let trials: Vec<_> = (0..20)
            .map(|i| {
                let mut a = Assumptions::central(&config);
                a.family = if i % 2 == 0 { RegressionFamily::Ols } else { RegressionFamily::Huber };
                trial(i, a, Some(if i % 2 == 0 { 100.0 } else { 110.0 }))
            })
            .collect();
        let result = aggregate_ensemble(&config, &[Axis::RegressionFamily, Axis::LongTermEnd], central(&config), trials);

        let family = result.sensitivity_for(Axis::RegressionFamily).expect("test: family axis");
        assert!((family.variance_share - 1.0).abs() < 1e-12);
        assert_eq!(family.groups.len(), 2);
        assert_eq!(family.groups[0].label, "huber");
        assert_eq!(family.groups[0].mean, 110.0);

        let end = result.sensitivity_for(Axis::LongTermEnd).expect("test: end axis");
        assert_eq!(end.groups.len(), 1);
        assert_eq!(end.variance_share, 0.0);
    }

    #[test]
    fn continuous_axis_uses_equal_count_bins() {
        let mut config = AnalysisConfig::default();
        config.monte_carlo.sensitivity_bins = 4;
        let trials: Vec<_> = (0..20)
            .map(|i| {
                let mut a = Assumptions::central(&config);
                a.meter_factor = 0.9 + 0.01 * ((i * 7) % 20) as f64;
                let estimate = 1000.0 * a.meter_factor;
                trial(i, a, Some(estimate))
            })
            .collect();
        let result = aggregate_ensemble(&config, &[Axis::MeterCalibration], central(&config), trials);
        let meter = result.sensitivity_for(Axis::MeterCalibration).expect("test: meter axis");
        assert_eq!(meter.groups.len(), 4);
        assert!(meter.groups.iter().all(|g| g.count == 5));
        assert!(meter.groups.windows(2).all(|w| w[0].mean < w[1].mean));
        assert!(meter.variance_share > 0.9 && meter.variance_share <= 1.0);
    }
}
