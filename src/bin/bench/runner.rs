// Scenario Runner - synthesize a fleet, run the ensemble, judge the outcome

use std::time::Instant;

use log::info;

use oa_engine::{run_ensemble, AnalysisConfig, EnsembleResult, EnsembleStatus, InputError, TrialOutcome};

use crate::report::ScenarioReport;
use crate::scenarios::{ExpectedStatus, Scenario};
use crate::synthetic::{self, SynthError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("scenario {scenario}: {source}")]
    Synthetic { scenario: &'static str, source: SynthError },
    #[error("scenario {scenario}: {source}")]
    Input { scenario: &'static str, source: InputError },
}

pub struct RunOptions<'a> {
    pub base: &'a AnalysisConfig,
    pub trials: usize,
    pub seed: u64,
    pub parallel: bool,
    pub keep_ensemble: bool,
}

fn status_label(status: &EnsembleStatus) -> String {
    match status {
        EnsembleStatus::Ok => "ok".to_string(),
        EnsembleStatus::Degraded { failure_rate } => format!("degraded ({:.0}%)", failure_rate * 100.0),
        EnsembleStatus::AllFailed => "all_failed".to_string(),
    }
}

fn status_matches(expected: ExpectedStatus, actual: &EnsembleStatus) -> bool {
    match expected {
        ExpectedStatus::Ok => matches!(actual, EnsembleStatus::Ok),
        ExpectedStatus::Completes => !matches!(actual, EnsembleStatus::AllFailed),
        ExpectedStatus::AllFailed => matches!(actual, EnsembleStatus::AllFailed),
    }
}

pub fn run_scenario(scenario: &Scenario, opts: &RunOptions<'_>) -> Result<ScenarioReport, RunError> {
    let plant = synthetic::generate(&scenario.plant, opts.seed)
        .map_err(|source| RunError::Synthetic { scenario: scenario.name, source })?;

    let mut config = opts.base.clone();
    (scenario.configure)(&mut config);
    config.monte_carlo.ensemble_size = opts.trials;
    config.monte_carlo.seed = opts.seed;
    config.monte_carlo.parallel = opts.parallel;
    config.percentiles = vec![5.0, 50.0, 95.0];

    let start = Instant::now();
    let result = run_ensemble(&plant.inputs, &config)
        .map_err(|source| RunError::Input { scenario: scenario.name, source })?;
    let elapsed = start.elapsed();

    let report = build_report(scenario, opts, plant.truth_annual_kwh, result, elapsed.as_millis());
    info!("{}: {} in {} ms", scenario.name, report.status, report.elapsed_ms);
    Ok(report)
}

fn build_report(
    scenario: &Scenario,
    opts: &RunOptions<'_>,
    truth: f64,
    result: EnsembleResult,
    elapsed_ms: u128,
) -> ScenarioReport {
    let central_kwh = match &result.central.outcome {
        TrialOutcome::Completed { estimate, .. } => Some(*estimate),
        TrialOutcome::Failed { .. } => None,
    };
    let central_error = central_kwh.filter(|_| truth > 0.0).map(|c| (c - truth).abs() / truth);

    let status_ok = status_matches(scenario.criteria.status, &result.status);
    let error_ok = match (scenario.criteria.max_central_error, central_error) {
        (Some(limit), Some(err)) => err <= limit,
        (Some(_), None) => false,
        (None, _) => true,
    };

    let dominant = result
        .sensitivity
        .iter()
        .max_by(|a, b| a.variance_share.total_cmp(&b.variance_share));

    ScenarioReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        seed: opts.seed,
        n_trials: result.n_trials,
        status: status_label(&result.status),
        pass: status_ok && error_ok,
        truth_annual_kwh: truth,
        central_kwh,
        central_error,
        mean_kwh: result.mean(),
        p5_kwh: result.percentile(5.0),
        p50_kwh: result.percentile(50.0),
        p95_kwh: result.percentile(95.0),
        cv: result.summary.as_ref().map(|s| s.cv),
        failure_rate: result.failure_rate,
        failures: result.failures.clone(),
        dominant_axis: dominant.map(|s| s.axis.label().to_string()),
        dominant_share: dominant.map(|s| s.variance_share),
        warnings: result.warnings.clone(),
        elapsed_ms,
        trials_per_sec: if elapsed_ms > 0 {
            result.n_trials as f64 / (elapsed_ms as f64 / 1000.0)
        } else {
            0.0
        },
        ensemble: if opts.keep_ensemble { Some(result) } else { None },
    }
}
