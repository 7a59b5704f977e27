// Scenario Definitions - synthetic fleets paired with analysis configurations
// Each scenario states the ensemble status it must reach and, when the
// ensemble completes, how close the central estimate must land to the truth.

use oa_engine::config::{ParamDist, YearShift};
use oa_engine::{AnalysisConfig, PeriodLength, RegressionFamily};

use crate::synthetic::PlantProfile;

// ─── Scenario Configuration ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedStatus {
    Ok,
    /// Ok or Degraded; some failures are part of the scenario.
    Completes,
    AllFailed,
}

pub struct PassCriteria {
    pub status: ExpectedStatus,
    /// Largest tolerated |central - truth| / truth.
    pub max_central_error: Option<f64>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self { status: ExpectedStatus::Ok, max_central_error: Some(0.10) }
    }
}

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub plant: PlantProfile,
    /// Adjusts the base configuration for this scenario.
    pub configure: fn(&mut AnalysisConfig),
    pub criteria: PassCriteria,
}

// ─── Configuration Presets ──────────────────────────────────────────────────

fn qc_limits(config: &mut AnalysisConfig) {
    config.qc.defaults.min = Some(0.0);
    config.qc.defaults.max = Some(60_000.0);
    config.qc.defaults.stale_run_length = Some(3);
}

fn baseline(config: &mut AnalysisConfig) {
    qc_limits(config);
}

fn full_uncertainty(config: &mut AnalysisConfig) {
    qc_limits(config);
    config.qc.perturbation.max = Some(ParamDist::Uniform { low: 55_000.0, high: 65_000.0 });
    config.qc.perturbation.stale_run_length = Some(ParamDist::Uniform { low: 2.0, high: 6.0 });
    config.resampling.completeness_perturbation = Some(ParamDist::Uniform { low: 0.7, high: 0.9 });
    config.regression.candidates = vec![
        RegressionFamily::Ols,
        RegressionFamily::Huber,
        RegressionFamily::TheilSen,
        RegressionFamily::Weighted,
    ];
    config.long_term.start_shift_years = YearShift { min: 0, max: 5 };
    config.long_term.end_shift_years = YearShift { min: -2, max: 0 };
    config.monte_carlo.meter_uncertainty = 0.005;
}

fn period_choice(config: &mut AnalysisConfig) {
    qc_limits(config);
    config.resampling.period_candidates = vec![PeriodLength::Monthly, PeriodLength::Daily];
    config.regression.min_valid_periods = 12;
}

fn window_only(config: &mut AnalysisConfig) {
    qc_limits(config);
    config.long_term.start_shift_years = YearShift { min: 0, max: 10 };
}

fn robust(config: &mut AnalysisConfig) {
    // Spikes pass QC here; only the estimator can absorb them
    config.qc.defaults.min = Some(0.0);
    config.regression.candidates = vec![RegressionFamily::Huber, RegressionFamily::TheilSen];
    config.regression.family = RegressionFamily::TheilSen;
}

// ─── Scenario Table ─────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "BASELINE",
            label: "Baseline fleet, fixed assumptions",
            category: "core",
            plant: PlantProfile::default(),
            configure: baseline,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "FULL_UNCERTAINTY",
            label: "Every axis perturbed",
            category: "core",
            plant: PlantProfile { spike_rate: 0.002, stuck_days: 5, ..Default::default() },
            configure: full_uncertainty,
            criteria: PassCriteria { status: ExpectedStatus::Completes, ..Default::default() },
        },
        Scenario {
            name: "GAPPY_FLEET",
            label: "Outages plus one dark month",
            category: "data-quality",
            plant: PlantProfile { outage_rate: 0.10, empty_month: Some(7), ..Default::default() },
            configure: baseline,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "PERIOD_CHOICE",
            label: "Daily vs monthly aggregation",
            category: "core",
            plant: PlantProfile { turbines: 2, ..Default::default() },
            configure: period_choice,
            criteria: PassCriteria { max_central_error: Some(0.15), ..Default::default() },
        },
        Scenario {
            name: "LT_WINDOW_ONLY",
            label: "Only the long-term window moves",
            category: "sensitivity",
            plant: PlantProfile::default(),
            configure: window_only,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "ROBUST_SPIKES",
            label: "Corrupt spikes, robust estimators",
            category: "data-quality",
            plant: PlantProfile { spike_rate: 0.01, ..Default::default() },
            configure: robust,
            criteria: PassCriteria { status: ExpectedStatus::Completes, max_central_error: Some(0.20) },
        },
        Scenario {
            name: "SHORT_RECORD",
            label: "Eight months of operation",
            category: "failure",
            plant: PlantProfile { operational_months: 8, ..Default::default() },
            configure: baseline,
            criteria: PassCriteria { status: ExpectedStatus::AllFailed, max_central_error: None },
        },
        Scenario {
            name: "FLAT_REFERENCE",
            label: "Constant reference covariate",
            category: "failure",
            plant: PlantProfile { flat_reference: true, ..Default::default() },
            configure: baseline,
            criteria: PassCriteria { status: ExpectedStatus::AllFailed, max_central_error: None },
        },
    ]
}
