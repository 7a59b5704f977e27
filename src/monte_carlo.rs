// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Monte Carlo Uncertainty Driver

//! Runs the estimation pipeline once unperturbed (the central estimate)
//! and then M times under independently sampled assumptions.
//!
//! Trial `i` draws from its own ChaCha8 stream (`seed`, stream `i`), so a
//! trial's assumptions depend only on the seed and its index. Trials share
//! nothing mutable; results are collected in index order, which makes the
//! ensemble bit-identical whether it ran on one thread or many.

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use crate::aggregate::{aggregate_ensemble, EnsembleResult};
use crate::config::{AnalysisConfig, ParamDist};
use crate::correlator::{correlate, long_term_distribution, observations};
use crate::error::InputError;
use crate::inputs::PreparedInputs;
use crate::qc::{apply_qc, QcDraw, QcSummary};
use crate::regression::{estimate, FitError, FitResult, RegressionFamily};
use crate::resample::{aggregate, PeriodLength};
use crate::types::{MeasurementSeries, PlantInputs};

// ─── Axes ───────────────────────────────────────────────────────────────────

/// One perturbable assumption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    QcMin,
    QcMax,
    QcStaleRun,
    Period,
    CompletenessThreshold,
    RegressionFamily,
    LongTermStart,
    LongTermEnd,
    MeterCalibration,
}

impl Axis {
    pub const ALL: [Axis; 9] = [
        Self::QcMin,
        Self::QcMax,
        Self::QcStaleRun,
        Self::Period,
        Self::CompletenessThreshold,
        Self::RegressionFamily,
        Self::LongTermStart,
        Self::LongTermEnd,
        Self::MeterCalibration,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::QcMin => "qc_min",
            Self::QcMax => "qc_max",
            Self::QcStaleRun => "qc_stale_run",
            Self::Period => "period",
            Self::CompletenessThreshold => "completeness_threshold",
            Self::RegressionFamily => "regression_family",
            Self::LongTermStart => "long_term_start",
            Self::LongTermEnd => "long_term_end",
            Self::MeterCalibration => "meter_calibration",
        }
    }

    /// True when the configuration lets this axis vary between trials.
    pub fn is_active(&self, config: &AnalysisConfig) -> bool {
        let varies = |dist: &Option<ParamDist>| dist.as_ref().map_or(false, |d| !d.is_fixed());
        let qc = &config.qc.perturbation;
        match self {
            Self::QcMin => varies(&qc.min),
            Self::QcMax => varies(&qc.max),
            Self::QcStaleRun => varies(&qc.stale_run_length),
            Self::Period => distinct(config.resampling.candidates()) > 1,
            Self::CompletenessThreshold => varies(&config.resampling.completeness_perturbation),
            Self::RegressionFamily => distinct(config.regression.candidates()) > 1,
            Self::LongTermStart => !config.long_term.start_shift_years.is_fixed(),
            Self::LongTermEnd => !config.long_term.end_shift_years.is_fixed(),
            Self::MeterCalibration => config.monte_carlo.meter_uncertainty > 0.0,
        }
    }
}

fn distinct<T: Ord>(mut items: Vec<T>) -> usize {
    items.sort();
    items.dedup();
    items.len()
}

/// Axes that vary under `config`, in declaration order.
pub fn active_axes(config: &AnalysisConfig) -> Vec<Axis> {
    Axis::ALL.into_iter().filter(|a| a.is_active(config)).collect()
}

/// Value an axis took in one trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AxisLevel {
    Discrete(String),
    Continuous(f64),
}

// ─── Assumptions ────────────────────────────────────────────────────────────

/// The full set of choices one trial runs under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assumptions {
    pub qc: QcDraw,
    pub period: PeriodLength,
    pub completeness_threshold: f64,
    pub family: RegressionFamily,
    pub long_term_start_shift: i32,
    pub long_term_end_shift: i32,
    pub meter_factor: f64,
}

impl Assumptions {
    /// Unperturbed defaults.
    pub fn central(config: &AnalysisConfig) -> Self {
        Self {
            qc: QcDraw::default(),
            period: config.resampling.period,
            completeness_threshold: config.resampling.completeness_threshold,
            family: config.regression.family,
            long_term_start_shift: 0,
            long_term_end_shift: 0,
            meter_factor: 1.0,
        }
    }

    /// Draw every configured perturbation in a fixed order.
    pub fn sample<R: Rng + ?Sized>(config: &AnalysisConfig, rng: &mut R) -> Self {
        let qc = &config.qc.perturbation;
        let draw = QcDraw {
            min: qc.min.map(|d| d.sample(rng)),
            max: qc.max.map(|d| d.sample(rng)),
            stale_run_length: qc.stale_run_length.map(|d| d.sample(rng).round().max(1.0) as usize),
        };

        let periods = config.resampling.candidates();
        let period = pick(&periods, rng).unwrap_or(config.resampling.period);

        let completeness_threshold = match &config.resampling.completeness_perturbation {
            Some(dist) => dist.sample(rng).clamp(0.0, 1.0),
            None => config.resampling.completeness_threshold,
        };

        let families = config.regression.candidates();
        let family = pick(&families, rng).unwrap_or(config.regression.family);

        let long_term_start_shift = config.long_term.start_shift_years.sample(rng);
        let long_term_end_shift = config.long_term.end_shift_years.sample(rng);

        let sigma = config.monte_carlo.meter_uncertainty;
        let meter_factor = ParamDist::Normal { mean: 1.0, std_dev: sigma }.sample(rng);

        Self {
            qc: draw,
            period,
            completeness_threshold,
            family,
            long_term_start_shift,
            long_term_end_shift,
            meter_factor,
        }
    }

    pub fn level(&self, axis: Axis) -> AxisLevel {
        match axis {
            Axis::QcMin => AxisLevel::Continuous(self.qc.min.unwrap_or(f64::NEG_INFINITY)),
            Axis::QcMax => AxisLevel::Continuous(self.qc.max.unwrap_or(f64::INFINITY)),
            Axis::QcStaleRun => AxisLevel::Discrete(
                self.qc.stale_run_length.map_or_else(|| "off".to_string(), |n| n.to_string()),
            ),
            Axis::Period => AxisLevel::Discrete(self.period.label().to_string()),
            Axis::CompletenessThreshold => AxisLevel::Continuous(self.completeness_threshold),
            Axis::RegressionFamily => AxisLevel::Discrete(self.family.label().to_string()),
            Axis::LongTermStart => AxisLevel::Discrete(format!("{:+}", self.long_term_start_shift)),
            Axis::LongTermEnd => AxisLevel::Discrete(format!("{:+}", self.long_term_end_shift)),
            Axis::MeterCalibration => AxisLevel::Continuous(self.meter_factor),
        }
    }
}

/// Uniform pick; a single candidate consumes no randomness.
fn pick<T: Copy, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Option<T> {
    match items.len() {
        0 => None,
        1 => Some(items[0]),
        n => Some(items[rng.gen_range(0..n)]),
    }
}

/// Generator for trial `index` of a run seeded with `seed`.
pub fn trial_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    rng
}

// ─── Trial Records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// `estimate` is annualized output at the long-term reference level.
    Completed { estimate: f64, fit: FitResult },
    Failed { reason: FitError },
}

impl TrialOutcome {
    pub fn estimate(&self) -> Option<f64> {
        match self {
            Self::Completed { estimate, .. } => Some(*estimate),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FitError> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}

/// What the pipeline saw on the way to the outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrialDiagnostics {
    pub qc: QcSummary,
    pub periods_total: usize,
    pub periods_valid: usize,
    pub mean_completeness: f64,
    pub long_term_periods: usize,
    pub long_term_covariate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRecord {
    pub index: usize,
    pub assumptions: Assumptions,
    pub diagnostics: TrialDiagnostics,
    pub outcome: TrialOutcome,
}

/// The single unperturbed pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CentralEstimate {
    pub assumptions: Assumptions,
    pub diagnostics: TrialDiagnostics,
    pub outcome: TrialOutcome,
}

// ─── Trial ──────────────────────────────────────────────────────────────────

/// A trial whose assumptions have been drawn but which has not yet run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTrial {
    pub index: usize,
    pub assumptions: Assumptions,
}

impl SampledTrial {
    pub fn sample<R: Rng + ?Sized>(index: usize, config: &AnalysisConfig, rng: &mut R) -> Self {
        Self { index, assumptions: Assumptions::sample(config, rng) }
    }

    pub fn run(self, prepared: &PreparedInputs<'_>, config: &AnalysisConfig) -> TrialRecord {
        let (diagnostics, outcome) = run_pipeline(prepared, config, &self.assumptions);
        match &outcome {
            TrialOutcome::Completed { estimate, .. } => {
                debug!("trial {}: completed, estimate {:.3}", self.index, estimate)
            }
            TrialOutcome::Failed { reason } => debug!("trial {}: failed, {}", self.index, reason),
        }
        TrialRecord { index: self.index, assumptions: self.assumptions, diagnostics, outcome }
    }
}

/// QC → resample → correlate → long-term window → regression.
pub fn run_pipeline(
    prepared: &PreparedInputs<'_>,
    config: &AnalysisConfig,
    assumptions: &Assumptions,
) -> (TrialDiagnostics, TrialOutcome) {
    let mut diagnostics = TrialDiagnostics::default();
    let outcome = match pipeline(prepared, config, assumptions, &mut diagnostics) {
        Ok((estimate, fit)) => TrialOutcome::Completed { estimate, fit },
        Err(reason) => TrialOutcome::Failed { reason },
    };
    (diagnostics, outcome)
}

fn pipeline(
    prepared: &PreparedInputs<'_>,
    config: &AnalysisConfig,
    a: &Assumptions,
    diagnostics: &mut TrialDiagnostics,
) -> Result<(f64, FitResult), FitError> {
    let layout = prepared
        .layout(a.period)
        .ok_or(FitError::UnpreparedPeriod { period: a.period })?;

    let cleaned: Vec<MeasurementSeries> = prepared
        .inputs
        .output
        .iter()
        .map(|s| apply_qc(s, &config.qc.thresholds_for(&s.channel).with_draw(&a.qc)))
        .collect();
    for series in &cleaned {
        diagnostics.qc.merge(&QcSummary::from_series(series));
    }

    let periods = aggregate(&cleaned, &layout.grid, a.completeness_threshold);
    let joined = correlate(&periods, &layout.reference, a.completeness_threshold);
    let obs = observations(&joined);
    diagnostics.periods_total = joined.len();
    diagnostics.periods_valid = obs.len();
    if !joined.is_empty() {
        diagnostics.mean_completeness =
            joined.iter().map(|p| p.completeness).sum::<f64>() / joined.len() as f64;
    }

    let window = layout
        .window
        .shifted(a.long_term_start_shift, a.long_term_end_shift)
        .ok_or(FitError::InvalidWindow)?;
    let lt = long_term_distribution(&layout.reference, window, a.completeness_threshold)?;
    diagnostics.long_term_periods = lt.n_periods;
    diagnostics.long_term_covariate = Some(lt.central);

    let fit = estimate(&obs, a.family, config.regression.min_valid_periods, lt.central)?;
    let annual = fit.estimate * a.period.periods_per_year() * a.meter_factor;
    if !annual.is_finite() {
        return Err(FitError::NonFinite);
    }
    Ok((annual, fit))
}

// ─── Ensemble ───────────────────────────────────────────────────────────────

/// Validate, run the central pass and every trial, then aggregate.
///
/// Only input malformation is returned as an error; per-trial statistical
/// failures are carried inside the result.
pub fn run_ensemble(inputs: &PlantInputs, config: &AnalysisConfig) -> Result<EnsembleResult, InputError> {
    config.validate()?;
    let prepared = PreparedInputs::prepare(inputs, config)?;

    let mc = &config.monte_carlo;
    let axes = active_axes(config);
    info!(
        "running ensemble: {} trials, seed {}, {} output series, active axes [{}]",
        mc.ensemble_size,
        mc.seed,
        inputs.output.len(),
        axes.iter().map(|a| a.label()).collect::<Vec<_>>().join(", ")
    );

    let central_assumptions = Assumptions::central(config);
    let (diagnostics, outcome) = run_pipeline(&prepared, config, &central_assumptions);
    let central = CentralEstimate { assumptions: central_assumptions, diagnostics, outcome };

    let run_one = |index: usize| {
        let mut rng = trial_rng(mc.seed, index);
        SampledTrial::sample(index, config, &mut rng).run(&prepared, config)
    };

    #[cfg(not(target_arch = "wasm32"))]
    let trials: Vec<TrialRecord> = if mc.parallel {
        (0..mc.ensemble_size).into_par_iter().map(run_one).collect()
    } else {
        (0..mc.ensemble_size).map(run_one).collect()
    };
    #[cfg(target_arch = "wasm32")]
    let trials: Vec<TrialRecord> = (0..mc.ensemble_size).map(run_one).collect();

    let result = aggregate_ensemble(config, &axes, central, trials);
    info!(
        "ensemble finished: {} completed, {} failed, status {:?}",
        result.n_completed, result.n_failed, result.status
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YearShift;

    fn perturbed_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.qc.perturbation.max = Some(ParamDist::Uniform { low: 900.0, high: 1100.0 });
        config.qc.perturbation.stale_run_length = Some(ParamDist::Fixed { value: 6.0 });
        config.regression.candidates = vec![RegressionFamily::Ols, RegressionFamily::Huber];
        config.long_term.start_shift_years = YearShift { min: 0, max: 3 };
        config.monte_carlo.meter_uncertainty = 0.01;
        config
    }

    #[test]
    fn default_config_has_no_active_axes() {
        assert!(active_axes(&AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn active_axes_follow_configuration() {
        let axes = active_axes(&perturbed_config());
        assert_eq!(axes, vec![
            Axis::QcMax,
            Axis::RegressionFamily,
            Axis::LongTermStart,
            Axis::MeterCalibration,
        ]);
    }

    #[test]
    fn duplicate_candidates_do_not_activate_an_axis() {
        let mut config = AnalysisConfig::default();
        config.resampling.period_candidates = vec![PeriodLength::Monthly, PeriodLength::Monthly];
        assert!(!Axis::Period.is_active(&config));
    }

    #[test]
    fn central_assumptions_are_unperturbed() {
        let a = Assumptions::central(&perturbed_config());
        assert_eq!(a.qc, QcDraw::default());
        assert_eq!(a.family, RegressionFamily::Ols);
        assert_eq!(a.meter_factor, 1.0);
        assert_eq!((a.long_term_start_shift, a.long_term_end_shift), (0, 0));
    }

    #[test]
    fn sampling_is_reproducible_per_index() {
        let config = perturbed_config();
        let a = Assumptions::sample(&config, &mut trial_rng(42, 7));
        let b = Assumptions::sample(&config, &mut trial_rng(42, 7));
        let c = Assumptions::sample(&config, &mut trial_rng(42, 8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sampled_values_respect_their_distributions() {
        let config = perturbed_config();
        for i in 0..200 {
            let a = Assumptions::sample(&config, &mut trial_rng(1, i));
            let max = a.qc.max.expect("test: max drawn");
            assert!((900.0..1100.0).contains(&max));
            assert_eq!(a.qc.min, None);
            assert_eq!(a.qc.stale_run_length, Some(6));
            assert!((0..=3).contains(&a.long_term_start_shift));
            assert_eq!(a.long_term_end_shift, 0);
            assert!(a.meter_factor > 0.9 && a.meter_factor < 1.1);
        }
    }

    #[test]
    fn missing_layout_is_reported_as_unprepared() {
        use crate::types::{ChannelKind, Record, ReferenceSeries};
        use chrono::{Duration, TimeZone, Utc};

        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().expect("test: valid date");
        let daily = |channel: &str, days: i64| {
            let records = (0..days).map(|d| Record::new(t0 + Duration::days(d), 5.0 + (d % 7) as f64)).collect();
            MeasurementSeries::new(channel, "kWh", ChannelKind::Energy, 86_400, records)
        };
        let inputs = PlantInputs { output: vec![daily("wtg01", 60)], reference: ReferenceSeries(daily("era5", 365)) };
        let config = AnalysisConfig::default();
        let prepared = PreparedInputs::prepare(&inputs, &config).expect("test: prepare");

        let mut a = Assumptions::central(&config);
        a.period = PeriodLength::Daily;
        let (_, outcome) = run_pipeline(&prepared, &config, &a);
        assert_eq!(outcome.failure(), Some(&FitError::UnpreparedPeriod { period: PeriodLength::Daily }));
    }

    #[test]
    fn levels_label_discrete_axes() {
        let mut a = Assumptions::central(&AnalysisConfig::default());
        a.long_term_start_shift = 2;
        a.long_term_end_shift = -1;
        assert_eq!(a.level(Axis::LongTermStart), AxisLevel::Discrete("+2".into()));
        assert_eq!(a.level(Axis::LongTermEnd), AxisLevel::Discrete("-1".into()));
        assert_eq!(a.level(Axis::RegressionFamily), AxisLevel::Discrete("ols".into()));
        assert_eq!(a.level(Axis::QcStaleRun), AxisLevel::Discrete("off".into()));
        assert_eq!(a.level(Axis::MeterCalibration), AxisLevel::Continuous(1.0));
    }
}
