// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Run Configuration

//! Immutable run configuration.
//!
//! One [`AnalysisConfig`] value is passed into each run; nothing in the
//! engine reads ambient state, so concurrent runs with different
//! configurations cannot interfere. Every section deserializes with
//! per-field defaults so a partial JSON document is a valid config.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::distributions::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::error::InputError;
use crate::regression::RegressionFamily;
use crate::resample::PeriodLength;

// ─── Parameter Distributions ────────────────────────────────────────────────

/// Distribution a perturbable scalar assumption is drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum ParamDist {
    Fixed { value: f64 },
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl ParamDist {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Self::Fixed { value } => value,
            Self::Uniform { low, high } => {
                if high > low { rng.gen_range(low..high) } else { low }
            }
            Self::Normal { mean, std_dev } => {
                if std_dev > 0.0 {
                    Normal::new(mean, std_dev).map_or(mean, |normal| normal.sample(rng))
                } else {
                    mean
                }
            }
        }
    }

    /// True when every draw yields the same value.
    pub fn is_fixed(&self) -> bool {
        match *self {
            Self::Fixed { .. } => true,
            Self::Uniform { low, high } => high <= low,
            Self::Normal { std_dev, .. } => std_dev <= 0.0,
        }
    }

    fn validate(&self, name: &str) -> Result<(), InputError> {
        let ok = match *self {
            Self::Fixed { value } => value.is_finite(),
            Self::Uniform { low, high } => low.is_finite() && high.is_finite() && low <= high,
            Self::Normal { mean, std_dev } => mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(InputError::InvalidConfig(format!("{}: malformed distribution {:?}", name, self)))
        }
    }
}

/// Inclusive integer range of whole-year shifts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct YearShift {
    pub min: i32,
    pub max: i32,
}

impl YearShift {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        if self.max > self.min { rng.gen_range(self.min..=self.max) } else { self.min }
    }

    pub fn is_fixed(&self) -> bool {
        self.max <= self.min
    }
}

// ─── QC ─────────────────────────────────────────────────────────────────────

/// Thresholds for one channel. `None` bounds are open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QcThresholds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Longest tolerated run of identical values; `None` disables the rule.
    pub stale_run_length: Option<usize>,
    pub stale_tolerance: f64,
}

impl Default for QcThresholds {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            stale_run_length: None,
            stale_tolerance: 0.0,
        }
    }
}

/// Per-trial draws for QC thresholds, applied to every output channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QcPerturbation {
    pub min: Option<ParamDist>,
    pub max: Option<ParamDist>,
    pub stale_run_length: Option<ParamDist>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QcConfig {
    pub defaults: QcThresholds,
    pub channels: BTreeMap<String, QcThresholds>,
    pub perturbation: QcPerturbation,
}

impl QcConfig {
    pub fn thresholds_for(&self, channel: &str) -> QcThresholds {
        self.channels.get(channel).copied().unwrap_or(self.defaults)
    }
}

// ─── Resampling ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResamplingConfig {
    pub period: PeriodLength,
    /// Period lengths a trial may draw from; empty means `period` only.
    pub period_candidates: Vec<PeriodLength>,
    /// Minimum completeness for a period to enter the regression.
    pub completeness_threshold: f64,
    pub completeness_perturbation: Option<ParamDist>,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            period: PeriodLength::Monthly,
            period_candidates: Vec::new(),
            completeness_threshold: 0.8,
            completeness_perturbation: None,
        }
    }
}

impl ResamplingConfig {
    pub fn candidates(&self) -> Vec<PeriodLength> {
        if self.period_candidates.is_empty() {
            vec![self.period]
        } else {
            self.period_candidates.clone()
        }
    }
}

// ─── Regression ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegressionConfig {
    pub family: RegressionFamily,
    /// Families a trial may draw from; empty means `family` only.
    pub candidates: Vec<RegressionFamily>,
    pub min_valid_periods: usize,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            family: RegressionFamily::Ols,
            candidates: Vec::new(),
            min_valid_periods: 10,
        }
    }
}

impl RegressionConfig {
    pub fn candidates(&self) -> Vec<RegressionFamily> {
        if self.candidates.is_empty() {
            vec![self.family]
        } else {
            self.candidates.clone()
        }
    }
}

// ─── Long-Term Window ───────────────────────────────────────────────────────

/// Long-term reference window. Unset bounds default to the full
/// reference history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LongTermConfig {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub start_shift_years: YearShift,
    pub end_shift_years: YearShift,
}

// ─── Monte Carlo ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub ensemble_size: usize,
    pub seed: u64,
    /// Failure fraction above which the ensemble is reported as degraded.
    pub max_failure_rate: f64,
    /// Std-dev of the multiplicative meter calibration factor (0 = off).
    pub meter_uncertainty: f64,
    pub parallel: bool,
    /// Equal-count bins used to group continuous axes for sensitivity.
    pub sensitivity_bins: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            ensemble_size: 1000,
            seed: 0,
            max_failure_rate: 0.2,
            meter_uncertainty: 0.0,
            parallel: true,
            sensitivity_bins: 4,
        }
    }
}

// ─── Units ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UnitExpectations {
    pub output: Option<String>,
    pub reference: Option<String>,
}

// ─── AnalysisConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub qc: QcConfig,
    pub resampling: ResamplingConfig,
    pub regression: RegressionConfig,
    pub long_term: LongTermConfig,
    pub monte_carlo: MonteCarloConfig,
    /// Percentile bounds to report, each in [0, 100].
    pub percentiles: Vec<f64>,
    pub units: UnitExpectations,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            qc: QcConfig::default(),
            resampling: ResamplingConfig::default(),
            regression: RegressionConfig::default(),
            long_term: LongTermConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            percentiles: vec![5.0, 50.0, 95.0],
            units: UnitExpectations::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, InputError> {
        let config: AnalysisConfig = serde_json::from_str(json)
            .map_err(|e| InputError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let invalid = |msg: String| -> Result<(), InputError> { Err(InputError::InvalidConfig(msg)) };

        let mc = &self.monte_carlo;
        if mc.ensemble_size == 0 {
            return invalid("monte_carlo.ensemble_size must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&mc.max_failure_rate) {
            return invalid(format!("monte_carlo.max_failure_rate {} outside [0, 1]", mc.max_failure_rate));
        }
        if !mc.meter_uncertainty.is_finite() || mc.meter_uncertainty < 0.0 {
            return invalid(format!("monte_carlo.meter_uncertainty {} must be >= 0", mc.meter_uncertainty));
        }
        if mc.sensitivity_bins == 0 {
            return invalid("monte_carlo.sensitivity_bins must be at least 1".into());
        }

        // Residual standard error needs n - 2 degrees of freedom
        if self.regression.min_valid_periods < 3 {
            return invalid("regression.min_valid_periods must be at least 3".into());
        }

        let threshold = self.resampling.completeness_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return invalid(format!("resampling.completeness_threshold {threshold} outside [0, 1]"));
        }
        if let Some(dist) = &self.resampling.completeness_perturbation {
            dist.validate("resampling.completeness_perturbation")?;
        }
        // The central pass runs on `period` and `family`; both must be drawable too
        if !self.resampling.candidates().contains(&self.resampling.period) {
            return invalid(format!(
                "resampling.period {} is not among resampling.period_candidates",
                self.resampling.period.label()
            ));
        }
        if !self.regression.candidates().contains(&self.regression.family) {
            return invalid(format!(
                "regression.family {} is not among regression.candidates",
                self.regression.family.label()
            ));
        }

        if self.percentiles.is_empty() {
            return invalid("percentiles must not be empty".into());
        }
        for &p in &self.percentiles {
            if !(0.0..=100.0).contains(&p) {
                return invalid(format!("percentile {p} outside [0, 100]"));
            }
        }

        validate_thresholds("qc.defaults", &self.qc.defaults)?;
        for (channel, thresholds) in &self.qc.channels {
            validate_thresholds(&format!("qc.channels.{channel}"), thresholds)?;
        }
        let p = &self.qc.perturbation;
        for (name, dist) in [("qc.perturbation.min", &p.min), ("qc.perturbation.max", &p.max),
                             ("qc.perturbation.stale_run_length", &p.stale_run_length)] {
            if let Some(dist) = dist {
                dist.validate(name)?;
            }
        }

        let lt = &self.long_term;
        if let (Some(start), Some(end)) = (lt.start, lt.end) {
            if start >= end {
                return invalid(format!("long_term.start {start} is not before long_term.end {end}"));
            }
        }
        for (name, shift) in [("long_term.start_shift_years", lt.start_shift_years),
                              ("long_term.end_shift_years", lt.end_shift_years)] {
            if shift.min > shift.max {
                return invalid(format!("{name}: min {} exceeds max {}", shift.min, shift.max));
            }
        }

        Ok(())
    }
}

fn validate_thresholds(name: &str, t: &QcThresholds) -> Result<(), InputError> {
    for bound in [t.min, t.max].into_iter().flatten() {
        if bound.is_nan() {
            return Err(InputError::InvalidConfig(format!("{name}: NaN bound")));
        }
    }
    if let (Some(min), Some(max)) = (t.min, t.max) {
        if min > max {
            return Err(InputError::InvalidConfig(format!("{name}: min {min} exceeds max {max}")));
        }
    }
    if !t.stale_tolerance.is_finite() || t.stale_tolerance < 0.0 {
        return Err(InputError::InvalidConfig(format!("{name}: stale_tolerance must be >= 0")));
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
