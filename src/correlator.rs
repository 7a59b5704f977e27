// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Long-Term Reference Correlator

//! Pairs the short operational record with a long-term reference series
//! and derives the reference climatology over a (perturbable) window.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{LongTermConfig, QcThresholds};
use crate::error::InputError;
use crate::qc::apply_qc;
use crate::regression::{FitError, Observation};
use crate::resample::{aggregate, span_grid, Period, PeriodAggregate, PeriodLength};
use crate::types::ReferenceSeries;

// ─── Reference Aggregates ───────────────────────────────────────────────────

/// The reference series reduced onto calendar periods of one length.
/// Built once per run and shared read-only by every trial.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAggregates {
    pub length: PeriodLength,
    pub periods: Vec<PeriodAggregate>,
}

impl ReferenceAggregates {
    pub fn build(reference: &ReferenceSeries, length: PeriodLength) -> Result<Self, InputError> {
        // Reference QC is limited to grid gaps and non-finite values
        let cleaned = apply_qc(reference.series(), &QcThresholds::default());
        let series = std::slice::from_ref(&cleaned);
        let grid = span_grid(series, length)?;
        Ok(Self { length, periods: aggregate(series, &grid, 0.0) })
    }

    /// Reference aggregate for the period starting at `start`.
    pub fn lookup(&self, start: DateTime<Utc>) -> Option<&PeriodAggregate> {
        self.periods
            .binary_search_by(|p| p.period.start.cmp(&start))
            .ok()
            .map(|idx| &self.periods[idx])
    }

    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.periods.first()?.period.start, self.periods.last()?.period.end))
    }
}

// ─── AggregatedPeriod ───────────────────────────────────────────────────────

/// Operational period joined with its reference covariate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AggregatedPeriod {
    pub period: Period,
    /// Completeness-normalized output used for regression.
    pub output: Option<f64>,
    pub raw_output: Option<f64>,
    pub covariate: Option<f64>,
    pub completeness: f64,
    pub reference_completeness: f64,
    pub valid: bool,
}

/// Attach the reference aggregate of the same calendar period to each
/// operational period. Both sides must meet `threshold` for validity.
pub fn correlate(
    periods: &[PeriodAggregate],
    reference: &ReferenceAggregates,
    threshold: f64,
) -> Vec<AggregatedPeriod> {
    periods
        .iter()
        .map(|p| {
            let r = reference.lookup(p.period.start);
            let covariate = r.and_then(|r| r.value);
            let reference_completeness = r.map_or(0.0, |r| r.completeness);
            let valid = p.valid
                && covariate.is_some()
                && reference_completeness > 0.0
                && reference_completeness >= threshold;
            AggregatedPeriod {
                period: p.period,
                output: p.normalized_value,
                raw_output: p.value,
                covariate,
                completeness: p.completeness,
                reference_completeness,
                valid,
            }
        })
        .collect()
}

/// Regression observations from valid periods only.
pub fn observations(periods: &[AggregatedPeriod]) -> Vec<Observation> {
    periods
        .iter()
        .filter(|p| p.valid)
        .filter_map(|p| match (p.covariate, p.output) {
            (Some(x), Some(y)) => Some(Observation { covariate: x, output: y, weight: p.completeness }),
            _ => None,
        })
        .collect()
}

// ─── Long-Term Window ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LongTermWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LongTermWindow {
    /// Configured bounds, falling back to the full reference history.
    pub fn resolve(config: &LongTermConfig, reference: &ReferenceAggregates) -> Option<Self> {
        let (first, last) = reference.span()?;
        Some(Self {
            start: config.start.unwrap_or(first),
            end: config.end.unwrap_or(last),
        })
    }

    /// Move each bound by whole years. `None` if the calendar overflows.
    pub fn shifted(&self, start_years: i32, end_years: i32) -> Option<Self> {
        Some(Self {
            start: shift_years(self.start, start_years)?,
            end: shift_years(self.end, end_years)?,
        })
    }
}

fn shift_years(ts: DateTime<Utc>, years: i32) -> Option<DateTime<Utc>> {
    let months = Months::new(years.unsigned_abs() * 12);
    if years >= 0 { ts.checked_add_months(months) } else { ts.checked_sub_months(months) }
}

// ─── Long-Term Distribution ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MonthlyMean {
    pub month: u32,
    pub mean: f64,
    pub samples: usize,
}

/// Climatology of the reference covariate over the long-term window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongTermDistribution {
    pub window: LongTermWindow,
    pub n_periods: usize,
    pub monthly_means: Vec<MonthlyMean>,
    /// Mean of the calendar-month means, so partial years do not bias it.
    pub central: f64,
}

pub fn long_term_distribution(
    reference: &ReferenceAggregates,
    window: LongTermWindow,
    threshold: f64,
) -> Result<LongTermDistribution, FitError> {
    if window.start >= window.end {
        return Err(FitError::InvalidWindow);
    }

    let mut sums = [0.0_f64; 12];
    let mut counts = [0usize; 12];
    let mut n_periods = 0;
    for p in &reference.periods {
        if p.period.start < window.start || p.period.end > window.end {
            continue;
        }
        if p.completeness < threshold || p.completeness <= 0.0 {
            continue;
        }
        if let Some(v) = p.value {
            let m = (p.period.month as usize).saturating_sub(1).min(11);
            sums[m] += v;
            counts[m] += 1;
            n_periods += 1;
        }
    }
    if n_periods == 0 {
        return Err(FitError::NoLongTermData);
    }

    let monthly_means: Vec<MonthlyMean> = (0..12)
        .filter(|&m| counts[m] > 0)
        .map(|m| MonthlyMean { month: m as u32 + 1, mean: sums[m] / counts[m] as f64, samples: counts[m] })
        .collect();
    let central = monthly_means.iter().map(|m| m.mean).sum::<f64>() / monthly_means.len() as f64;

    Ok(LongTermDistribution { window, n_periods, monthly_means, central })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
