// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Regression / Estimator

//! Output-vs-covariate regression families.
//!
//! Families form a closed set selected by name. Each one implements the
//! flat [`Regressor`] capability and reports R² and residual standard
//! error so trials using different families can be compared.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resample::PeriodLength;

/// Covariate variance below this fraction of Σx² counts as constant.
const DEGENERATE_RELATIVE_VARIANCE: f64 = 1e-10;
/// Huber tuning constant (95% efficiency under normal errors).
const HUBER_K: f64 = 1.345;
/// MAD to standard deviation under normality.
const MAD_SCALE: f64 = 0.6745;
const IRLS_MAX_ITER: usize = 50;
const IRLS_TOL: f64 = 1e-10;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Per-trial statistical failure. Contained: the trial is marked failed
/// and the run continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitError {
    #[error("insufficient valid periods: {found} available, {required} required")]
    InsufficientPeriods { found: usize, required: usize },

    #[error("degenerate covariate: variance {variance:e} is effectively zero")]
    DegenerateCovariate { variance: f64 },

    #[error("regression produced a non-finite result")]
    NonFinite,

    #[error("no qualifying reference periods in the long-term window")]
    NoLongTermData,

    #[error("long-term window is empty or inverted")]
    InvalidWindow,

    #[error("no prepared layout for {} periods", .period.label())]
    UnpreparedPeriod { period: PeriodLength },
}

impl FitError {
    /// Stable label used to group failures in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientPeriods { .. } => "insufficient_periods",
            Self::DegenerateCovariate { .. } => "degenerate_covariate",
            Self::NonFinite => "non_finite",
            Self::NoLongTermData => "no_long_term_data",
            Self::InvalidWindow => "invalid_window",
            Self::UnpreparedPeriod { .. } => "unprepared_period",
        }
    }
}

// ─── Observations & Results ─────────────────────────────────────────────────

/// One valid period: reference covariate, normalized output and the
/// period's completeness as weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub covariate: f64,
    pub output: f64,
    pub weight: f64,
}

/// Fitted line plus diagnostics, before evaluation at the long-term point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub residual_se: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FitResult {
    pub family: RegressionFamily,
    pub slope: f64,
    pub intercept: f64,
    /// Predicted output per period at the long-term covariate.
    pub estimate: f64,
    pub r_squared: f64,
    pub residual_se: f64,
    pub n_obs: usize,
}

// ─── Families ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RegressionFamily {
    /// Ordinary least squares.
    Ols,
    /// Huber M-estimator via iteratively reweighted least squares.
    Huber,
    /// Median of pairwise slopes.
    TheilSen,
    /// Least squares weighted by period completeness.
    Weighted,
}

impl Default for RegressionFamily {
    fn default() -> Self { RegressionFamily::Ols }
}

impl RegressionFamily {
    pub const ALL: [RegressionFamily; 4] = [Self::Ols, Self::Huber, Self::TheilSen, Self::Weighted];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ols => "ols",
            Self::Huber => "huber",
            Self::TheilSen => "theil_sen",
            Self::Weighted => "weighted",
        }
    }

    pub fn regressor(&self) -> &'static dyn Regressor {
        match self {
            Self::Ols => &Ols,
            Self::Huber => &HUBER,
            Self::TheilSen => &TheilSen,
            Self::Weighted => &CompletenessWeighted,
        }
    }
}

impl fmt::Display for RegressionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RegressionFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown regression family `{s}`"))
    }
}

/// A regression strategy: fit a line through the observations.
pub trait Regressor: Sync {
    fn fit(&self, obs: &[Observation]) -> Result<LinearFit, FitError>;
}

pub struct Ols;
pub struct Huber {
    pub k: f64,
}
pub struct TheilSen;
pub struct CompletenessWeighted;

static HUBER: Huber = Huber { k: HUBER_K };

impl Regressor for Ols {
    fn fit(&self, obs: &[Observation]) -> Result<LinearFit, FitError> {
        let weights = vec![1.0; obs.len()];
        let (slope, intercept) = weighted_line(obs, &weights)?;
        diagnostics(obs, slope, intercept, &weights)
    }
}

impl Regressor for CompletenessWeighted {
    fn fit(&self, obs: &[Observation]) -> Result<LinearFit, FitError> {
        let weights: Vec<f64> = obs.iter().map(|o| o.weight.max(0.0)).collect();
        let (slope, intercept) = weighted_line(obs, &weights)?;
        diagnostics(obs, slope, intercept, &weights)
    }
}

impl Regressor for Huber {
    fn fit(&self, obs: &[Observation]) -> Result<LinearFit, FitError> {
        let ones = vec![1.0; obs.len()];
        let (mut slope, mut intercept) = weighted_line(obs, &ones)?;

        for _ in 0..IRLS_MAX_ITER {
            let residuals: Vec<f64> = obs
                .iter()
                .map(|o| o.output - (intercept + slope * o.covariate))
                .collect();
            let scale = mad(&residuals) / MAD_SCALE;
            if !(scale > f64::EPSILON) {
                break;
            }
            let cutoff = self.k * scale;
            let weights: Vec<f64> = residuals
                .iter()
                .map(|r| if r.abs() <= cutoff { 1.0 } else { cutoff / r.abs() })
                .collect();
            let (s, i) = weighted_line(obs, &weights)?;
            let converged = (s - slope).abs() <= IRLS_TOL * (1.0 + slope.abs())
                && (i - intercept).abs() <= IRLS_TOL * (1.0 + intercept.abs());
            slope = s;
            intercept = i;
            if converged {
                break;
            }
        }

        diagnostics(obs, slope, intercept, &ones)
    }
}

impl Regressor for TheilSen {
    fn fit(&self, obs: &[Observation]) -> Result<LinearFit, FitError> {
        let scale = obs.iter().map(|o| o.covariate.abs()).fold(0.0, f64::max);
        let min_dx = DEGENERATE_RELATIVE_VARIANCE.sqrt() * scale.max(f64::MIN_POSITIVE);

        let mut slopes = Vec::with_capacity(obs.len() * obs.len().saturating_sub(1) / 2);
        for (i, a) in obs.iter().enumerate() {
            for b in &obs[i + 1..] {
                let dx = b.covariate - a.covariate;
                if dx.abs() > min_dx {
                    slopes.push((b.output - a.output) / dx);
                }
            }
        }
        let slope = median(&mut slopes).ok_or(FitError::DegenerateCovariate { variance: 0.0 })?;
        let mut offsets: Vec<f64> = obs.iter().map(|o| o.output - slope * o.covariate).collect();
        let intercept = median(&mut offsets).ok_or(FitError::InsufficientPeriods { found: 0, required: 3 })?;

        diagnostics(obs, slope, intercept, &vec![1.0; obs.len()])
    }
}

// ─── Estimation ─────────────────────────────────────────────────────────────

/// Fit `family` and evaluate it at the long-term covariate.
pub fn estimate(
    obs: &[Observation],
    family: RegressionFamily,
    min_valid_periods: usize,
    lt_covariate: f64,
) -> Result<FitResult, FitError> {
    let required = min_valid_periods.max(3);
    if obs.len() < required {
        return Err(FitError::InsufficientPeriods { found: obs.len(), required });
    }
    check_covariate(obs)?;

    let fit = family.regressor().fit(obs)?;
    let estimate = fit.intercept + fit.slope * lt_covariate;
    if !estimate.is_finite() || !fit.r_squared.is_finite() || !fit.residual_se.is_finite() {
        return Err(FitError::NonFinite);
    }

    Ok(FitResult {
        family,
        slope: fit.slope,
        intercept: fit.intercept,
        estimate,
        r_squared: fit.r_squared,
        residual_se: fit.residual_se,
        n_obs: obs.len(),
    })
}

/// Reject constant covariates before any family divides by their spread.
fn check_covariate(obs: &[Observation]) -> Result<(), FitError> {
    let n = obs.len() as f64;
    let mean = obs.iter().map(|o| o.covariate).sum::<f64>() / n;
    let ss = obs.iter().map(|o| (o.covariate - mean).powi(2)).sum::<f64>();
    let magnitude = obs.iter().map(|o| o.covariate * o.covariate).sum::<f64>();
    // Overflowed spread is not a constant covariate
    if !ss.is_finite() || !magnitude.is_finite() {
        return Err(FitError::NonFinite);
    }
    if ss <= DEGENERATE_RELATIVE_VARIANCE * magnitude {
        return Err(FitError::DegenerateCovariate { variance: ss / n });
    }
    Ok(())
}

fn weighted_line(obs: &[Observation], weights: &[f64]) -> Result<(f64, f64), FitError> {
    if obs.len() < 3 {
        return Err(FitError::InsufficientPeriods { found: obs.len(), required: 3 });
    }
    let sw: f64 = weights.iter().sum();
    if !(sw > 0.0) {
        return Err(FitError::NonFinite);
    }
    let mx = obs.iter().zip(weights).map(|(o, w)| w * o.covariate).sum::<f64>() / sw;
    let my = obs.iter().zip(weights).map(|(o, w)| w * o.output).sum::<f64>() / sw;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut magnitude = 0.0;
    for (o, w) in obs.iter().zip(weights) {
        let dx = o.covariate - mx;
        sxx += w * dx * dx;
        sxy += w * dx * (o.output - my);
        magnitude += w * o.covariate * o.covariate;
    }
    if !sxx.is_finite() || !magnitude.is_finite() {
        return Err(FitError::NonFinite);
    }
    if sxx <= DEGENERATE_RELATIVE_VARIANCE * magnitude {
        return Err(FitError::DegenerateCovariate { variance: sxx / sw });
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    if slope.is_finite() && intercept.is_finite() {
        Ok((slope, intercept))
    } else {
        Err(FitError::NonFinite)
    }
}

/// Weighted R² and residual standard error with n - 2 degrees of freedom.
fn diagnostics(
    obs: &[Observation],
    slope: f64,
    intercept: f64,
    weights: &[f64],
) -> Result<LinearFit, FitError> {
    let n = obs.len();
    if n < 3 {
        return Err(FitError::InsufficientPeriods { found: n, required: 3 });
    }
    let sw: f64 = weights.iter().sum();
    if !(sw > 0.0) {
        return Err(FitError::NonFinite);
    }
    let my = obs.iter().zip(weights).map(|(o, w)| w * o.output).sum::<f64>() / sw;

    let mut sse = 0.0;
    let mut sst = 0.0;
    for (o, w) in obs.iter().zip(weights) {
        let r = o.output - (intercept + slope * o.covariate);
        sse += w * r * r;
        sst += w * (o.output - my).powi(2);
    }

    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { 1.0 };
    // Rescale weights to sum to n so unit weights give SSE / (n - 2)
    let residual_se = (sse * n as f64 / sw / (n as f64 - 2.0)).sqrt();

    Ok(LinearFit { slope, intercept, r_squared, residual_se })
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Median absolute deviation about the median.
fn mad(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    let Some(center) = median(&mut sorted) else { return 0.0 };
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&mut deviations).unwrap_or(0.0)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
