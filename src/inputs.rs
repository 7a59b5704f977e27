// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Input Validation & Preparation

//! Validates [`PlantInputs`] once per run and precomputes everything the
//! trials share read-only: the period grid of the operational record and
//! the reference aggregates for every candidate period length.

use log::debug;

use crate::config::AnalysisConfig;
use crate::correlator::{LongTermWindow, ReferenceAggregates};
use crate::error::InputError;
use crate::resample::{span_grid, Period, PeriodLength};
use crate::types::{MeasurementSeries, PlantInputs};

// ─── Validation ─────────────────────────────────────────────────────────────

/// Structural checks on a single series.
pub fn validate_series(series: &MeasurementSeries) -> Result<(), InputError> {
    if series.is_empty() {
        return Err(InputError::EmptySeries { channel: series.channel.clone() });
    }
    if series.sampling_interval_secs <= 0 {
        return Err(InputError::InvalidSamplingInterval {
            channel: series.channel.clone(),
            interval_secs: series.sampling_interval_secs,
        });
    }
    if let Some(idx) = series.records.windows(2).position(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(InputError::NonMonotonicTimestamps {
            channel: series.channel.clone(),
            index: idx + 1,
        });
    }
    Ok(())
}

fn check_unit(series: &MeasurementSeries, expected: &str) -> Result<(), InputError> {
    if series.unit != expected {
        return Err(InputError::UnitMismatch {
            channel: series.channel.clone(),
            expected: expected.to_string(),
            found: series.unit.clone(),
        });
    }
    Ok(())
}

/// Whole-input checks: every series well formed, output series sharing one
/// kind and unit, units matching any configured expectation.
pub fn validate_inputs(inputs: &PlantInputs, config: &AnalysisConfig) -> Result<(), InputError> {
    let first = inputs.output.first().ok_or(InputError::NoOutputSeries)?;

    for series in &inputs.output {
        validate_series(series)?;
        if series.kind != first.kind {
            return Err(InputError::MixedChannelKinds {
                first: first.channel.clone(),
                other: series.channel.clone(),
            });
        }
        let expected = config.units.output.as_deref().unwrap_or(&first.unit);
        check_unit(series, expected)?;
    }

    let reference = inputs.reference.series();
    validate_series(reference)?;
    if let Some(expected) = config.units.reference.as_deref() {
        check_unit(reference, expected)?;
    }
    Ok(())
}

// ─── Prepared Inputs ────────────────────────────────────────────────────────

/// Everything precomputed for one candidate period length.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodLayout {
    pub length: PeriodLength,
    /// Grid spanning the operational record.
    pub grid: Vec<Period>,
    pub reference: ReferenceAggregates,
    /// Configured long-term window before any per-trial shift.
    pub window: LongTermWindow,
}

/// Validated inputs plus the shared per-length layouts. Read-only once
/// built; every trial borrows it.
#[derive(Debug, Clone)]
pub struct PreparedInputs<'a> {
    pub inputs: &'a PlantInputs,
    pub layouts: Vec<PeriodLayout>,
}

impl<'a> PreparedInputs<'a> {
    pub fn prepare(inputs: &'a PlantInputs, config: &AnalysisConfig) -> Result<Self, InputError> {
        validate_inputs(inputs, config)?;

        let mut lengths = config.resampling.candidates();
        lengths.push(config.resampling.period);
        lengths.sort();
        lengths.dedup();

        let mut layouts = Vec::with_capacity(lengths.len());
        for length in lengths {
            let grid = span_grid(&inputs.output, length)?;
            let reference = ReferenceAggregates::build(&inputs.reference, length)?;
            let window = LongTermWindow::resolve(&config.long_term, &reference).ok_or_else(|| {
                InputError::EmptySeries { channel: inputs.reference.series().channel.clone() }
            })?;
            debug!(
                "prepared {} layout: {} operational periods, {} reference periods",
                length.label(),
                grid.len(),
                reference.periods.len()
            );
            layouts.push(PeriodLayout { length, grid, reference, window });
        }

        Ok(Self { inputs, layouts })
    }

    pub fn layout(&self, length: PeriodLength) -> Option<&PeriodLayout> {
        self.layouts.iter().find(|l| l.length == length)
    }
}
