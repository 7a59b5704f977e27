// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - QC Filter Engine

//! Record-level quality control.
//!
//! Each rule runs independently over the raw values and the resulting flags
//! are combined by precedence; any flag other than `Valid` excludes the
//! record downstream. The input series is never modified.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::QcThresholds;
use crate::types::{MeasurementSeries, QualityFlag, Record};

/// Gaps wider than this many native intervals hold missing records.
const GAP_TOLERANCE: f64 = 1.5;

// ─── Trial Draw ─────────────────────────────────────────────────────────────

/// QC thresholds drawn for one trial. `None` keeps the channel's value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QcDraw {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub stale_run_length: Option<usize>,
}

impl QcThresholds {
    pub fn with_draw(self, draw: &QcDraw) -> QcThresholds {
        QcThresholds {
            min: draw.min.or(self.min),
            max: draw.max.or(self.max),
            stale_run_length: draw.stale_run_length.or(self.stale_run_length),
            stale_tolerance: self.stale_tolerance,
        }
    }
}

// ─── QC ─────────────────────────────────────────────────────────────────────

/// Return a copy of `series` with grid gaps filled as `Missing` and every
/// record flagged against `thresholds`.
pub fn apply_qc(series: &MeasurementSeries, thresholds: &QcThresholds) -> MeasurementSeries {
    let mut records = fill_gaps(series);

    for record in records.iter_mut() {
        record.flag = record.flag.combine(range_flag(record.value, thresholds));
    }

    if let Some(max_run) = thresholds.stale_run_length {
        for (start, end) in stale_runs(&records, max_run, thresholds.stale_tolerance) {
            for record in &mut records[start..end] {
                record.flag = record.flag.combine(QualityFlag::Stale);
            }
        }
    }

    MeasurementSeries {
        channel: series.channel.clone(),
        unit: series.unit.clone(),
        kind: series.kind,
        sampling_interval_secs: series.sampling_interval_secs,
        records,
    }
}

fn range_flag(value: f64, t: &QcThresholds) -> QualityFlag {
    if !value.is_finite() {
        return QualityFlag::Missing;
    }
    let below = t.min.map_or(false, |min| value < min);
    let above = t.max.map_or(false, |max| value > max);
    if below || above { QualityFlag::OutOfRange } else { QualityFlag::Valid }
}

/// Copy the records, inserting `Missing` entries where the regular grid
/// has holes.
fn fill_gaps(series: &MeasurementSeries) -> Vec<Record> {
    let interval = series.sampling_interval_secs.max(1);
    let mut out = Vec::with_capacity(series.records.len());
    for (i, record) in series.records.iter().enumerate() {
        if i > 0 {
            let prev = series.records[i - 1].timestamp;
            let gap = (record.timestamp - prev).num_seconds();
            if gap as f64 > GAP_TOLERANCE * interval as f64 {
                let slots = (gap as f64 / interval as f64).round() as i64 - 1;
                for k in 1..=slots {
                    let t = prev + Duration::seconds(k * interval);
                    if t >= record.timestamp {
                        break;
                    }
                    out.push(Record::missing(t));
                }
            }
        }
        out.push(*record);
    }
    out
}

/// Half-open index ranges of repeated-value runs longer than `max_run`.
/// Every member stays within `tolerance` of the run's first value, so a
/// slow drift never chains into one run. Missing records break a run.
fn stale_runs(records: &[Record], max_run: usize, tolerance: f64) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=records.len() {
        let continues = i < records.len()
            && records[i].value.is_finite()
            && records[start].value.is_finite()
            && records[i].flag != QualityFlag::Missing
            && records[start].flag != QualityFlag::Missing
            && (records[i].value - records[start].value).abs() <= tolerance;
        if !continues {
            if i - start > max_run {
                runs.push((start, i));
            }
            start = i;
        }
    }
    runs
}

// ─── Summary ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QcSummary {
    pub total: usize,
    pub valid: usize,
    pub missing: usize,
    pub out_of_range: usize,
    pub stale: usize,
    pub manual: usize,
}

impl QcSummary {
    pub fn from_series(series: &MeasurementSeries) -> Self {
        let mut summary = QcSummary { total: series.records.len(), ..Default::default() };
        for record in &series.records {
            match record.flag {
                QualityFlag::Valid => summary.valid += 1,
                QualityFlag::Missing => summary.missing += 1,
                QualityFlag::OutOfRange => summary.out_of_range += 1,
                QualityFlag::Stale => summary.stale += 1,
                QualityFlag::Manual => summary.manual += 1,
            }
        }
        summary
    }

    pub fn merge(&mut self, other: &QcSummary) {
        self.total += other.total;
        self.valid += other.valid;
        self.missing += other.missing;
        self.out_of_range += other.out_of_range;
        self.stale += other.stale;
        self.manual += other.manual;
    }

    pub fn valid_fraction(&self) -> f64 {
        if self.total == 0 { return 0.0; }
        self.valid as f64 / self.total as f64
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
