// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Resampling & Aggregation

//! Aligns irregular QC'd series onto calendar reporting periods.
//!
//! Every period between the first and last record is emitted, including
//! periods without a single valid record (completeness 0, invalid), so the
//! caller can always report data coverage.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::types::{ChannelKind, MeasurementSeries};

// ─── Period Length ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PeriodLength {
    Daily,
    Monthly,
}

impl Default for PeriodLength {
    fn default() -> Self { PeriodLength::Monthly }
}

impl PeriodLength {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    pub fn periods_per_year(&self) -> f64 {
        match self {
            Self::Daily => 365.25,
            Self::Monthly => 12.0,
        }
    }

    /// Start of the UTC calendar period containing `ts`.
    pub fn floor(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = ts.date_naive();
        let start = match self {
            Self::Daily => date,
            Self::Monthly => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
        };
        Some(start.and_hms_opt(0, 0, 0)?.and_utc())
    }

    /// Start of the period following the one starting at `start`.
    pub fn next(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => start.checked_add_days(Days::new(1)),
            Self::Monthly => start.checked_add_months(Months::new(1)),
        }
    }
}

// ─── Period ─────────────────────────────────────────────────────────────────

/// Half-open reporting interval `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Calendar month (1-12) of `start`.
    pub month: u32,
}

impl Period {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Contiguous periods covering `[first, last]`. `None` if the span falls
/// outside the representable calendar.
pub fn period_grid(
    length: PeriodLength,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
) -> Option<Vec<Period>> {
    let mut grid = Vec::new();
    let mut start = length.floor(first)?;
    while start <= last {
        let end = length.next(start)?;
        grid.push(Period { start, end, month: start.month() });
        start = end;
    }
    Some(grid)
}

/// Index of the period containing `ts`, if any.
pub fn locate(grid: &[Period], ts: DateTime<Utc>) -> Option<usize> {
    let idx = grid.partition_point(|p| p.end <= ts);
    match grid.get(idx) {
        Some(p) if p.start <= ts => Some(idx),
        _ => None,
    }
}

// ─── PeriodAggregate ────────────────────────────────────────────────────────

/// One reporting period's reduced output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PeriodAggregate {
    pub period: Period,
    /// Sum (energy) or mean (rate) over valid records; `None` without any.
    pub value: Option<f64>,
    /// Energy grossed up by completeness; equal to `value` for rates.
    pub normalized_value: Option<f64>,
    pub completeness: f64,
    pub valid_records: usize,
    pub expected_records: usize,
    pub valid: bool,
}

#[derive(Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

/// Aggregate one or more QC'd series of the same kind onto `grid`.
///
/// Energy channels sum across series; rate channels average the per-series
/// means. Completeness pools valid and expected counts across series.
pub fn aggregate(
    series: &[MeasurementSeries],
    grid: &[Period],
    completeness_threshold: f64,
) -> Vec<PeriodAggregate> {
    let kind = series.first().map(|s| s.kind).unwrap_or_default();

    let mut combined = vec![Accumulator::default(); grid.len()];
    let mut means = vec![Accumulator::default(); grid.len()];
    let mut valid_records = vec![0usize; grid.len()];
    let mut expected_records = vec![0usize; grid.len()];

    for s in series {
        let mut per_period = vec![Accumulator::default(); grid.len()];
        for record in s.records.iter().filter(|r| r.flag.is_valid()) {
            if let Some(idx) = locate(grid, record.timestamp) {
                per_period[idx].sum += record.value;
                per_period[idx].count += 1;
            }
        }
        let interval = s.sampling_interval_secs.max(1);
        for (idx, period) in grid.iter().enumerate() {
            let acc = per_period[idx];
            expected_records[idx] += (period.duration_secs() / interval).max(1) as usize;
            valid_records[idx] += acc.count;
            if acc.count > 0 {
                combined[idx].sum += acc.sum;
                combined[idx].count += 1;
                means[idx].sum += acc.sum / acc.count as f64;
                means[idx].count += 1;
            }
        }
    }

    grid.iter()
        .enumerate()
        .map(|(idx, &period)| {
            let completeness =
                (valid_records[idx] as f64 / expected_records[idx].max(1) as f64).clamp(0.0, 1.0);
            let (value, normalized_value) = match kind {
                ChannelKind::Energy if combined[idx].count > 0 => {
                    let sum = combined[idx].sum;
                    (Some(sum), Some(sum / completeness))
                }
                ChannelKind::Rate if means[idx].count > 0 => {
                    let mean = means[idx].sum / means[idx].count as f64;
                    (Some(mean), Some(mean))
                }
                _ => (None, None),
            };
            let valid = value.is_some()
                && completeness > 0.0
                && completeness >= completeness_threshold;
            PeriodAggregate {
                period,
                value,
                normalized_value,
                completeness,
                valid_records: valid_records[idx],
                expected_records: expected_records[idx],
                valid,
            }
        })
        .collect()
}

/// Build the grid spanning `series` and aggregate onto it.
pub fn resample(
    series: &[MeasurementSeries],
    length: PeriodLength,
    completeness_threshold: f64,
) -> Result<Vec<PeriodAggregate>, InputError> {
    let grid = span_grid(series, length)?;
    Ok(aggregate(series, &grid, completeness_threshold))
}

/// Grid from the earliest first record to the latest last record.
pub fn span_grid(series: &[MeasurementSeries], length: PeriodLength) -> Result<Vec<Period>, InputError> {
    let first = series.iter().filter_map(|s| s.first_timestamp()).min();
    let last = series.iter().filter_map(|s| s.last_timestamp()).max();
    let channel = series.first().map(|s| s.channel.clone()).unwrap_or_default();
    match (first, last) {
        (Some(first), Some(last)) => period_grid(length, first, last)
            .ok_or(InputError::UnrepresentableSpan { channel }),
        _ => Err(InputError::EmptySeries { channel }),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualityFlag, Record};
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().expect("test: valid date")
    }

    /// Daily series with value `f(day_index)` over `[from, to)`.
    fn daily(channel: &str, kind: ChannelKind, from: DateTime<Utc>, to: DateTime<Utc>,
             f: impl Fn(usize) -> f64) -> MeasurementSeries {
        let mut records = Vec::new();
        let mut t = from;
        let mut i = 0;
        while t < to {
            records.push(Record::new(t, f(i)));
            t = t + chrono::Duration::days(1);
            i += 1;
        }
        MeasurementSeries::new(channel, "kWh", kind, 86_400, records)
    }

    #[test]
    fn monthly_floor_and_next() {
        let start = PeriodLength::Monthly.floor(ts(2021, 2, 17)).expect("test: floor");
        assert_eq!(start, ts(2021, 2, 1));
        assert_eq!(PeriodLength::Monthly.next(start), Some(ts(2021, 3, 1)));
        assert_eq!(PeriodLength::Daily.next(ts(2020, 12, 31)), Some(ts(2021, 1, 1)));
    }

    #[test]
    fn grid_is_contiguous_and_covers_span() {
        let grid = period_grid(PeriodLength::Monthly, ts(2020, 1, 15), ts(2021, 12, 31))
            .expect("test: grid");
        assert_eq!(grid.len(), 24);
        for pair in grid.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(grid[0].month, 1);
        assert_eq!(grid[23].month, 12);
        assert_eq!(locate(&grid, ts(2020, 3, 31)), Some(2));
        assert_eq!(locate(&grid, ts(2019, 12, 31)), None);
    }

    #[test]
    fn full_month_energy_sums_with_full_completeness() {
        let s = daily("wtg01", ChannelKind::Energy, ts(2020, 1, 1), ts(2020, 2, 1), |_| 10.0);
        let periods = resample(&[s], PeriodLength::Monthly, 0.8).expect("test: resample");
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].value, Some(310.0));
        assert_eq!(periods[0].completeness, 1.0);
        assert_eq!(periods[0].expected_records, 31);
        assert!(periods[0].valid);
    }

    #[test]
    fn rate_channel_averages() {
        let s = daily("ws", ChannelKind::Rate, ts(2020, 4, 1), ts(2020, 5, 1), |i| i as f64);
        let periods = resample(&[s], PeriodLength::Monthly, 0.5).expect("test: resample");
        assert_eq!(periods[0].value, Some(14.5));
        assert_eq!(periods[0].normalized_value, Some(14.5));
    }

    #[test]
    fn empty_month_is_kept_with_zero_completeness() {
        let mut s = daily("wtg01", ChannelKind::Energy, ts(2020, 1, 1), ts(2020, 4, 1), |_| 5.0);
        s.records.retain(|r| r.timestamp.month() != 2);
        let periods = resample(&[s], PeriodLength::Monthly, 0.8).expect("test: resample");
        assert_eq!(periods.len(), 3);
        let feb = &periods[1];
        assert_eq!(feb.period.month, 2);
        assert_eq!(feb.completeness, 0.0);
        assert_eq!(feb.value, None);
        assert!(!feb.valid);
        assert!(periods[0].valid && periods[2].valid);
    }

    #[test]
    fn flagged_records_reduce_completeness_and_gross_up() {
        let mut s = daily("wtg01", ChannelKind::Energy, ts(2020, 6, 1), ts(2020, 7, 1), |_| 2.0);
        for r in s.records.iter_mut().take(6) {
            r.flag = QualityFlag::OutOfRange;
        }
        let periods = resample(&[s], PeriodLength::Monthly, 0.9).expect("test: resample");
        let june = &periods[0];
        assert_eq!(june.valid_records, 24);
        assert!((june.completeness - 0.8).abs() < 1e-12);
        assert_eq!(june.value, Some(48.0));
        assert!((june.normalized_value.expect("test: value") - 60.0).abs() < 1e-9);
        assert!(!june.valid, "0.8 completeness is below the 0.9 threshold");
    }

    #[test]
    fn fleet_energy_sums_across_assets() {
        let a = daily("wtg01", ChannelKind::Energy, ts(2020, 1, 1), ts(2020, 2, 1), |_| 1.0);
        let b = daily("wtg02", ChannelKind::Energy, ts(2020, 1, 1), ts(2020, 2, 1), |_| 3.0);
        let periods = resample(&[a, b], PeriodLength::Monthly, 0.8).expect("test: resample");
        assert_eq!(periods[0].value, Some(124.0));
        assert_eq!(periods[0].expected_records, 62);
        assert_eq!(periods[0].completeness, 1.0);
    }

    #[test]
    fn coarse_sampling_never_exceeds_full_completeness() {
        // Weekly samples onto daily periods: expected count floors at one
        let records = (0..10)
            .map(|w| Record::new(ts(2020, 1, 1) + chrono::Duration::days(7 * w), 1.0))
            .collect();
        let s = MeasurementSeries::new("m", "kWh", ChannelKind::Energy, 7 * 86_400, records);
        let periods = resample(&[s], PeriodLength::Daily, 0.5).expect("test: resample");
        assert!(periods.iter().all(|p| (0.0..=1.0).contains(&p.completeness)));
        assert_eq!(periods.iter().filter(|p| p.completeness == 1.0).count(), 10);
    }

    #[test]
    fn empty_input_is_an_error() {
        let s = MeasurementSeries::new("m", "kWh", ChannelKind::Energy, 600, Vec::new());
        assert!(matches!(
            resample(&[s], PeriodLength::Monthly, 0.8),
            Err(InputError::EmptySeries { .. })
        ));
    }
}
