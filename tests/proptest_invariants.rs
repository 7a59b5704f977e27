use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

use oa_engine::aggregate::{percentile, EstimateSummary};
use oa_engine::config::QcThresholds;
use oa_engine::qc::{apply_qc, QcSummary};
use oa_engine::resample::{aggregate, span_grid, PeriodLength};
use oa_engine::{ChannelKind, MeasurementSeries, Record};

const PROPTEST_CASES: u32 = 256;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().expect("test: valid date")
}

/// Hourly series from (gap-in-hours, value) steps; gaps leave grid holes.
fn hourly(steps: &[(u8, f64)]) -> MeasurementSeries {
    let mut offset = 0i64;
    let records = steps
        .iter()
        .map(|&(gap, value)| {
            offset += gap as i64;
            Record::new(t0() + Duration::hours(offset), value)
        })
        .collect();
    MeasurementSeries::new("wtg01", "kWh", ChannelKind::Energy, 3600, records)
}

fn steps() -> impl Strategy<Value = Vec<(u8, f64)>> {
    prop::collection::vec(
        (
            prop_oneof![8 => Just(1u8), 1 => 2u8..6, 1 => 20u8..60],
            prop_oneof![9 => -50.0..1500.0f64, 1 => Just(0.0f64)],
        ),
        1..600,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn completeness_stays_in_unit_interval(steps in steps(), threshold in 0.0..=1.0f64, daily in any::<bool>()) {
        let series = hourly(&steps);
        let cleaned = apply_qc(&series, &QcThresholds { min: Some(0.0), ..Default::default() });
        let length = if daily { PeriodLength::Daily } else { PeriodLength::Monthly };
        let grid = span_grid(std::slice::from_ref(&cleaned), length).expect("test: grid");
        let periods = aggregate(std::slice::from_ref(&cleaned), &grid, threshold);

        prop_assert_eq!(periods.len(), grid.len());
        for p in &periods {
            prop_assert!((0.0..=1.0).contains(&p.completeness));
            if p.valid {
                prop_assert!(p.completeness > 0.0 && p.completeness >= threshold);
                prop_assert!(p.value.is_some());
            }
            if p.valid_records == 0 {
                prop_assert_eq!(p.completeness, 0.0);
                prop_assert!(!p.valid);
            }
        }
    }

    #[test]
    fn narrowing_qc_never_raises_completeness(
        steps in steps(),
        lo in -20.0..500.0f64,
        width in 100.0..1500.0f64,
        shrink_lo in 0.0..100.0f64,
        shrink_hi in 0.0..100.0f64,
        run in 1usize..8,
        run_cut in 0usize..4,
    ) {
        let series = hourly(&steps);
        let wide = QcThresholds {
            min: Some(lo),
            max: Some(lo + width),
            stale_run_length: Some(run + run_cut),
            stale_tolerance: 0.0,
        };
        let narrow = QcThresholds {
            min: Some(lo + shrink_lo),
            max: Some((lo + width - shrink_hi).max(lo + shrink_lo)),
            stale_run_length: Some(run),
            stale_tolerance: 0.0,
        };
        let a = apply_qc(&series, &wide);
        let b = apply_qc(&series, &narrow);

        prop_assert_eq!(a.records.len(), b.records.len());
        for (ra, rb) in a.records.iter().zip(&b.records) {
            prop_assert!(!(rb.flag.is_valid() && !ra.flag.is_valid()));
        }
        prop_assert!(QcSummary::from_series(&b).valid <= QcSummary::from_series(&a).valid);

        let grid = span_grid(std::slice::from_ref(&a), PeriodLength::Daily).expect("test: grid");
        let pa = aggregate(std::slice::from_ref(&a), &grid, 0.5);
        let pb = aggregate(std::slice::from_ref(&b), &grid, 0.5);
        for (x, y) in pa.iter().zip(&pb) {
            prop_assert!(y.completeness <= x.completeness);
            prop_assert!(!(y.valid && !x.valid));
        }
    }

    #[test]
    fn percentiles_are_monotone(
        samples in prop::collection::vec(-1e6..1e6f64, 1..200),
        p in 0.0..=100.0f64,
        q in 0.0..=100.0f64,
    ) {
        let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let a = percentile(&sorted, lo);
        let b = percentile(&sorted, hi);
        prop_assert!(a <= b);
        prop_assert!(sorted[0] <= a && b <= sorted[sorted.len() - 1]);

        let summary = EstimateSummary::from_samples(&samples, &[5.0, 50.0, 95.0]).expect("test: summary");
        let bounds: Vec<f64> = summary.percentiles.iter().map(|b| b.value).collect();
        prop_assert!(summary.min <= bounds[0]);
        prop_assert!(bounds[0] <= bounds[1] && bounds[1] <= bounds[2]);
        prop_assert!(bounds[2] <= summary.max);
    }
}
