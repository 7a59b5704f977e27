// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Type Definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Quality Flag ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Valid = 0,
    Missing = 1,     // absent from the regular grid, or non-finite value
    OutOfRange = 2,  // outside the configured [min, max]
    Stale = 3,       // repeated value run longer than the allowed length
    Manual = 4,      // excluded upstream by an analyst
}

impl Default for QualityFlag {
    fn default() -> Self { QualityFlag::Valid }
}

impl QualityFlag {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Precedence when several QC rules fire on the same record.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Valid => 0,
            Self::Stale => 1,
            Self::OutOfRange => 2,
            Self::Missing => 3,
            Self::Manual => 4,
        }
    }

    /// Keep whichever flag has the higher precedence.
    pub fn combine(self, other: QualityFlag) -> QualityFlag {
        if other.priority() > self.priority() { other } else { self }
    }
}

// ─── Channel Kind ───────────────────────────────────────────────────────────

/// How sub-period values reduce onto a reporting period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Energy-like quantity, summed (e.g. kWh per interval).
    Energy,
    /// Rate-like quantity, averaged (e.g. wind speed, availability).
    Rate,
}

impl Default for ChannelKind {
    fn default() -> Self { ChannelKind::Energy }
}

// ─── Record ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub flag: QualityFlag,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value, flag: QualityFlag::Valid }
    }

    pub fn missing(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, value: f64::NAN, flag: QualityFlag::Missing }
    }
}

// ─── MeasurementSeries ──────────────────────────────────────────────────────

/// One measured channel: ordered records at a native sampling interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementSeries {
    pub channel: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub kind: ChannelKind,
    pub sampling_interval_secs: i64,
    pub records: Vec<Record>,
}

impl MeasurementSeries {
    pub fn new(
        channel: impl Into<String>,
        unit: impl Into<String>,
        kind: ChannelKind,
        sampling_interval_secs: i64,
        records: Vec<Record>,
    ) -> Self {
        Self {
            channel: channel.into(),
            unit: unit.into(),
            kind,
            sampling_interval_secs,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(|r| r.timestamp)
    }

    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|r| r.flag.is_valid()).count()
    }
}

// ─── ReferenceSeries ────────────────────────────────────────────────────────

/// Long-duration external covariate (e.g. reanalysis wind speed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ReferenceSeries(pub MeasurementSeries);

impl ReferenceSeries {
    pub fn series(&self) -> &MeasurementSeries {
        &self.0
    }
}

impl From<MeasurementSeries> for ReferenceSeries {
    fn from(series: MeasurementSeries) -> Self { ReferenceSeries(series) }
}

// ─── PlantInputs ────────────────────────────────────────────────────────────

/// Everything a run reads: one output series per metered asset plus the
/// long-term reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantInputs {
    pub output: Vec<MeasurementSeries>,
    pub reference: ReferenceSeries,
}
