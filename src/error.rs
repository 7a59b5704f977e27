// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Run-Level Errors

/// Input malformation. Fatal to the whole run and reported before any
/// trial executes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("series `{channel}` has no records")]
    EmptySeries { channel: String },

    #[error("series `{channel}`: timestamp at index {index} does not strictly increase")]
    NonMonotonicTimestamps { channel: String, index: usize },

    #[error("series `{channel}`: sampling interval must be positive (got {interval_secs}s)")]
    InvalidSamplingInterval { channel: String, interval_secs: i64 },

    #[error("series `{channel}`: unit mismatch, expected `{expected}` but found `{found}`")]
    UnitMismatch { channel: String, expected: String, found: String },

    #[error("output series mix channel kinds (`{first}` vs `{other}`)")]
    MixedChannelKinds { first: String, other: String },

    #[error("no output series supplied")]
    NoOutputSeries,

    #[error("calendar span of `{channel}` cannot be represented")]
    UnrepresentableSpan { channel: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
