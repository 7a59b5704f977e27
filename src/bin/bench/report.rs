// Benchmark Report Types
// Structured output for independent analysis of each scenario's ensemble

use std::collections::BTreeMap;

use serde::Serialize;

use oa_engine::EnsembleResult;

// ─── Per-Scenario Report ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub seed: u64,
    pub n_trials: usize,
    pub status: String,
    pub pass: bool,
    pub truth_annual_kwh: f64,
    pub central_kwh: Option<f64>,
    /// |central - truth| / truth.
    pub central_error: Option<f64>,
    pub mean_kwh: Option<f64>,
    pub p5_kwh: Option<f64>,
    pub p50_kwh: Option<f64>,
    pub p95_kwh: Option<f64>,
    pub cv: Option<f64>,
    pub failure_rate: f64,
    pub failures: BTreeMap<String, usize>,
    /// Axis with the largest variance share, if any axis varied.
    pub dominant_axis: Option<String>,
    pub dominant_share: Option<f64>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u128,
    pub trials_per_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<EnsembleResult>,
}

impl ScenarioReport {
    /// Interval width P95 - P5 relative to the median.
    pub fn relative_spread(&self) -> Option<f64> {
        match (self.p5_kwh, self.p50_kwh, self.p95_kwh) {
            (Some(lo), Some(mid), Some(hi)) if mid != 0.0 => Some((hi - lo) / mid),
            _ => None,
        }
    }
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_trials_per_scenario: usize,
    pub base_seed: u64,
    pub summary: Summary,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

impl Summary {
    pub fn from_reports(reports: &[ScenarioReport]) -> Self {
        let total = reports.len();
        let passed = reports.iter().filter(|r| r.pass).count();
        Self {
            total,
            passed,
            failed: total - passed,
            pass_rate: if total > 0 { passed as f64 / total as f64 } else { 0.0 },
        }
    }
}
