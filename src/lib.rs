// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine

//! Long-term energy estimation with Monte Carlo uncertainty for fleet
//! operational analysis.
//!
//! Operational output is quality-controlled, aggregated onto calendar
//! periods, regressed against a long-term reference covariate and
//! evaluated at the reference's long-term climatology. The pipeline runs
//! once unperturbed and then under M independently sampled assumption
//! sets; [`run_ensemble`] returns the central estimate together with the
//! ensemble spread and a per-assumption sensitivity breakdown.

pub mod types;
pub mod error;
pub mod config;
pub mod qc;
pub mod resample;
pub mod correlator;
pub mod regression;
pub mod inputs;
pub mod monte_carlo;
pub mod aggregate;
pub mod met;

pub use aggregate::{EnsembleResult, EnsembleStatus, EstimateSummary};
pub use config::AnalysisConfig;
pub use error::InputError;
pub use monte_carlo::{run_ensemble, Axis, TrialOutcome, TrialRecord};
pub use regression::{FitError, FitResult, RegressionFamily};
pub use resample::PeriodLength;
pub use types::*;

use wasm_bindgen::prelude::*;

// ─── WASM Interface ──────────────────────────────────────────────────────────

fn install_panic_hook() {
    #[cfg(target_arch = "wasm32")]
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
}

fn parse_config(config: JsValue) -> Result<AnalysisConfig, JsValue> {
    if config.is_null() || config.is_undefined() {
        return Ok(AnalysisConfig::default());
    }
    let config: AnalysisConfig = serde_wasm_bindgen::from_value(config)
        .map_err(|e| JsValue::from_str(&format!("invalid configuration: {e}")))?;
    config.validate().map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(config)
}

/// Holds one validated configuration and runs ensembles against it.
#[wasm_bindgen]
pub struct EnsembleRunner {
    config: AnalysisConfig,
}

#[wasm_bindgen]
impl EnsembleRunner {
    /// `config` may be `null`/`undefined` for the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<EnsembleRunner, JsValue> {
        install_panic_hook();
        Ok(EnsembleRunner { config: parse_config(config)? })
    }

    pub fn run(&self, inputs: JsValue) -> Result<JsValue, JsValue> {
        let inputs: PlantInputs = serde_wasm_bindgen::from_value(inputs)
            .map_err(|e| JsValue::from_str(&format!("invalid inputs: {e}")))?;
        let result = run_ensemble(&inputs, &self.config).map_err(|e| JsValue::from_str(&e.to_string()))?;
        serde_wasm_bindgen::to_value(&result).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn get_config(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.config).unwrap_or(JsValue::NULL)
    }

    pub fn set_seed(&mut self, seed: u64) { self.config.monte_carlo.seed = seed; }
    pub fn set_ensemble_size(&mut self, size: usize) { self.config.monte_carlo.ensemble_size = size.max(1); }
}

/// One-shot entry point: `(inputs, config) -> EnsembleResult`.
#[wasm_bindgen]
pub fn run_ensemble_wasm(inputs: JsValue, config: JsValue) -> Result<JsValue, JsValue> {
    EnsembleRunner::new(config)?.run(inputs)
}
