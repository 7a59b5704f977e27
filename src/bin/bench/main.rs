// Ensemble Benchmark Runner - synthetic fleets through the full Monte Carlo engine
// Seedable ChaCha8 streams, per-trial audit records, JSON report per run
//
// Usage:
//   cargo run --release --bin bench                        # All scenarios, 500 trials each
//   cargo run --release --bin bench -- --trials 100        # Quick mode
//   cargo run --release --bin bench -- ROBUST              # Filter by name/label/category
//   cargo run --release --bin bench -- --config base.json  # Base analysis configuration
//   cargo run --release --bin bench -- --seed 42 --keep-ensemble
//   RUST_LOG=debug cargo run --release --bin bench         # Per-trial outcomes

mod report;
mod runner;
mod scenarios;
mod synthetic;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{error, info};

use oa_engine::AnalysisConfig;
use report::*;
use runner::{run_scenario, RunOptions};
use scenarios::*;

// ─── CLI ────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bench", version, about = "Long-term energy ensemble benchmark")]
struct Cli {
    /// Trials per scenario.
    #[arg(long, default_value_t = 500)]
    trials: usize,

    /// Seed for both the synthetic plant and the ensemble.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// JSON analysis configuration applied before each scenario's own settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run trials on a single thread.
    #[arg(long)]
    sequential: bool,

    /// Embed every trial record in the JSON report.
    #[arg(long)]
    keep_ensemble: bool,

    #[arg(long, default_value = "benchmark-results")]
    output_dir: PathBuf,

    /// Case-insensitive substring of scenario name, label or category.
    filter: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<AnalysisConfig, String> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let json = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    AnalysisConfig::from_json_str(&json).map_err(|e| format!("{}: {e}", path.display()))
}

fn fmt_kwh(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v / 1e6))
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let base = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("cannot load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let all_scenarios = scenarios();
    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios.iter()
                .filter(|s| s.name.to_lowercase().contains(&f_lower)
                          || s.label.to_lowercase().contains(&f_lower)
                          || s.category.to_lowercase().contains(&f_lower))
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        return ExitCode::FAILURE;
    }

    let opts = RunOptions {
        base: &base,
        trials: cli.trials.max(1),
        seed: cli.seed,
        parallel: !cli.sequential,
        keep_ensemble: cli.keep_ensemble,
    };

    println!("\n  Long-Term Energy Ensemble Benchmark");
    println!("  PRNG: ChaCha8Rng (per-trial streams) | Trials/scenario: {} | Seed: {}", opts.trials, opts.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<34} {:<14} {:>9} {:>9} {:>9} {:>9} {:>7} {:>6} {:>7}",
        "Scenario", "Status", "Truth", "Central", "P5", "P95", "Err%", "Fail%", "Time");
    println!("  {}", "-".repeat(112));

    let suite_start = Instant::now();
    let mut reports = Vec::new();

    for scenario in &to_run {
        let report = match run_scenario(scenario, &opts) {
            Ok(report) => report,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        };

        println!("  {:<34} {:<14} {:>9} {:>9} {:>9} {:>9} {:>7} {:>5.1}% {:>5}ms  {}",
            report.label,
            report.status,
            fmt_kwh(Some(report.truth_annual_kwh)),
            fmt_kwh(report.central_kwh),
            fmt_kwh(report.p5_kwh),
            fmt_kwh(report.p95_kwh),
            report.central_error.map_or_else(|| "-".to_string(), |e| format!("{:.2}", e * 100.0)),
            report.failure_rate * 100.0,
            report.elapsed_ms,
            if report.pass { "PASS" } else { "FAIL" },
        );

        reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();
    let summary = Summary::from_reports(&reports);

    println!("  {}", "-".repeat(112));
    println!("  Energies in GWh/yr. Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        summary.total, summary.passed, summary.failed, suite_elapsed.as_secs_f64());

    println!("  Dominant uncertainty axis:");
    for r in &reports {
        if let (Some(axis), Some(share)) = (&r.dominant_axis, r.dominant_share) {
            let spread = r.relative_spread().map_or_else(|| "-".to_string(), |s| format!("{:.1}%", s * 100.0));
            println!("    {:<34} {:<24} share {:.2}  P5-P95 spread {}", r.label, axis, share, spread);
        }
    }
    println!();

    // ─── Write JSON Report ──────────────────────────────────────────────

    let now = chrono::Utc::now();
    let failed = summary.failed;
    let report = BenchReport {
        timestamp: now.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_trials_per_scenario: opts.trials,
        base_seed: opts.seed,
        summary,
        scenarios: reports,
    };

    let path = cli.output_dir.join(format!("bench-{}.json", now.timestamp_millis()));
    let written = std::fs::create_dir_all(&cli.output_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| serde_json::to_string_pretty(&report).map_err(|e| e.to_string()))
        .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => {
            info!("report written to {}", path.display());
            println!("  Results saved to: {}\n", path.display());
        }
        Err(e) => {
            error!("cannot write {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
