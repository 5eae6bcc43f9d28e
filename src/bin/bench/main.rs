// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Benchmark Runner
//
// Usage:
//   cargo run --release --bin bench                     # All scenarios, 10 seeds each
//   cargo run --release --bin bench -- --seeds 3        # Quick mode
//   cargo run --release --bin bench -- SPLIT            # Filter by name/label/category
//   cargo run --release --bin bench -- --seed 42        # Custom base seed
//   LOG_FORMAT=json RUST_LOG=debug cargo run --bin bench

mod report;
mod scenarios;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use packet_flow_engine::{SimConfig, SimStats, Simulation};
use report::*;
use scenarios::*;
use tracing::{error, info, warn};

// ─── Logging ────────────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    seeds: usize,
    seed: u64,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        seeds: 10,
        seed: 0,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--seeds" => {
                i += 1;
                if i < args.len() {
                    cli.seeds = args[i].parse().unwrap_or(10).max(1);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            other => {
                warn!(argument = other, "unknown argument");
            }
        }
        i += 1;
    }

    cli
}

// ─── Runs ───────────────────────────────────────────────────────────────────

fn build(scenario: &Scenario, seed: u64) -> Option<Simulation> {
    let mut config = SimConfig::default().with_seed(seed);
    config.collision.impact_waves = scenario.impact_waves;
    let mut sim = Simulation::with_config(config);
    match (scenario.setup)(sim.world_mut()) {
        Ok(()) => Some(sim),
        Err(err) => {
            error!(scenario = scenario.name, error = %err, "network setup failed");
            None
        }
    }
}

fn replay(scenario: &Scenario, seed: u64) -> Option<SimStats> {
    let mut sim = build(scenario, seed)?;
    sim.run_for(scenario.seconds);
    Some(sim.stats())
}

fn run_once(scenario: &Scenario, seed: u64) -> Option<RunResult> {
    let mut sim = build(scenario, seed)?;
    let start = Instant::now();
    let ticks = sim.run_for(scenario.seconds);
    let elapsed = start.elapsed();
    let stats = sim.stats();

    let deterministic = replay(scenario, seed).as_ref() == Some(&stats);
    let handled = stats.score + stats.loss;
    let loss_ratio = if handled == 0 {
        0.0
    } else {
        stats.loss as f64 / handled as f64
    };

    let c = &scenario.criteria;
    let pass = deterministic
        && stats.score >= c.min_score
        && c.max_loss_ratio.map_or(true, |max| loss_ratio <= max)
        && (!c.require_closed_groups || stats.open_groups == 0);

    Some(RunResult {
        seed,
        pass,
        ticks,
        score: stats.score,
        coins: stats.coins,
        loss: stats.loss,
        loss_ratio,
        open_groups: stats.open_groups,
        in_flight: stats.packets_on_wires + stats.packets_buffered,
        deterministic,
        elapsed_ms: elapsed.as_millis(),
        ticks_per_sec: ticks as f64 / elapsed.as_secs_f64().max(1e-9),
    })
}

fn run_scenario(scenario: &Scenario, seeds: usize, base_seed: u64) -> ScenarioReport {
    let runs: Vec<RunResult> = (0..seeds as u64)
        .filter_map(|i| run_once(scenario, base_seed.wrapping_add(i)))
        .collect();

    let collect = |f: &dyn Fn(&RunResult) -> f64| runs.iter().map(f).collect::<Vec<f64>>();
    let passed = runs.iter().filter(|r| r.pass).count();

    ScenarioReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: runs.len(),
        pass_rate: if runs.is_empty() { 0.0 } else { passed as f64 / runs.len() as f64 },
        score: Stats::from_samples(&collect(&|r: &RunResult| r.score as f64)),
        coins: Stats::from_samples(&collect(&|r: &RunResult| r.coins as f64)),
        loss: Stats::from_samples(&collect(&|r: &RunResult| r.loss as f64)),
        loss_ratio: Stats::from_samples(&collect(&|r: &RunResult| r.loss_ratio)),
        elapsed_ms: Stats::from_samples(&collect(&|r: &RunResult| r.elapsed_ms as f64)),
        ticks_per_sec: Stats::from_samples(&collect(&|r: &RunResult| r.ticks_per_sec)),
        runs,
    }
}

fn write_report(report: &BenchReport) -> std::io::Result<PathBuf> {
    let dir = Path::new("benchmark-results");
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("bench-{}.json", report.timestamp));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    init_tracing();
    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios
                .iter()
                .filter(|s| {
                    s.name.to_lowercase().contains(&f_lower)
                        || s.label.to_lowercase().contains(&f_lower)
                        || s.category.to_lowercase().contains(&f_lower)
                })
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        error!(filter = ?cli.filter, "no scenarios match filter");
        return ExitCode::FAILURE;
    }

    println!("\n  Packet Flow Bench");
    println!("  PRNG: ChaCha8Rng | Seeds/scenario: {} | Base seed: {}", cli.seeds, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!(
        "  {:<36} {:>5} {:>9} {:>8} {:>7} {:>10} {:>7}",
        "Scenario", "Pass%", "Score", "Coins", "Loss%", "Ticks/s", "Time"
    );
    println!("  {}", "-".repeat(88));

    let suite_start = Instant::now();
    let mut reports = Vec::new();

    for scenario in &to_run {
        let report = run_scenario(scenario, cli.seeds, cli.seed);
        let status = if report.pass_rate >= 1.0 { "PASS" } else { "FAIL" };
        println!(
            "  {:<36} {:>4}% {:>9.1} {:>8.1} {:>6.1}% {:>10.0} {:>5.0}ms  {}",
            report.label,
            (report.pass_rate * 100.0) as u32,
            report.score.mean,
            report.coins.mean,
            report.loss_ratio.mean * 100.0,
            report.ticks_per_sec.mean,
            report.elapsed_ms.mean,
            status,
        );
        info!(scenario = scenario.name, pass_rate = report.pass_rate, "scenario finished");
        reports.push(report);
    }

    let total = reports.len();
    let passed = reports.iter().filter(|r| r.pass_rate >= 1.0).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(88));
    println!(
        "  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total,
        passed,
        failed,
        suite_start.elapsed().as_secs_f64()
    );

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string();

    let report = BenchReport {
        timestamp,
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        seeds_per_scenario: cli.seeds,
        summary: Summary {
            total,
            passed,
            failed,
            pass_rate: passed as f64 / total as f64,
        },
        scenarios: reports,
    };

    match write_report(&report) {
        Ok(path) => println!("  Results saved to: {}\n", path.display()),
        Err(err) => {
            error!(error = %err, "failed to write benchmark report");
            return ExitCode::FAILURE;
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
