// Monte Carlo Runner
//
// Each scenario runs N times with seeds base..base+N, computing mean ± 95% CI.

use cloudgrid_engine::*;

use crate::metrics::{OutcomeTracker, PressureTracker};
use crate::report::*;
use crate::scenarios::{Scenario, TICK_SECONDS};
use crate::time_series::TimeSeriesRecorder;

use std::time::Instant;

/// Snapshot stride for time series output (one per simulated second).
const SERIES_STRIDE: u64 = 20;

/// Run a single scenario iteration with a specific seed.
pub fn run_single(
    scenario: &Scenario,
    seed: u64,
    time_series_dir: Option<&std::path::Path>,
) -> Result<RunResult, String> {
    let start = Instant::now();
    let mut sim = Simulation::new((scenario.config)(), seed).map_err(|e| e.to_string())?;
    (scenario.setup)(&mut sim).map_err(|e| format!("layout rejected: {e}"))?;

    let mut outcomes = OutcomeTracker::new();
    let mut pressure = PressureTracker::new();
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new(SERIES_STRIDE));

    let mut ticks = 0;
    for tick in 0..scenario.ticks() {
        if let Some(event) = &scenario.mid_event {
            event(&mut sim, tick);
        }

        let report = sim.tick(TICK_SECONDS);
        ticks += 1;
        outcomes.record_events(&report.events);
        pressure.record_tick(&report);
        if let Some(ts) = time_series.as_mut() {
            ts.record(tick, &report);
        }

        if report.status == RunStatus::GameOver {
            break;
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        if let Err(e) = ts.write_jsonl(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write time series");
        }
    }

    let elapsed = start.elapsed();
    let elapsed_secs = elapsed.as_secs_f64().max(0.001);

    let economy = sim.snapshot().economy;
    let game_over = sim.status() == RunStatus::GameOver;
    let survived_seconds = sim.elapsed();
    let completion_rate = outcomes.completion_rate();

    let criteria = &scenario.criteria;
    let mut pass = game_over == criteria.expect_game_over;
    if let Some(min) = criteria.min_survival_seconds {
        if survived_seconds < min {
            pass = false;
        }
    }
    if let Some(min) = criteria.min_completion_rate {
        if completion_rate < min {
            pass = false;
        }
    }
    if let Some(max) = criteria.max_malicious_passed {
        if outcomes.malicious_passed > max {
            pass = false;
        }
    }

    tracing::debug!(scenario = scenario.name, seed, pass, survived_seconds, "run finished");

    Ok(RunResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass,
        game_over,
        survived_seconds,
        final_money: economy.money,
        final_reputation: economy.reputation,
        score_total: economy.score_total,
        score_storage: economy.score_storage,
        score_database: economy.score_database,
        score_security: economy.score_security,
        spawned: sim.generator().spawn_count,
        completed: outcomes.completed,
        failed: outcomes.failed,
        completion_rate,
        cache_hits: outcomes.cache_hits,
        malicious_blocked: outcomes.malicious_blocked,
        malicious_passed: outcomes.malicious_passed,
        failures_by_reason: outcomes.failures_by_reason,
        peak_rps: pressure.peak_rps,
        peak_queue: pressure.peak_queue,
        min_health: pressure.min_health,
        disruptions: outcomes.disruptions,
        milestones: outcomes.milestones,
        ticks,
        elapsed_ms: elapsed.as_millis(),
        ticks_per_sec: ticks as f64 / elapsed_secs,
    })
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    time_series_base: Option<&std::path::Path>,
) -> Result<MonteCarloReport, String> {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let mut results = Vec::with_capacity(n_runs);
    for i in 0..n_runs {
        let seed = base_seed + i as u64;
        results.push(run_single(scenario, seed, ts_dir.as_deref())?);
    }

    Ok(aggregate(scenario, results))
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<RunResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let game_overs = results.iter().filter(|r| r.game_over).count();
    let stats = |f: fn(&RunResult) -> f64| Stats::from_samples(&results.iter().map(f).collect::<Vec<_>>());

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate: passed as f64 / n.max(1) as f64,
        game_over_rate: game_overs as f64 / n.max(1) as f64,
        survived_seconds: stats(|r| r.survived_seconds),
        score_total: stats(|r| r.score_total),
        final_money: stats(|r| r.final_money),
        final_reputation: stats(|r| r.final_reputation),
        completion_rate: stats(|r| r.completion_rate),
        malicious_passed: stats(|r| r.malicious_passed as f64),
        peak_queue: stats(|r| r.peak_queue as f64),
        min_health: stats(|r| r.min_health),
        elapsed_ms: stats(|r| r.elapsed_ms as f64),
        ticks_per_sec: stats(|r| r.ticks_per_sec),
        individual_runs: results,
    }
}
