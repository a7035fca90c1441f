// Per-Tick JSONL Time Series

use serde::Serialize;
use cloudgrid_engine::TickReport;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub elapsed: f64,
    pub money: f64,
    pub reputation: f64,
    pub score_total: f64,
    pub upkeep_per_second: f64,
    pub current_rps: f64,
    pub target_rps: f64,
    pub milestone_index: usize,
    pub spike_active: bool,
    pub shift_active: bool,
    pub disruption: Option<String>,
    pub capacity_factor: f64,
    pub in_flight: usize,
    pub queued: u32,
    pub processing: u32,
    pub mean_health: f64,
}

impl TickSnapshot {
    pub fn from_report(tick: u64, report: &TickReport) -> Self {
        let queued = report.nodes.iter().map(|n| n.queued).sum();
        let processing = report.nodes.iter().map(|n| n.processing).sum();
        let mean_health = if report.nodes.is_empty() {
            100.0
        } else {
            report.nodes.iter().map(|n| n.health).sum::<f64>() / report.nodes.len() as f64
        };

        Self {
            tick,
            elapsed: report.difficulty.elapsed,
            money: report.economy.money,
            reputation: report.economy.reputation,
            score_total: report.economy.score_total,
            upkeep_per_second: report.economy.upkeep_per_second,
            current_rps: report.difficulty.current_rps,
            target_rps: report.difficulty.target_rps,
            milestone_index: report.difficulty.milestone_index,
            spike_active: report.difficulty.spike_active,
            shift_active: report.difficulty.shift_active,
            disruption: report.difficulty.active_event.as_ref().map(|e| e.kind.label().to_string()),
            capacity_factor: report.difficulty.capacity_factor,
            in_flight: report.requests.iter().filter(|r| !r.state.is_terminal()).count(),
            queued,
            processing,
            mean_health,
        }
    }
}

/// Accumulates snapshots and writes them as JSONL.
pub struct TimeSeriesRecorder {
    snapshots: Vec<TickSnapshot>,
    every: u64,
}

impl TimeSeriesRecorder {
    /// Keep one snapshot out of every `every` ticks.
    pub fn new(every: u64) -> Self {
        Self { snapshots: Vec::new(), every: every.max(1) }
    }

    pub fn record(&mut self, tick: u64, report: &TickReport) {
        if tick % self.every == 0 {
            self.snapshots.push(TickSnapshot::from_report(tick, report));
        }
    }

    /// Write all snapshots to a JSONL file
    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
