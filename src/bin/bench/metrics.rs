// Benchmark Metric Trackers

use std::collections::BTreeMap;

use cloudgrid_engine::{Outcome, SimEvent, TickReport};

/// Folds tick events into per-run outcome counts.
#[derive(Debug, Default)]
pub struct OutcomeTracker {
    pub completed: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub malicious_blocked: u64,
    pub malicious_passed: u64,
    pub failures_by_reason: BTreeMap<String, u64>,
    pub disruptions: u32,
    pub milestones: u32,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_events(&mut self, events: &[SimEvent]) {
        for event in events {
            match event {
                SimEvent::RequestResolved { outcome, .. } => self.record_outcome(*outcome),
                SimEvent::DisruptionStarted { .. } => self.disruptions += 1,
                SimEvent::MilestoneReached { .. } => self.milestones += 1,
                _ => {}
            }
        }
    }

    fn record_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed { cached } => {
                self.completed += 1;
                if cached {
                    self.cache_hits += 1;
                }
            }
            Outcome::MaliciousBlocked => self.malicious_blocked += 1,
            Outcome::Failed { reason } => {
                self.failed += 1;
                *self.failures_by_reason.entry(format!("{reason:?}")).or_default() += 1;
            }
            Outcome::MaliciousPassed { reason } => {
                self.malicious_passed += 1;
                *self.failures_by_reason.entry(format!("{reason:?}")).or_default() += 1;
            }
        }
    }

    /// Completed share of legitimate requests that reached a resolution, in percent.
    pub fn completion_rate(&self) -> f64 {
        let resolved = self.completed + self.failed;
        if resolved == 0 {
            return 0.0;
        }
        self.completed as f64 / resolved as f64 * 100.0
    }
}

/// Worst-case load seen across a run.
#[derive(Debug)]
pub struct PressureTracker {
    pub peak_rps: f64,
    pub peak_queue: u32,
    pub min_health: f64,
}

impl PressureTracker {
    pub fn new() -> Self {
        Self { peak_rps: 0.0, peak_queue: 0, min_health: 100.0 }
    }

    pub fn record_tick(&mut self, report: &TickReport) {
        self.peak_rps = self.peak_rps.max(report.difficulty.current_rps);
        for node in &report.nodes {
            self.peak_queue = self.peak_queue.max(node.queued);
            self.min_health = self.min_health.min(node.health);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudgrid_engine::{FailureReason, RequestId, TrafficType};

    fn resolved(outcome: Outcome) -> SimEvent {
        SimEvent::RequestResolved { request: RequestId(1), traffic: TrafficType::Read, node: None, outcome }
    }

    #[test]
    fn completion_rate_ignores_malicious_traffic() {
        let mut tracker = OutcomeTracker::new();
        tracker.record_events(&[
            resolved(Outcome::Completed { cached: true }),
            resolved(Outcome::Failed { reason: FailureReason::WrongSink }),
            resolved(Outcome::MaliciousBlocked),
            resolved(Outcome::MaliciousPassed { reason: FailureReason::BypassedFirewall }),
        ]);
        assert_eq!(tracker.completion_rate(), 50.0);
        assert_eq!(tracker.cache_hits, 1);
        assert_eq!(tracker.malicious_passed, 1);
        assert_eq!(tracker.failures_by_reason["WrongSink"], 1);
    }
}
