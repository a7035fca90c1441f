// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Traffic Generator
//
// Rate accumulator plus weighted type selection. The generator only decides
// how many requests are due and of which type; routing them is the router's job.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{RequestId, TrafficType};

const WEIGHT_EPSILON: f64 = 1e-9;

// ─── Traffic Distribution ────────────────────────────────────────────────────

/// Normalized type mix. Weights always sum to 1.0 and every type has an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficDistribution(BTreeMap<TrafficType, f64>);

impl TrafficDistribution {
    /// Normalize arbitrary non-negative weights. Returns `None` when the
    /// weights are unusable (negative, non-finite, or all zero).
    pub fn from_weights(weights: &BTreeMap<TrafficType, f64>) -> Option<Self> {
        if weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let total: f64 = weights.values().sum();
        if total <= WEIGHT_EPSILON {
            return None;
        }
        let normalized = TrafficType::ALL
            .iter()
            .map(|t| (*t, weights.get(t).copied().unwrap_or(0.0) / total))
            .collect();
        Some(Self(normalized))
    }

    /// Equal weight on every type.
    pub fn uniform() -> Self {
        let share = 1.0 / TrafficType::ALL.len() as f64;
        Self(TrafficType::ALL.iter().map(|t| (*t, share)).collect())
    }

    pub fn weight(&self, traffic: TrafficType) -> f64 {
        self.0.get(&traffic).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn entries(&self) -> Vec<(TrafficType, f64)> {
        self.0.iter().map(|(t, w)| (*t, *w)).collect()
    }

    pub fn as_map(&self) -> &BTreeMap<TrafficType, f64> {
        &self.0
    }

    /// Pin `traffic` to `weight` and scale the remaining types proportionally
    /// so the total stays 1.0.
    pub fn with_pinned(&self, traffic: TrafficType, weight: f64) -> Self {
        let weight = weight.clamp(0.0, 1.0);
        let rest_before = 1.0 - self.weight(traffic);
        let rest_after = 1.0 - weight;
        let others = TrafficType::ALL.len() as f64 - 1.0;

        let pinned = TrafficType::ALL
            .iter()
            .map(|t| {
                let w = if *t == traffic {
                    weight
                } else if rest_before <= WEIGHT_EPSILON {
                    rest_after / others
                } else {
                    self.weight(*t) * rest_after / rest_before
                };
                (*t, w)
            })
            .collect();
        Self(pinned)
    }

    /// Draw a type by walking the cumulative weights.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TrafficType {
        let r: f64 = rng.gen();
        let mut cumulative = 0.0;
        let mut last_nonzero = TrafficType::Static;
        for (traffic, weight) in &self.0 {
            if *weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last_nonzero = *traffic;
            if r < cumulative {
                return *traffic;
            }
        }
        // Rounding can leave cumulative a hair under 1.0.
        last_nonzero
    }
}

// ─── Traffic Generator ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficGenerator {
    accumulator: f64,
    next_id: u64,
    pub spawn_count: u64,
    pub spawned_by_type: BTreeMap<TrafficType, u64>,
}

impl TrafficGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many spawns the elapsed `dt` covers at `rps`. Loops so that large
    /// (time-accelerated) deltas still produce the right integer count;
    /// backlog past `max_per_tick` is discarded.
    pub fn due(&mut self, dt: f64, rps: f64, max_per_tick: u32) -> u32 {
        if !rps.is_finite() || rps <= 0.0 {
            return 0;
        }
        self.accumulator += dt.max(0.0);
        let interval = 1.0 / rps;
        let mut count = 0;
        while self.accumulator >= interval {
            if count >= max_per_tick {
                self.accumulator %= interval;
                break;
            }
            self.accumulator -= interval;
            count += 1;
        }
        count
    }

    pub fn next_request_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }

    pub fn record_spawn(&mut self, traffic: TrafficType) {
        self.spawn_count += 1;
        *self.spawned_by_type.entry(traffic).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mix(pairs: &[(TrafficType, f64)]) -> TrafficDistribution {
        TrafficDistribution::from_weights(&pairs.iter().copied().collect()).unwrap()
    }

    #[test]
    fn normalizes_percentages() {
        let d = mix(&[(TrafficType::Static, 50.0), (TrafficType::Read, 45.0), (TrafficType::Malicious, 5.0)]);
        assert!((d.total() - 1.0).abs() < 1e-9);
        assert!((d.weight(TrafficType::Static) - 0.5).abs() < 1e-9);
        assert_eq!(d.weight(TrafficType::Search), 0.0);
        assert_eq!(d.entries().len(), TrafficType::ALL.len());
    }

    #[test]
    fn rejects_degenerate_weights() {
        assert!(TrafficDistribution::from_weights(&BTreeMap::new()).is_none());
        let negative = [(TrafficType::Read, -1.0), (TrafficType::Write, 2.0)].into_iter().collect();
        assert!(TrafficDistribution::from_weights(&negative).is_none());
    }

    #[test]
    fn pinning_keeps_total_and_ratios() {
        let d = mix(&[(TrafficType::Static, 0.6), (TrafficType::Read, 0.3), (TrafficType::Malicious, 0.1)]);
        let spiked = d.with_pinned(TrafficType::Malicious, 0.46);
        assert!((spiked.total() - 1.0).abs() < 1e-9);
        assert!((spiked.weight(TrafficType::Malicious) - 0.46).abs() < 1e-9);
        let ratio = spiked.weight(TrafficType::Static) / spiked.weight(TrafficType::Read);
        assert!((ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn pinning_from_pure_type_spreads_evenly() {
        let d = mix(&[(TrafficType::Malicious, 1.0)]);
        let relaxed = d.with_pinned(TrafficType::Malicious, 0.5);
        assert!((relaxed.total() - 1.0).abs() < 1e-9);
        assert!((relaxed.weight(TrafficType::Read) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn sampling_tracks_weights() {
        let d = mix(&[(TrafficType::Static, 0.7), (TrafficType::Write, 0.3)]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 10_000;
        let statics = (0..n).filter(|_| d.sample(&mut rng) == TrafficType::Static).count();
        let pct = statics as f64 / n as f64;
        assert!((pct - 0.7).abs() < 0.03, "static share {pct}");
    }

    #[test]
    fn catch_up_spawns_integer_count() {
        let mut generator = TrafficGenerator::new();
        // 0.3s at 10 rps is three spawns in a single tick.
        assert_eq!(generator.due(0.3 + 1e-9, 10.0, 100), 3);
        assert_eq!(generator.due(0.05, 10.0, 100), 0);
        assert_eq!(generator.due(0.05, 10.0, 100), 1);
    }

    #[test]
    fn long_run_rate_is_preserved_under_acceleration() {
        let mut slow = TrafficGenerator::new();
        let mut fast = TrafficGenerator::new();
        let slow_total: u32 = (0..3000).map(|_| slow.due(0.01, 4.0, 100)).sum();
        let fast_total: u32 = (0..1000).map(|_| fast.due(0.03, 4.0, 100)).sum();
        assert!((slow_total as i64 - fast_total as i64).abs() <= 1);
        assert!((slow_total as i64 - 120).abs() <= 1);
    }

    #[test]
    fn cap_discards_backlog() {
        let mut generator = TrafficGenerator::new();
        assert_eq!(generator.due(10.0, 100.0, 5), 5);
        assert_eq!(generator.due(0.0, 100.0, 5), 0);
    }

    #[test]
    fn zero_rate_spawns_nothing() {
        let mut generator = TrafficGenerator::new();
        assert_eq!(generator.due(1.0, 0.0, 10), 0);
    }
}
