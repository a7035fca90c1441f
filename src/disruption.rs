// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Disruption Events

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::DisruptionParams;
use crate::difficulty::Modifiers;
use crate::topology::Topology;
use crate::types::{NodeId, NodeKind, SimEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisruptionKind {
    CostSpike,
    CapacityDrop,
    TrafficBurst,
    ServiceOutage,
}

impl DisruptionKind {
    pub const ALL: [DisruptionKind; 4] = [
        DisruptionKind::CostSpike,
        DisruptionKind::CapacityDrop,
        DisruptionKind::TrafficBurst,
        DisruptionKind::ServiceOutage,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::CostSpike => "Cloud bill spike",
            Self::CapacityDrop => "Degraded hardware",
            Self::TrafficBurst => "Viral traffic burst",
            Self::ServiceOutage => "Service outage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDisruption {
    pub kind: DisruptionKind,
    pub started_at: f64,
    pub ends_at: f64,
    /// The node taken down by a service outage.
    pub target: Option<NodeId>,
}

impl ActiveDisruption {
    /// Apply this event's single multiplier on top of `base`.
    pub fn apply(&self, params: &DisruptionParams, base: Modifiers) -> Modifiers {
        let mut m = base;
        match self.kind {
            DisruptionKind::CostSpike => m.upkeep_multiplier *= params.cost_spike_multiplier,
            DisruptionKind::CapacityDrop => m.capacity_factor *= params.capacity_drop_factor,
            DisruptionKind::TrafficBurst => m.spawn_multiplier *= params.traffic_burst_multiplier,
            DisruptionKind::ServiceOutage => {}
        }
        m
    }
}

/// Rolls for a random event on a fixed cadence. At most one runs at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisruptionScheduler {
    timer: f64,
    active: Option<ActiveDisruption>,
}

impl DisruptionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveDisruption> {
        self.active.as_ref()
    }

    pub fn modifiers(&self, params: &DisruptionParams, base: Modifiers) -> Modifiers {
        match &self.active {
            Some(event) => event.apply(params, base),
            None => base,
        }
    }

    pub fn update<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        now: f64,
        params: &DisruptionParams,
        topology: &mut Topology,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) {
        if self.active.as_ref().is_some_and(|e| now >= e.ends_at) {
            self.end(topology, events);
        }
        if !params.enabled {
            return;
        }

        self.timer += dt;
        if self.timer < params.check_interval {
            return;
        }
        self.timer = 0.0;
        if self.active.is_some() || rng.gen::<f64>() >= params.probability {
            return;
        }
        let kind = DisruptionKind::ALL[rng.gen_range(0..DisruptionKind::ALL.len())];
        self.start(kind, now, params, topology, rng, events);
    }

    /// Start `kind` now. Returns `false` when another event is running or an
    /// outage has no eligible node.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        kind: DisruptionKind,
        now: f64,
        params: &DisruptionParams,
        topology: &mut Topology,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) -> bool {
        if self.active.is_some() {
            return false;
        }
        let ends_at = now + params.duration;
        let target = if kind == DisruptionKind::ServiceOutage {
            let eligible: Vec<NodeId> = topology
                .nodes()
                .filter(|n| n.kind != NodeKind::Firewall)
                .map(|n| n.id)
                .collect();
            if eligible.is_empty() {
                tracing::debug!("service outage skipped, no eligible node");
                return false;
            }
            let id = eligible[rng.gen_range(0..eligible.len())];
            if let Some(node) = topology.get_mut(id) {
                node.disabled_until = Some(ends_at);
            }
            Some(id)
        } else {
            None
        };

        tracing::info!(?kind, ?target, until = ends_at, "disruption started");
        events.push(SimEvent::DisruptionStarted { kind, ends_at });
        self.active = Some(ActiveDisruption { kind, started_at: now, ends_at, target });
        true
    }

    /// Revert exactly what the running event set.
    fn end(&mut self, topology: &mut Topology, events: &mut Vec<SimEvent>) {
        let Some(event) = self.active.take() else { return };
        if let Some(node) = event.target.and_then(|id| topology.get_mut(id)) {
            node.disabled_until = None;
        }
        tracing::info!(kind = ?event.kind, "disruption ended");
        events.push(SimEvent::DisruptionEnded { kind: event.kind });
    }

    /// Reinstate a saved event, re-applying its outage flag.
    pub(crate) fn restore(&mut self, event: Option<ActiveDisruption>, topology: &mut Topology) {
        if let Some(e) = &event {
            if let Some(node) = e.target.and_then(|id| topology.get_mut(id)) {
                node.disabled_until = Some(e.ends_at);
            }
        }
        self.active = event;
        self.timer = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GridPos;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup() -> (Topology, NodeId, NodeId, ChaCha8Rng) {
        let mut topology = Topology::new(GridPos::new(-10, 0));
        let fw = topology.add_node(NodeKind::Firewall, GridPos::new(0, 0)).unwrap();
        let db = topology.add_node(NodeKind::Database, GridPos::new(4, 0)).unwrap();
        (topology, fw, db, ChaCha8Rng::seed_from_u64(11))
    }

    #[test]
    fn capacity_drop_reverts_exactly() {
        let (mut topology, _, _, mut rng) = setup();
        let params = DisruptionParams::default();
        let mut scheduler = DisruptionScheduler::new();
        let mut events = Vec::new();

        let base = Modifiers::default();
        assert!(scheduler.start(DisruptionKind::CapacityDrop, 0.0, &params, &mut topology, &mut rng, &mut events));
        assert_eq!(scheduler.modifiers(&params, base).capacity_factor, 0.5);

        scheduler.update(1.0, 20.0, &params, &mut topology, &mut rng, &mut events);
        assert!(scheduler.active().is_none());
        assert_eq!(scheduler.modifiers(&params, base), base);
        assert_eq!(events.last(), Some(&SimEvent::DisruptionEnded { kind: DisruptionKind::CapacityDrop }));
    }

    #[test]
    fn outage_never_hits_a_firewall() {
        let (mut topology, fw, db, mut rng) = setup();
        let params = DisruptionParams::default();
        let mut events = Vec::new();
        for _ in 0..10 {
            let mut scheduler = DisruptionScheduler::new();
            assert!(scheduler.start(DisruptionKind::ServiceOutage, 5.0, &params, &mut topology, &mut rng, &mut events));
            assert_eq!(scheduler.active().and_then(|e| e.target), Some(db));
            assert!(topology.get(db).unwrap().is_disabled(10.0));
            assert!(!topology.get(fw).unwrap().is_disabled(10.0));
            scheduler.update(0.0, 25.0, &params, &mut topology, &mut rng, &mut events);
            assert_eq!(topology.get(db).unwrap().disabled_until, None);
        }
    }

    #[test]
    fn outage_without_candidates_is_skipped() {
        let mut topology = Topology::new(GridPos::new(-10, 0));
        topology.add_node(NodeKind::Firewall, GridPos::new(0, 0)).unwrap();
        let mut scheduler = DisruptionScheduler::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut events = Vec::new();
        let params = DisruptionParams::default();
        assert!(!scheduler.start(DisruptionKind::ServiceOutage, 0.0, &params, &mut topology, &mut rng, &mut events));
        assert!(events.is_empty());
    }

    #[test]
    fn only_one_event_at_a_time() {
        let (mut topology, _, _, mut rng) = setup();
        let mut params = DisruptionParams::default();
        params.probability = 1.0;
        params.duration = 1000.0;
        let mut scheduler = DisruptionScheduler::new();
        let mut events = Vec::new();
        let mut t = 0.0;
        while t < 300.0 {
            t += 1.0;
            scheduler.update(1.0, t, &params, &mut topology, &mut rng, &mut events);
        }
        let started = events.iter().filter(|e| matches!(e, SimEvent::DisruptionStarted { .. })).count();
        assert_eq!(started, 1);
    }

    #[test]
    fn disabled_scheduler_never_rolls() {
        let (mut topology, _, _, mut rng) = setup();
        let mut params = DisruptionParams::default();
        params.enabled = false;
        params.probability = 1.0;
        let mut scheduler = DisruptionScheduler::new();
        let mut events = Vec::new();
        for i in 0..100 {
            scheduler.update(1.0, i as f64, &params, &mut topology, &mut rng, &mut events);
        }
        assert!(events.is_empty());
    }
}
