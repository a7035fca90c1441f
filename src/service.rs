// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Service Node
//
// A placed node owns its FIFO queue and its processing slots. The tick loop
// drives admission and progress; resolving a finished slot is the router's job.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::catalog::NodeSpec;
use crate::types::{GridPos, NodeId, NodeKind, NodeView, RequestId};

pub const FULL_HEALTH: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub request: RequestId,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub tier: usize,
    pub position: GridPos,
    pub outgoing: BTreeSet<NodeId>,
    pub queue: VecDeque<RequestId>,
    pub processing: Vec<Slot>,
    pub health: f64,
    /// Set by a service outage; the node neither admits nor progresses until then.
    pub disabled_until: Option<f64>,
    pub repairing: bool,
    pub resolved: u64,
}

impl ServiceNode {
    pub fn new(id: NodeId, kind: NodeKind, position: GridPos) -> Self {
        Self {
            id,
            kind,
            tier: 0,
            position,
            outgoing: BTreeSet::new(),
            queue: VecDeque::new(),
            processing: Vec::new(),
            health: FULL_HEALTH,
            disabled_until: None,
            repairing: false,
            resolved: 0,
        }
    }

    // ─── Capacity & Timing ───────────────────────────────────────────────

    /// Tier capacity scaled by the disruption factor, floored, never below 1.
    pub fn effective_capacity(&self, spec: &NodeSpec, capacity_factor: f64) -> usize {
        let scaled = (spec.capacity_at(self.tier) as f64 * capacity_factor).floor();
        if scaled.is_finite() && scaled >= 1.0 {
            scaled as usize
        } else {
            1
        }
    }

    /// Base processing time stretched by wear: full health is 1x, zero health 2x.
    pub fn effective_processing_ms(&self, spec: &NodeSpec) -> f64 {
        spec.processing_ms * (2.0 - self.health.clamp(0.0, FULL_HEALTH) / FULL_HEALTH)
    }

    pub fn is_disabled(&self, now: f64) -> bool {
        self.disabled_until.is_some_and(|until| now < until)
    }

    // ─── Queue & Slots ───────────────────────────────────────────────────

    pub fn queue_full(&self, limit: usize) -> bool {
        self.queue.len() >= limit
    }

    pub fn enqueue(&mut self, request: RequestId) {
        self.queue.push_back(request);
    }

    /// Pop the FIFO head if a slot is free. The caller decides whether the
    /// request occupies the slot or is absorbed on the spot.
    pub fn next_admission(&mut self, capacity: usize) -> Option<RequestId> {
        if self.processing.len() < capacity {
            self.queue.pop_front()
        } else {
            None
        }
    }

    pub fn occupy(&mut self, request: RequestId) {
        self.processing.push(Slot { request, elapsed_ms: 0.0 });
    }

    /// Advance every slot by `dt` seconds and vacate the ones that finished,
    /// in slot order.
    pub fn progress(&mut self, dt: f64, processing_ms: f64) -> Vec<RequestId> {
        let mut finished = Vec::new();
        self.processing.retain_mut(|slot| {
            slot.elapsed_ms += dt * 1000.0;
            if slot.elapsed_ms >= processing_ms {
                finished.push(slot.request);
                false
            } else {
                true
            }
        });
        self.resolved += finished.len() as u64;
        finished
    }

    pub fn holds(&self, request: RequestId) -> bool {
        self.queue.contains(&request) || self.processing.iter().any(|s| s.request == request)
    }

    /// Everything the node currently holds, queue first.
    pub fn drain(&mut self) -> Vec<RequestId> {
        let mut held: Vec<RequestId> = self.queue.drain(..).collect();
        held.extend(self.processing.drain(..).map(|s| s.request));
        held
    }

    // ─── Wear & Repair ───────────────────────────────────────────────────

    pub fn load(&self, capacity: usize) -> f64 {
        let held = (self.processing.len() + self.queue.len()) as f64;
        held / (2.0 * capacity.max(1) as f64)
    }

    /// Chance that a single resolution wears the node down. Zero at or
    /// below half load, certain at full load.
    pub fn wear_chance(&self, capacity: usize) -> f64 {
        (2.0 * (self.load(capacity) - 0.5)).clamp(0.0, 1.0)
    }

    pub fn damage(&mut self, amount: f64) {
        self.health = (self.health - amount).max(0.0);
    }

    /// Repair is only offered once health falls below `critical`.
    pub fn needs_repair(&self, critical: f64) -> bool {
        self.health < critical
    }

    /// Restore health at `rate` per second. Returns `true` when the repair completes.
    pub fn repair_step(&mut self, dt: f64, rate: f64) -> bool {
        if !self.repairing {
            return false;
        }
        self.health = (self.health + rate * dt).min(FULL_HEALTH);
        if self.health >= FULL_HEALTH {
            self.repairing = false;
            return true;
        }
        false
    }

    pub fn upkeep_per_second(spec: &NodeSpec) -> f64 {
        spec.upkeep_per_minute / 60.0
    }

    pub fn view(&self, spec: &NodeSpec, capacity_factor: f64, now: f64) -> NodeView {
        let capacity = self.effective_capacity(spec, capacity_factor);
        NodeView {
            id: self.id,
            kind: self.kind,
            position: self.position,
            tier: self.tier,
            capacity: capacity as u32,
            processing: self.processing.len() as u32,
            queued: self.queue.len() as u32,
            load: self.load(capacity),
            health: self.health,
            disabled: self.is_disabled(now),
            repairing: self.repairing,
            outgoing: self.outgoing.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NodeCatalog;

    fn database() -> (ServiceNode, NodeSpec) {
        let spec = NodeCatalog::default().database;
        (ServiceNode::new(NodeId(1), NodeKind::Database, GridPos::new(0, 0)), spec)
    }

    #[test]
    fn capacity_factor_floors_and_clamps() {
        let (mut node, spec) = database();
        assert_eq!(node.effective_capacity(&spec, 1.0), 10);
        assert_eq!(node.effective_capacity(&spec, 0.5), 5);
        assert_eq!(node.effective_capacity(&spec, 0.01), 1);
        node.tier = 2;
        assert_eq!(node.effective_capacity(&spec, 0.5), 25);
    }

    #[test]
    fn admission_respects_slots() {
        let (mut node, _) = database();
        for i in 0..3 {
            node.enqueue(RequestId(i));
        }
        while let Some(id) = node.next_admission(2) {
            node.occupy(id);
        }
        assert_eq!(node.processing.len(), 2);
        assert_eq!(node.queue.front(), Some(&RequestId(2)));
    }

    #[test]
    fn progress_finishes_at_threshold() {
        let (mut node, spec) = database();
        node.occupy(RequestId(7));
        let ms = node.effective_processing_ms(&spec);
        assert_eq!(ms, 300.0);
        assert!(node.progress(0.2, ms).is_empty());
        assert_eq!(node.progress(0.1, ms), vec![RequestId(7)]);
        assert!(node.processing.is_empty());
        assert_eq!(node.resolved, 1);
    }

    #[test]
    fn worn_nodes_process_slower() {
        let (mut node, spec) = database();
        node.damage(50.0);
        assert!((node.effective_processing_ms(&spec) - 450.0).abs() < 1e-9);
        node.damage(500.0);
        assert_eq!(node.health, 0.0);
        assert!((node.effective_processing_ms(&spec) - 600.0).abs() < 1e-9);
    }

    #[test]
    fn wear_chance_starts_above_half_load() {
        let (mut node, _) = database();
        for i in 0..10 {
            node.enqueue(RequestId(i));
        }
        assert_eq!(node.wear_chance(10), 0.0);
        for i in 10..15 {
            node.enqueue(RequestId(i));
        }
        assert!((node.wear_chance(10) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn repair_opens_below_critical_health() {
        let (mut node, _) = database();
        node.damage(60.0);
        assert!(!node.needs_repair(40.0));
        node.damage(0.5);
        assert!(node.needs_repair(40.0));
    }

    #[test]
    fn repair_restores_to_full() {
        let (mut node, _) = database();
        node.damage(15.0);
        node.repairing = true;
        assert!(!node.repair_step(1.0, 10.0));
        assert!(node.repair_step(1.0, 10.0));
        assert_eq!(node.health, FULL_HEALTH);
        assert!(!node.repairing);
    }

    #[test]
    fn outage_window() {
        let (mut node, _) = database();
        node.disabled_until = Some(20.0);
        assert!(node.is_disabled(19.9));
        assert!(!node.is_disabled(20.0));
    }
}
