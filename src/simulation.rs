// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Simulation Context

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wasm_bindgen::prelude::*;

use crate::adapter::half_refund;
use crate::catalog::{ConfigError, SimConfig};
use crate::clock::{SimulationClock, TimeScale};
use crate::difficulty::{upkeep_scale, DifficultyController, Modifiers};
use crate::disruption::{DisruptionKind, DisruptionScheduler};
use crate::ledger::{Expense, Ledger};
use crate::request::Request;
use crate::routing::{self, Arrival, Resolution};
use crate::service::ServiceNode;
use crate::topology::Topology;
use crate::traffic::{TrafficDistribution, TrafficGenerator};
use crate::types::*;

// ─── Simulation struct ───────────────────────────────────────────────────────

/// The whole game state. Every operation goes through this value; there are
/// no globals, so tests can run any number of independent simulations.
#[wasm_bindgen]
#[derive(Debug)]
pub struct Simulation {
    /// The configuration the run started from, for `reset`.
    pub(crate) initial: SimConfig,
    pub(crate) config: SimConfig,
    pub(crate) seed: u64,
    pub(crate) rng: ChaCha8Rng,

    pub(crate) clock: SimulationClock,
    pub(crate) topology: Topology,
    pub(crate) requests: BTreeMap<RequestId, Request>,
    pub(crate) generator: TrafficGenerator,
    pub(crate) ledger: Ledger,
    pub(crate) difficulty: DifficultyController,
    pub(crate) disruptions: DisruptionScheduler,
    pub(crate) modifiers: Modifiers,

    pub(crate) status: RunStatus,
    /// Events raised by commands between ticks, flushed into the next report.
    pub(crate) pending: Vec<SimEvent>,
}

impl Simulation {
    pub fn new(config: SimConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, seed))
    }

    pub fn survival(seed: u64) -> Self {
        Self::build(SimConfig::survival(), seed)
    }

    pub fn sandbox(budget: f64, rps: f64, upkeep_enabled: bool, seed: u64) -> Self {
        Self::build(SimConfig::sandbox(budget, rps, upkeep_enabled), seed)
    }

    pub(crate) fn build(config: SimConfig, seed: u64) -> Self {
        let distribution =
            TrafficDistribution::from_weights(&config.distribution).unwrap_or_else(TrafficDistribution::uniform);
        Self {
            initial: config.clone(),
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock: SimulationClock::new(config.rules.max_frame_dt),
            topology: Topology::new(config.entry_position),
            requests: BTreeMap::new(),
            generator: TrafficGenerator::new(),
            ledger: Ledger::new(config.start_money, config.start_reputation),
            difficulty: DifficultyController::new(&config.difficulty, distribution),
            disruptions: DisruptionScheduler::new(),
            modifiers: Modifiers::default(),
            status: RunStatus::Running,
            pending: Vec::new(),
            config,
        }
    }

    // ─── Tick ────────────────────────────────────────────────────────────

    /// Host entry point: clamp and scale a wall-clock delta, then tick.
    pub fn frame(&mut self, wall_dt: f64) -> TickReport {
        let dt = self.clock.scaled_dt(wall_dt);
        self.tick(dt)
    }

    /// Advance by `dt` simulated seconds and report the resulting state.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        let events = self.step(dt);
        self.report(events)
    }

    /// Advance by `dt` simulated seconds, returning only the events raised.
    /// A finished run or a zero delta mutates nothing.
    pub fn step(&mut self, dt: f64) -> Vec<SimEvent> {
        let mut events = std::mem::take(&mut self.pending);
        if self.status == RunStatus::GameOver || !dt.is_finite() || dt <= 0.0 {
            return events;
        }
        // Commands settle requests between ticks and may already have ruined the run.
        if self.end_if_ruined(&mut events) {
            return events;
        }

        self.clock.advance(dt);
        let now = self.clock.elapsed();

        self.disruptions.update(
            dt,
            now,
            &self.config.disruptions,
            &mut self.topology,
            &mut self.rng,
            &mut events,
        );
        self.refresh_modifiers();
        self.difficulty.update(
            dt,
            now,
            &self.config.difficulty,
            self.modifiers.spawn_multiplier,
            &mut self.rng,
            &mut events,
        );

        self.process_nodes(dt, now, &mut events);
        self.advance_requests(dt, now, &mut events);

        let due = self.generator.due(dt, self.difficulty.current_rps(), self.config.rules.max_spawns_per_tick);
        for _ in 0..due {
            let traffic = self.difficulty.distribution().sample(&mut self.rng);
            self.spawn(traffic, now, &mut events);
        }

        self.end_if_ruined(&mut events);
        events
    }

    /// Clamp reputation and end a survival run that has run out of reputation
    /// or money. Returns whether the run is over.
    fn end_if_ruined(&mut self, events: &mut Vec<SimEvent>) -> bool {
        self.ledger.clamp_reputation(self.config.rules.max_reputation);
        if !self.config.rules.game_over_enabled || !self.ledger.is_ruined(self.config.rules.game_over_money) {
            return false;
        }
        self.status = RunStatus::GameOver;
        let (score, elapsed) = (self.ledger.score().total, self.clock.elapsed());
        tracing::info!(score, elapsed, reputation = self.ledger.reputation(), "game over");
        events.push(SimEvent::GameOver { score, elapsed });
        true
    }

    pub(crate) fn refresh_modifiers(&mut self) {
        let base = Modifiers {
            upkeep_multiplier: upkeep_scale(self.clock.elapsed(), &self.config.difficulty),
            ..Modifiers::default()
        };
        self.modifiers = self.disruptions.modifiers(&self.config.disruptions, base);
    }

    /// Upkeep, repair, admission, progress and wear for every node, ascending id.
    fn process_nodes(&mut self, dt: f64, now: f64, events: &mut Vec<SimEvent>) {
        let rules = &self.config.rules;
        let (upkeep_enabled, cache_hit_rate, grace) = (rules.upkeep_enabled, rules.cache_hit_rate, rules.terminal_grace);
        let wear = self.config.degradation.clone();

        for id in self.topology.ids() {
            let Some(node) = self.topology.get(id) else { continue };
            let kind = node.kind;
            let Some(spec) = self.config.nodes.spec_for(kind) else { continue };
            let capacity = node.effective_capacity(spec, self.modifiers.capacity_factor);
            let processing_ms = node.effective_processing_ms(spec);
            let upkeep = ServiceNode::upkeep_per_second(spec) * dt * self.modifiers.upkeep_multiplier;
            let repair_cost = spec.cost * wear.repair_cost_fraction;
            let disabled = node.is_disabled(now);

            if upkeep_enabled {
                self.ledger.debit_upkeep(kind, upkeep);
            }
            if let Some(node) = self.topology.get_mut(id) {
                if node.repair_step(dt, wear.repair_rate) {
                    tracing::debug!(node = %id, "repair finished");
                    events.push(SimEvent::RepairFinished { node: id });
                }
            }
            if disabled {
                continue;
            }

            // Admission
            while let Some(request_id) = self.topology.get_mut(id).and_then(|n| n.next_admission(capacity)) {
                let Some(traffic) = self.requests.get(&request_id).map(|r| r.traffic) else { continue };
                if routing::absorbs(kind, traffic) {
                    self.settle(request_id, Some(id), Outcome::MaliciousBlocked, now, grace, events);
                    continue;
                }
                if let Some(node) = self.topology.get_mut(id) {
                    node.occupy(request_id);
                }
                if let Some(request) = self.requests.get_mut(&request_id) {
                    request.start_processing();
                }
            }

            // Progress and resolution
            let finished = self
                .topology
                .get_mut(id)
                .map(|n| n.progress(dt, processing_ms))
                .unwrap_or_default();
            for request_id in finished {
                let Some(traffic) = self.requests.get(&request_id).map(|r| r.traffic) else { continue };
                let resolution = routing::resolve(
                    &self.topology,
                    id,
                    traffic,
                    &self.config.traffic,
                    cache_hit_rate,
                    &mut self.rng,
                );
                match resolution {
                    Resolution::Forward(next) => self.forward(request_id, id, next),
                    Resolution::Complete { cached } => {
                        self.settle(request_id, Some(id), Outcome::Completed { cached }, now, grace, events)
                    }
                    Resolution::Block => self.settle(request_id, Some(id), Outcome::MaliciousBlocked, now, grace, events),
                    Resolution::Fail(reason) => {
                        self.settle(request_id, Some(id), Outcome::failure(traffic, reason), now, grace, events)
                    }
                }
                if wear.enabled {
                    self.wear_node(id, capacity, &wear, repair_cost, events);
                }
            }
        }
    }

    fn wear_node(
        &mut self,
        id: NodeId,
        capacity: usize,
        wear: &crate::catalog::DegradationParams,
        repair_cost: f64,
        events: &mut Vec<SimEvent>,
    ) {
        let Some(node) = self.topology.get_mut(id) else { return };
        let chance = node.wear_chance(capacity);
        if chance > 0.0 && self.rng.gen::<f64>() < chance {
            node.damage(wear.damage_per_hit);
            events.push(SimEvent::NodeDegraded { node: id, health: node.health });
        }
        if wear.auto_repair && !node.repairing && node.needs_repair(wear.critical_health) {
            if self.ledger.charge(repair_cost, Expense::Repair).is_ok() {
                node.repairing = true;
                tracing::debug!(node = %id, health = node.health, "auto repair started");
                events.push(SimEvent::RepairStarted { node: id });
            }
        }
    }

    fn forward(&mut self, request_id: RequestId, from: NodeId, to: NodeId) {
        let (Some(from_pos), Some(to_pos)) = (self.topology.position_of(from), self.topology.position_of(to)) else {
            return;
        };
        if let Some(request) = self.requests.get_mut(&request_id) {
            request.depart(from_pos, to, to_pos);
        }
    }

    /// Move in-flight requests, admit the ones that arrived, sweep expired ones.
    fn advance_requests(&mut self, dt: f64, now: f64, events: &mut Vec<SimEvent>) {
        let speed = self.config.rules.transit_speed;
        let grace = self.config.rules.terminal_grace;
        let queue_limit = self.config.rules.queue_limit;

        let arrived: Vec<RequestId> = self
            .requests
            .values_mut()
            .filter_map(|r| r.advance(dt, speed).then_some(r.id))
            .collect();

        for request_id in arrived {
            let Some((traffic, target)) = self.requests.get(&request_id).map(|r| (r.traffic, r.target)) else {
                continue;
            };
            let Some(target) = target else {
                self.settle(request_id, None, Outcome::failure(traffic, FailureReason::NodeRemoved), now, grace, events);
                continue;
            };
            match routing::arrive(&self.topology, target, traffic, queue_limit) {
                Arrival::Enqueue => {
                    if let Some(node) = self.topology.get_mut(target) {
                        node.enqueue(request_id);
                    }
                    if let Some(request) = self.requests.get_mut(&request_id) {
                        request.arrive_queued();
                    }
                }
                Arrival::Block => self.settle(request_id, Some(target), Outcome::MaliciousBlocked, now, grace, events),
                Arrival::Fail(reason) => {
                    self.settle(request_id, Some(target), Outcome::failure(traffic, reason), now, grace, events)
                }
            }
        }

        self.requests.retain(|_, r| !r.is_expired(now));
    }

    fn spawn(&mut self, traffic: TrafficType, now: f64, events: &mut Vec<SimEvent>) -> RequestId {
        let id = self.generator.next_request_id();
        self.generator.record_spawn(traffic);
        let entry = self.topology.entry().position;
        let mut request = Request::new(id, traffic, entry, now);

        match routing::select_entry(&self.topology, traffic, &mut self.rng) {
            Ok(first) => {
                let at = self.topology.position_of(first).unwrap_or(entry);
                request.depart(entry, first, at);
                self.requests.insert(id, request);
            }
            Err(reason) => {
                self.requests.insert(id, request);
                let grace = self.config.rules.terminal_grace;
                self.settle(id, None, Outcome::failure(traffic, reason), now, grace, events);
            }
        }
        id
    }

    /// Terminal transition: mark the request, post the outcome to the ledger
    /// and raise the event.
    fn settle(
        &mut self,
        request_id: RequestId,
        node: Option<NodeId>,
        outcome: Outcome,
        now: f64,
        grace: f64,
        events: &mut Vec<SimEvent>,
    ) {
        let Some(request) = self.requests.get_mut(&request_id) else { return };
        match outcome {
            Outcome::Completed { cached } => request.complete(cached, now, grace),
            Outcome::MaliciousBlocked => request.complete(false, now, grace),
            Outcome::Failed { reason } | Outcome::MaliciousPassed { reason } => request.fail(reason, now, grace),
        }
        let traffic = request.traffic;
        self.ledger.apply(traffic, outcome, self.config.traffic.spec_for(traffic), &self.config.scoring);
        events.push(SimEvent::RequestResolved { request: request_id, traffic, node, outcome });
    }

    // ─── Commands ────────────────────────────────────────────────────────

    fn ensure_running(&self) -> Result<(), Rejected> {
        match self.status {
            RunStatus::Running => Ok(()),
            RunStatus::GameOver => Err(Rejected::GameOver),
        }
    }

    fn ensure_sandbox(&self) -> Result<(), Rejected> {
        match self.config.mode {
            GameMode::Sandbox => Ok(()),
            GameMode::Survival => Err(Rejected::SandboxOnly),
        }
    }

    pub fn place_node(&mut self, kind: NodeKind, position: GridPos) -> Result<NodeId, Rejected> {
        let placed = self.try_place_node(kind, position);
        log_rejection("place_node", &placed);
        placed
    }

    fn try_place_node(&mut self, kind: NodeKind, position: GridPos) -> Result<NodeId, Rejected> {
        self.ensure_running()?;
        let cost = self.config.nodes.spec_for(kind).ok_or(Rejected::EntryImmutable)?.cost;
        if !self.ledger.can_afford(cost) {
            return Err(Rejected::InsufficientFunds {
                needed: cost,
                available: crate::adapter::to_display(self.ledger.money()),
            });
        }
        let id = self.topology.add_node(kind, position)?;
        self.ledger.charge(cost, Expense::Purchase)?;
        tracing::debug!(node = %id, ?kind, x = position.x, z = position.z, "node placed");
        Ok(id)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), Rejected> {
        let result = self.ensure_running().and_then(|_| self.topology.add_connection(from, to));
        log_rejection("connect", &result);
        result
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<(), Rejected> {
        let result = self.ensure_running().and_then(|_| self.topology.remove_connection(from, to));
        log_rejection("disconnect", &result);
        result
    }

    /// Delete a node, fail whatever it held and refund half its price.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), Rejected> {
        let result = self.try_remove_node(id);
        log_rejection("remove_node", &result);
        result
    }

    fn try_remove_node(&mut self, id: NodeId) -> Result<(), Rejected> {
        self.ensure_running()?;
        let mut node = self.topology.remove_node(id)?;
        let now = self.clock.elapsed();
        let grace = self.config.rules.terminal_grace;
        let mut events = std::mem::take(&mut self.pending);
        for request_id in node.drain() {
            let Some(traffic) = self.requests.get(&request_id).map(|r| r.traffic) else { continue };
            let outcome = Outcome::failure(traffic, FailureReason::NodeRemoved);
            self.settle(request_id, Some(id), outcome, now, grace, &mut events);
        }
        self.pending = events;
        if let Some(spec) = self.config.nodes.spec_for(node.kind) {
            self.ledger.refund(half_refund(spec.cost));
        }
        tracing::debug!(node = %id, kind = ?node.kind, "node removed");
        Ok(())
    }

    /// Buy the next tier. Returns the new tier index.
    pub fn upgrade_node(&mut self, id: NodeId) -> Result<usize, Rejected> {
        let result = self.try_upgrade_node(id);
        log_rejection("upgrade_node", &result);
        result
    }

    fn try_upgrade_node(&mut self, id: NodeId) -> Result<usize, Rejected> {
        self.ensure_running()?;
        if id.is_entry() {
            return Err(Rejected::EntryImmutable);
        }
        let node = self.topology.get(id).ok_or(Rejected::UnknownNode(id))?;
        let spec = self.config.nodes.spec_for(node.kind).ok_or(Rejected::EntryImmutable)?;
        let cost = spec.next_upgrade(node.tier).ok_or(Rejected::MaxTier(id))?.upgrade_cost;
        self.ledger.charge(cost, Expense::Upgrade)?;
        let node = self.topology.get_mut(id).ok_or(Rejected::UnknownNode(id))?;
        node.tier += 1;
        tracing::debug!(node = %id, tier = node.tier, cost, "node upgraded");
        Ok(node.tier)
    }

    pub fn repair_node(&mut self, id: NodeId) -> Result<(), Rejected> {
        let result = self.try_repair_node(id);
        log_rejection("repair_node", &result);
        result
    }

    fn try_repair_node(&mut self, id: NodeId) -> Result<(), Rejected> {
        self.ensure_running()?;
        if id.is_entry() {
            return Err(Rejected::EntryImmutable);
        }
        let node = self.topology.get(id).ok_or(Rejected::UnknownNode(id))?;
        if node.repairing {
            return Err(Rejected::AlreadyRepairing(id));
        }
        if !node.needs_repair(self.config.degradation.critical_health) {
            return Err(Rejected::NotDamaged(id));
        }
        let spec = self.config.nodes.spec_for(node.kind).ok_or(Rejected::EntryImmutable)?;
        let cost = spec.cost * self.config.degradation.repair_cost_fraction;
        self.ledger.charge(cost, Expense::Repair)?;
        if let Some(node) = self.topology.get_mut(id) {
            node.repairing = true;
        }
        self.pending.push(SimEvent::RepairStarted { node: id });
        Ok(())
    }

    /// Replace the player's traffic mix. Weights are normalized.
    pub fn set_traffic_mix(&mut self, weights: &BTreeMap<TrafficType, f64>) -> Result<(), Rejected> {
        let result = self.ensure_running().and_then(|_| {
            let mix = TrafficDistribution::from_weights(weights).ok_or(Rejected::InvalidMix)?;
            self.difficulty.set_distribution(mix);
            Ok(())
        });
        log_rejection("set_traffic_mix", &result);
        result
    }

    pub fn set_spawn_rate(&mut self, rps: f64) -> Result<(), Rejected> {
        let result = self.ensure_running().and_then(|_| self.ensure_sandbox()).and_then(|_| {
            if !rps.is_finite() || rps < 0.0 {
                return Err(Rejected::InvalidRate(rps));
            }
            self.config.difficulty.base_rps = rps;
            self.difficulty.set_rate(rps);
            Ok(())
        });
        log_rejection("set_spawn_rate", &result);
        result
    }

    /// Spawn `count` requests right now from the current mix.
    pub fn burst(&mut self, count: u32) -> Result<Vec<RequestId>, Rejected> {
        let result = self.ensure_running().and_then(|_| self.ensure_sandbox());
        log_rejection("burst", &result);
        result?;
        let count = count.min(self.config.rules.max_spawns_per_tick);
        let now = self.clock.elapsed();
        let mut events = std::mem::take(&mut self.pending);
        let ids = (0..count)
            .map(|_| {
                let traffic = self.difficulty.distribution().sample(&mut self.rng);
                self.spawn(traffic, now, &mut events)
            })
            .collect();
        self.pending = events;
        Ok(ids)
    }

    /// Inject a single request of a chosen type at the entry.
    pub fn spawn_request(&mut self, traffic: TrafficType) -> Result<RequestId, Rejected> {
        self.ensure_running()?;
        let now = self.clock.elapsed();
        let mut events = std::mem::take(&mut self.pending);
        let id = self.spawn(traffic, now, &mut events);
        self.pending = events;
        Ok(id)
    }

    /// Start a disruption immediately. Returns whether it started.
    pub fn trigger_disruption(&mut self, kind: DisruptionKind) -> Result<bool, Rejected> {
        self.ensure_running()?;
        let now = self.clock.elapsed();
        let mut events = std::mem::take(&mut self.pending);
        let started =
            self.disruptions.start(kind, now, &self.config.disruptions, &mut self.topology, &mut self.rng, &mut events);
        self.pending = events;
        self.refresh_modifiers();
        Ok(started)
    }

    pub fn set_time_scale(&mut self, scale: TimeScale) {
        self.clock.set_scale(scale);
    }

    /// Back to the starting state with the original seed and configuration.
    pub fn reset(&mut self) {
        let scale = self.clock.scale();
        *self = Self::build(self.initial.clone(), self.seed);
        self.clock.set_scale(scale);
        tracing::debug!(seed = self.seed, "simulation reset");
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn time_scale(&self) -> TimeScale {
        self.clock.scale()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn difficulty(&self) -> &DifficultyController {
        &self.difficulty
    }

    pub fn disruptions(&self) -> &DisruptionScheduler {
        &self.disruptions
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn generator(&self) -> &TrafficGenerator {
        &self.generator
    }

    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.requests.get(&id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.values()
    }

    /// Current effective capacity of a node, disruption included.
    pub fn node_capacity(&self, id: NodeId) -> Option<usize> {
        let node = self.topology.get(id)?;
        let spec = self.config.nodes.spec_for(node.kind)?;
        Some(node.effective_capacity(spec, self.modifiers.capacity_factor))
    }

    pub fn upkeep_per_second(&self) -> f64 {
        if !self.config.rules.upkeep_enabled {
            return 0.0;
        }
        let base: f64 = self
            .topology
            .nodes()
            .filter_map(|n| self.config.nodes.spec_for(n.kind))
            .map(ServiceNode::upkeep_per_second)
            .sum();
        base * self.modifiers.upkeep_multiplier
    }

    // ─── Snapshot ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TickReport {
        self.report(Vec::new())
    }

    fn report(&self, events: Vec<SimEvent>) -> TickReport {
        let now = self.clock.elapsed();
        let factor = self.modifiers.capacity_factor;
        let nodes = self
            .topology
            .nodes()
            .filter_map(|n| self.config.nodes.spec_for(n.kind).map(|spec| n.view(spec, factor, now)))
            .collect();

        TickReport {
            status: self.status,
            mode: self.config.mode,
            economy: self.ledger.view(self.upkeep_per_second()),
            difficulty: DifficultyView {
                elapsed: now,
                current_rps: self.difficulty.current_rps(),
                target_rps: self.difficulty.target_rps(),
                distribution: self.difficulty.distribution().entries(),
                milestone_index: self.difficulty.milestone_index(),
                spike_active: self.difficulty.spike().active,
                shift_active: self.difficulty.shift().active,
                active_event: self.disruptions.active().cloned(),
                upkeep_multiplier: self.modifiers.upkeep_multiplier,
                capacity_factor: self.modifiers.capacity_factor,
                spawn_multiplier: self.modifiers.spawn_multiplier,
            },
            nodes,
            entry_position: self.topology.entry().position,
            connections: self.topology.connections(),
            requests: self.requests.values().map(Request::view).collect(),
            events,
        }
    }
}

fn log_rejection<T>(command: &str, result: &Result<T, Rejected>) {
    if let Err(reason) = result {
        tracing::debug!(command, %reason, "command rejected");
    }
}
