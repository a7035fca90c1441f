// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Difficulty Controller
//
// Spawn-rate ramp with milestone steps, periodic traffic-mix shifts and the
// malicious spike cycle. Effects leave this module only as a rate, a mix and
// the `Modifiers` multipliers, so each one can be reverted on its own.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::DifficultyParams;
use crate::traffic::TrafficDistribution;
use crate::types::{SimEvent, TrafficType};

// ─── Modifiers ───────────────────────────────────────────────────────────────

/// Multipliers consumed by upkeep, node capacity and the spawn rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modifiers {
    pub upkeep_multiplier: f64,
    pub capacity_factor: f64,
    pub spawn_multiplier: f64,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self { upkeep_multiplier: 1.0, capacity_factor: 1.0, spawn_multiplier: 1.0 }
    }
}

/// Upkeep grows with elapsed time until the ramp ceiling.
pub fn upkeep_scale(elapsed: f64, params: &DifficultyParams) -> f64 {
    if !params.enabled || params.upkeep_ramp_seconds <= 0.0 {
        return 1.0;
    }
    1.0 + (elapsed / params.upkeep_ramp_seconds).min(1.0) * params.upkeep_growth
}

// ─── Cycle State ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpikeState {
    pub timer: f64,
    pub active: bool,
    pub warned: bool,
    pub ends_at: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftState {
    pub timer: f64,
    pub active: bool,
    pub ends_at: f64,
    pub label: Option<String>,
}

// ─── Controller ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyController {
    current_rps: f64,
    target_rps: f64,
    distribution: TrafficDistribution,
    /// The player's mix while a shift or spike overrides it.
    saved_distribution: Option<TrafficDistribution>,
    milestone_index: usize,
    spike: SpikeState,
    shift: ShiftState,
}

impl DifficultyController {
    pub fn new(params: &DifficultyParams, distribution: TrafficDistribution) -> Self {
        Self {
            current_rps: params.base_rps,
            target_rps: params.base_rps,
            distribution,
            saved_distribution: None,
            milestone_index: 0,
            spike: SpikeState::default(),
            shift: ShiftState::default(),
        }
    }

    pub fn current_rps(&self) -> f64 {
        self.current_rps
    }

    pub fn target_rps(&self) -> f64 {
        self.target_rps
    }

    pub fn distribution(&self) -> &TrafficDistribution {
        &self.distribution
    }

    /// The mix the player configured, ignoring any temporary override.
    pub fn base_distribution(&self) -> &TrafficDistribution {
        self.saved_distribution.as_ref().unwrap_or(&self.distribution)
    }

    pub fn milestone_index(&self) -> usize {
        self.milestone_index
    }

    pub fn spike(&self) -> &SpikeState {
        &self.spike
    }

    pub fn shift(&self) -> &ShiftState {
        &self.shift
    }

    /// Replace the player's mix. While an override is running the new mix
    /// is what gets restored when it ends.
    pub fn set_distribution(&mut self, distribution: TrafficDistribution) {
        match self.saved_distribution.as_mut() {
            Some(saved) => *saved = distribution,
            None => self.distribution = distribution,
        }
    }

    /// Sandbox rate change; takes effect without smoothing.
    pub fn set_rate(&mut self, rps: f64) {
        self.current_rps = rps;
        self.target_rps = rps;
    }

    pub(crate) fn restore(&mut self, current_rps: f64, milestone_index: usize) {
        self.current_rps = current_rps;
        self.target_rps = current_rps;
        self.milestone_index = milestone_index;
    }

    /// Milestone multiplier for everything crossed so far.
    pub fn milestone_multiplier(&self, params: &DifficultyParams) -> f64 {
        self.milestone_index
            .checked_sub(1)
            .and_then(|i| params.milestones.get(i))
            .map_or(1.0, |m| m.multiplier)
    }

    /// Unsmoothed spawn rate at `elapsed` seconds.
    pub fn ramp_target(&self, elapsed: f64, params: &DifficultyParams, spawn_multiplier: f64) -> f64 {
        let t = elapsed.max(0.0);
        let base = params.base_rps
            + (1.0 + t / 20.0).ln() * params.log_coefficient
            + t * params.linear_coefficient;
        (base * self.milestone_multiplier(params) * spawn_multiplier).min(params.max_rps)
    }

    // ─── Tick ────────────────────────────────────────────────────────────

    pub fn update<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        elapsed: f64,
        params: &DifficultyParams,
        spawn_multiplier: f64,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) {
        if !params.enabled {
            self.target_rps = params.base_rps * spawn_multiplier;
            self.current_rps = self.target_rps;
            return;
        }

        self.cross_milestones(elapsed, params, events);

        self.target_rps = self.ramp_target(elapsed, params, spawn_multiplier);
        self.current_rps += (self.target_rps - self.current_rps) * params.smoothing;
        self.current_rps = self.current_rps.clamp(0.0, params.max_rps);

        self.update_shift(dt, elapsed, params, rng, events);
        self.update_spike(dt, elapsed, params, events);
    }

    fn cross_milestones(&mut self, elapsed: f64, params: &DifficultyParams, events: &mut Vec<SimEvent>) {
        while let Some(milestone) = params.milestones.get(self.milestone_index) {
            if elapsed < milestone.at_seconds {
                break;
            }
            tracing::info!(index = self.milestone_index, label = %milestone.label, "milestone reached");
            events.push(SimEvent::MilestoneReached {
                index: self.milestone_index,
                label: milestone.label.clone(),
            });
            self.milestone_index += 1;
        }
    }

    fn update_shift<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        elapsed: f64,
        params: &DifficultyParams,
        rng: &mut R,
        events: &mut Vec<SimEvent>,
    ) {
        // The cycle clock keeps running while a shift is active.
        self.shift.timer += dt;
        if self.shift.active && elapsed >= self.shift.ends_at {
            self.restore_distribution();
            self.shift.active = false;
            self.shift.label = None;
            tracing::debug!("traffic shift ended");
            events.push(SimEvent::ShiftEnded);
        }

        // A due shift waits for the current override to finish.
        if self.shift.active
            || self.spike.active
            || self.shift.timer < params.shift_interval
            || params.shift_profiles.is_empty()
        {
            return;
        }
        self.shift.timer = 0.0;

        let profile = &params.shift_profiles[rng.gen_range(0..params.shift_profiles.len())];
        let Some(mix) = TrafficDistribution::from_weights(&profile.weights) else {
            tracing::debug!(label = %profile.label, "skipping shift with unusable weights");
            return;
        };
        self.override_distribution(mix);
        self.shift.active = true;
        self.shift.ends_at = elapsed + params.shift_duration;
        self.shift.label = Some(profile.label.clone());
        tracing::info!(label = %profile.label, until = self.shift.ends_at, "traffic shift started");
        events.push(SimEvent::ShiftStarted { label: profile.label.clone() });
    }

    fn update_spike(&mut self, dt: f64, elapsed: f64, params: &DifficultyParams, events: &mut Vec<SimEvent>) {
        self.spike.timer += dt;
        if self.spike.active && elapsed >= self.spike.ends_at {
            self.restore_distribution();
            self.spike.active = false;
            tracing::debug!("malicious spike ended");
            events.push(SimEvent::SpikeEnded);
        }
        if self.spike.active {
            return;
        }

        let warn_at = (params.spike_interval - params.spike_warning_lead).max(0.0);
        if !self.spike.warned && self.spike.timer >= warn_at && self.spike.timer < params.spike_interval {
            self.spike.warned = true;
            events.push(SimEvent::SpikeWarning { starts_in: params.spike_interval - self.spike.timer });
        }
        if self.spike.timer < params.spike_interval {
            return;
        }

        self.spike.timer = 0.0;
        self.spike.warned = false;
        if self.shift.active {
            tracing::debug!("malicious spike suppressed by active shift");
            return;
        }
        let spiked = self.distribution.with_pinned(TrafficType::Malicious, params.spike_weight);
        self.override_distribution(spiked);
        self.spike.active = true;
        self.spike.ends_at = elapsed + params.spike_duration;
        tracing::info!(until = self.spike.ends_at, "malicious spike started");
        events.push(SimEvent::SpikeStarted);
    }

    fn override_distribution(&mut self, mix: TrafficDistribution) {
        let previous = std::mem::replace(&mut self.distribution, mix);
        if self.saved_distribution.is_none() {
            self.saved_distribution = Some(previous);
        }
    }

    fn restore_distribution(&mut self) {
        if let Some(saved) = self.saved_distribution.take() {
            self.distribution = saved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SimConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn controller(params: &DifficultyParams) -> DifficultyController {
        let config = SimConfig::survival();
        let mix = TrafficDistribution::from_weights(&config.distribution).unwrap();
        DifficultyController::new(params, mix)
    }

    /// Drive the controller at a fixed step, returning every event fired.
    fn run(c: &mut DifficultyController, params: &DifficultyParams, seconds: f64, dt: f64) -> Vec<SimEvent> {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut events = Vec::new();
        let steps = (seconds / dt).round() as usize;
        for i in 1..=steps {
            c.update(dt, i as f64 * dt, params, 1.0, &mut rng, &mut events);
            assert!((c.distribution().total() - 1.0).abs() < 1e-9);
        }
        events
    }

    #[test]
    fn ramp_grows_and_is_capped() {
        let params = DifficultyParams::default();
        let c = controller(&params);
        let early = c.ramp_target(0.0, &params, 1.0);
        let later = c.ramp_target(300.0, &params, 1.0);
        assert_eq!(early, params.base_rps);
        assert!(later > early);
        assert_eq!(c.ramp_target(1e9, &params, 1.0), params.max_rps);
    }

    #[test]
    fn milestones_fire_once_in_order() {
        let mut params = DifficultyParams::default();
        params.shift_interval = 1e9;
        params.spike_interval = 1e9;
        let mut c = controller(&params);
        let events = run(&mut c, &params, 200.0, 0.1);
        let reached: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SimEvent::MilestoneReached { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(reached, vec![0, 1]);
        assert_eq!(c.milestone_index(), 2);
        assert_eq!(c.milestone_multiplier(&params), 1.25);
    }

    #[test]
    fn smoothing_approaches_target() {
        let mut params = DifficultyParams::default();
        params.shift_interval = 1e9;
        params.spike_interval = 1e9;
        let mut c = controller(&params);
        run(&mut c, &params, 30.0, 0.1);
        assert!(c.current_rps() > params.base_rps);
        assert!(c.current_rps() <= c.target_rps());
    }

    #[test]
    fn spike_warns_then_raises_malicious_then_restores() {
        let mut params = DifficultyParams::default();
        params.shift_interval = 1e9;
        let mut c = controller(&params);
        let before = c.distribution().clone();

        let events = run(&mut c, &params, 115.0, 0.5);
        assert!(events.iter().any(|e| matches!(e, SimEvent::SpikeWarning { .. })));
        assert!(!c.spike().active);

        let events = run_from(&mut c, &params, 115.0, 121.0, 0.5);
        assert!(events.contains(&SimEvent::SpikeStarted));
        assert!((c.distribution().weight(TrafficType::Malicious) - params.spike_weight).abs() < 1e-9);

        let events = run_from(&mut c, &params, 121.0, 140.0, 0.5);
        assert!(events.contains(&SimEvent::SpikeEnded));
        assert_eq!(c.distribution(), &before);
    }

    fn run_from(
        c: &mut DifficultyController,
        params: &DifficultyParams,
        from: f64,
        to: f64,
        dt: f64,
    ) -> Vec<SimEvent> {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut events = Vec::new();
        let mut t = from;
        while t < to {
            t += dt;
            c.update(dt, t, params, 1.0, &mut rng, &mut events);
        }
        events
    }

    #[test]
    fn shift_restores_player_mix() {
        let mut params = DifficultyParams::default();
        params.spike_interval = 1e9;
        let mut c = controller(&params);
        let before = c.distribution().clone();
        let events = run(&mut c, &params, 80.0, 0.5);
        assert!(events.iter().any(|e| matches!(e, SimEvent::ShiftStarted { .. })));
        assert!(c.shift().active);
        assert_ne!(c.distribution(), &before);

        let events = run_from(&mut c, &params, 80.0, 100.0, 0.5);
        assert!(events.contains(&SimEvent::ShiftEnded));
        assert_eq!(c.distribution(), &before);
    }

    #[test]
    fn mix_change_during_override_lands_in_saved() {
        let mut params = DifficultyParams::default();
        params.spike_interval = 1e9;
        let mut c = controller(&params);
        run(&mut c, &params, 80.0, 0.5);
        assert!(c.shift().active);

        let player = TrafficDistribution::from_weights(
            &[(TrafficType::Read, 1.0), (TrafficType::Write, 1.0)].into_iter().collect(),
        )
        .unwrap();
        c.set_distribution(player.clone());
        assert_eq!(c.base_distribution(), &player);
        run_from(&mut c, &params, 80.0, 100.0, 0.5);
        assert_eq!(c.distribution(), &player);
    }

    fn count(events: &[SimEvent], wanted: &SimEvent) -> usize {
        events.iter().filter(|e| *e == wanted).count()
    }

    #[test]
    fn spike_cycle_length_is_the_interval() {
        let mut params = DifficultyParams::default();
        params.shift_interval = 1e9;
        let mut c = controller(&params);
        // Spikes at 120 s and 240 s; the 15 s override does not push the second one back.
        let events = run(&mut c, &params, 245.0, 0.5);
        assert_eq!(count(&events, &SimEvent::SpikeStarted), 2);
        assert_eq!(count(&events, &SimEvent::SpikeEnded), 1);
        assert!(c.spike().active);
    }

    #[test]
    fn shift_cycle_length_is_the_interval() {
        let mut params = DifficultyParams::default();
        params.spike_interval = 1e9;
        let mut c = controller(&params);
        let events = run(&mut c, &params, 155.0, 0.5);
        let started = events.iter().filter(|e| matches!(e, SimEvent::ShiftStarted { .. })).count();
        assert_eq!(started, 2);
        assert_eq!(count(&events, &SimEvent::ShiftEnded), 1);
    }

    #[test]
    fn spike_is_suppressed_during_shift() {
        let mut params = DifficultyParams::default();
        params.shift_interval = 10.0;
        params.shift_duration = 50.0;
        params.spike_interval = 30.0;
        params.spike_warning_lead = 5.0;
        let mut c = controller(&params);
        let events = run(&mut c, &params, 45.0, 0.5);
        assert!(c.shift().active);
        assert!(!events.contains(&SimEvent::SpikeStarted));
        assert!(!c.spike().active);
    }

    #[test]
    fn disabled_controller_holds_configured_rate() {
        let mut params = DifficultyParams::default();
        params.enabled = false;
        params.base_rps = 4.0;
        let mut c = controller(&params);
        let events = run(&mut c, &params, 400.0, 1.0);
        assert!(events.is_empty());
        assert_eq!(c.current_rps(), 4.0);
        assert_eq!(upkeep_scale(400.0, &params), 1.0);
    }

    #[test]
    fn upkeep_scale_saturates() {
        let params = DifficultyParams::default();
        assert_eq!(upkeep_scale(0.0, &params), 1.0);
        assert!((upkeep_scale(600.0, &params) - 1.5).abs() < 1e-12);
        assert_eq!(upkeep_scale(5000.0, &params), 2.0);
    }
}
