// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Config Catalog
//
// Static tables for node kinds, traffic types, scoring, difficulty and
// disruption tuning. Everything here is plain data; behavior lives in the
// modules that consume it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{GameMode, GridPos, NodeKind, TrafficType};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{kind:?} must have at least one tier")]
    NoTiers { kind: NodeKind },
    #[error("{kind:?} tier {tier} capacity must exceed the previous tier")]
    TierOrder { kind: NodeKind, tier: usize },
    #[error("{kind:?} processing time must be positive")]
    ProcessingTime { kind: NodeKind },
    #[error("traffic distribution must have a positive total and no negative weights")]
    Distribution,
    #[error("{field} must lie in {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ─── Node Catalog ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub capacity: u32,
    pub upgrade_cost: f64,
}

/// Purchase and runtime parameters for one placeable node kind.
///
/// `tiers[0]` is the base configuration; its `upgrade_cost` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub cost: f64,
    pub processing_ms: f64,
    pub upkeep_per_minute: f64,
    pub tiers: Vec<TierSpec>,
}

impl NodeSpec {
    fn new(cost: f64, processing_ms: f64, upkeep_per_minute: f64, tiers: &[(u32, f64)]) -> Self {
        Self {
            cost,
            processing_ms,
            upkeep_per_minute,
            tiers: tiers
                .iter()
                .map(|&(capacity, upgrade_cost)| TierSpec { capacity, upgrade_cost })
                .collect(),
        }
    }

    pub fn base_capacity(&self) -> u32 {
        self.tiers.first().map_or(1, |t| t.capacity)
    }

    /// Capacity at `tier`, saturating at the top tier.
    pub fn capacity_at(&self, tier: usize) -> u32 {
        self.tiers
            .get(tier)
            .or_else(|| self.tiers.last())
            .map_or(1, |t| t.capacity)
    }

    /// Cost of moving from `tier` to `tier + 1`, or `None` at max tier.
    pub fn next_upgrade(&self, tier: usize) -> Option<&TierSpec> {
        self.tiers.get(tier + 1)
    }

    pub fn max_tier(&self) -> usize {
        self.tiers.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCatalog {
    pub firewall: NodeSpec,
    pub load_balancer: NodeSpec,
    pub queue_buffer: NodeSpec,
    pub compute: NodeSpec,
    pub cache: NodeSpec,
    pub database: NodeSpec,
    pub object_store: NodeSpec,
    pub cdn: NodeSpec,
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self {
            firewall: NodeSpec::new(50.0, 20.0, 5.0, &[(40, 0.0), (80, 150.0)]),
            load_balancer: NodeSpec::new(50.0, 50.0, 8.0, &[(50, 0.0), (100, 150.0)]),
            queue_buffer: NodeSpec::new(40.0, 150.0, 4.0, &[(10, 0.0)]),
            compute: NodeSpec::new(100.0, 600.0, 15.0, &[(5, 0.0), (15, 200.0), (25, 250.0)]),
            cache: NodeSpec::new(75.0, 40.0, 10.0, &[(30, 0.0), (60, 200.0)]),
            database: NodeSpec::new(200.0, 300.0, 30.0, &[(10, 0.0), (30, 400.0), (50, 600.0)]),
            object_store: NodeSpec::new(25.0, 200.0, 5.0, &[(100, 0.0)]),
            cdn: NodeSpec::new(60.0, 60.0, 12.0, &[(60, 0.0), (120, 250.0)]),
        }
    }
}

impl NodeCatalog {
    /// Spec for a placeable kind. The entry node has none.
    pub fn spec_for(&self, kind: NodeKind) -> Option<&NodeSpec> {
        match kind {
            NodeKind::Entry => None,
            NodeKind::Firewall => Some(&self.firewall),
            NodeKind::LoadBalancer => Some(&self.load_balancer),
            NodeKind::QueueBuffer => Some(&self.queue_buffer),
            NodeKind::Compute => Some(&self.compute),
            NodeKind::Cache => Some(&self.cache),
            NodeKind::Database => Some(&self.database),
            NodeKind::ObjectStore => Some(&self.object_store),
            NodeKind::Cdn => Some(&self.cdn),
        }
    }

    pub fn spec_for_mut(&mut self, kind: NodeKind) -> Option<&mut NodeSpec> {
        match kind {
            NodeKind::Entry => None,
            NodeKind::Firewall => Some(&mut self.firewall),
            NodeKind::LoadBalancer => Some(&mut self.load_balancer),
            NodeKind::QueueBuffer => Some(&mut self.queue_buffer),
            NodeKind::Compute => Some(&mut self.compute),
            NodeKind::Cache => Some(&mut self.cache),
            NodeKind::Database => Some(&mut self.database),
            NodeKind::ObjectStore => Some(&mut self.object_store),
            NodeKind::Cdn => Some(&mut self.cdn),
        }
    }
}

// ─── Traffic Catalog ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSpec {
    pub reward: f64,
    pub score: f64,
    /// Node kinds allowed to complete this type. Empty for malicious traffic.
    pub sinks: Vec<NodeKind>,
    /// Whether a cache may answer this type without touching the sink.
    pub cacheable: bool,
}

impl TrafficSpec {
    fn new(reward: f64, score: f64, sinks: &[NodeKind], cacheable: bool) -> Self {
        Self { reward, score, sinks: sinks.to_vec(), cacheable }
    }

    pub fn accepts(&self, kind: NodeKind) -> bool {
        self.sinks.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficCatalog {
    #[serde(rename = "static")]
    pub static_content: TrafficSpec,
    pub read: TrafficSpec,
    pub write: TrafficSpec,
    pub upload: TrafficSpec,
    pub search: TrafficSpec,
    pub malicious: TrafficSpec,
}

impl Default for TrafficCatalog {
    fn default() -> Self {
        use NodeKind::{Cdn, Database, ObjectStore};
        Self {
            static_content: TrafficSpec::new(1.0, 3.0, &[ObjectStore, Cdn], true),
            read: TrafficSpec::new(1.2, 5.0, &[Database], true),
            write: TrafficSpec::new(1.5, 8.0, &[Database], false),
            upload: TrafficSpec::new(1.5, 6.0, &[ObjectStore], false),
            search: TrafficSpec::new(2.0, 10.0, &[Database], true),
            malicious: TrafficSpec::new(0.0, 0.0, &[], false),
        }
    }
}

impl TrafficCatalog {
    pub fn spec_for(&self, traffic: TrafficType) -> &TrafficSpec {
        match traffic {
            TrafficType::Static => &self.static_content,
            TrafficType::Read => &self.read,
            TrafficType::Write => &self.write,
            TrafficType::Upload => &self.upload,
            TrafficType::Search => &self.search,
            TrafficType::Malicious => &self.malicious,
        }
    }
}

// ─── Score Table ─────────────────────────────────────────────────────────────

/// The single canonical reward/penalty table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub fail_reputation: f64,
    pub malicious_passed_reputation: f64,
    pub malicious_blocked_score: f64,
    pub malicious_blocked_reward: f64,
    pub completion_reputation: f64,
    pub cache_bonus: f64,
    /// Fraction of a type's score clawed back when it fails.
    pub failure_clawback: f64,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            fail_reputation: -2.5,
            malicious_passed_reputation: -5.0,
            malicious_blocked_score: 5.0,
            malicious_blocked_reward: 0.5,
            completion_reputation: 0.1,
            cache_bonus: 0.5,
            failure_clawback: 0.5,
        }
    }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub queue_limit: usize,
    /// Transit progress per simulated second (2.0 = half a second per hop).
    pub transit_speed: f64,
    /// Seconds a terminal request stays visible before the sweep drops it.
    pub terminal_grace: f64,
    pub max_frame_dt: f64,
    pub max_spawns_per_tick: u32,
    pub game_over_money: f64,
    pub max_reputation: f64,
    pub cache_hit_rate: f64,
    pub upkeep_enabled: bool,
    pub game_over_enabled: bool,
}

impl Default for RuleParams {
    fn default() -> Self {
        Self {
            queue_limit: 20,
            transit_speed: 2.0,
            terminal_grace: 0.5,
            max_frame_dt: 0.1,
            max_spawns_per_tick: 200,
            game_over_money: -1000.0,
            max_reputation: 100.0,
            cache_hit_rate: 0.35,
            upkeep_enabled: true,
            game_over_enabled: true,
        }
    }
}

// ─── Difficulty ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub at_seconds: f64,
    pub multiplier: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftProfile {
    pub label: String,
    pub weights: BTreeMap<TrafficType, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyParams {
    pub enabled: bool,
    pub base_rps: f64,
    pub log_coefficient: f64,
    pub linear_coefficient: f64,
    pub smoothing: f64,
    pub max_rps: f64,
    pub milestones: Vec<Milestone>,
    pub shift_interval: f64,
    pub shift_duration: f64,
    pub shift_profiles: Vec<ShiftProfile>,
    pub spike_interval: f64,
    pub spike_warning_lead: f64,
    pub spike_duration: f64,
    pub spike_weight: f64,
    /// Seconds for elapsed-time upkeep scaling to reach its ceiling.
    pub upkeep_ramp_seconds: f64,
    pub upkeep_growth: f64,
}

fn weights(pairs: &[(TrafficType, f64)]) -> BTreeMap<TrafficType, f64> {
    pairs.iter().copied().collect()
}

impl Default for DifficultyParams {
    fn default() -> Self {
        use TrafficType::*;
        let milestone = |at_seconds: f64, multiplier: f64, label: &str| Milestone {
            at_seconds,
            multiplier,
            label: label.to_string(),
        };
        let profile = |label: &str, pairs: &[(TrafficType, f64)]| ShiftProfile {
            label: label.to_string(),
            weights: weights(pairs),
        };
        Self {
            enabled: true,
            base_rps: 1.0,
            log_coefficient: 0.6,
            linear_coefficient: 0.01,
            smoothing: 0.02,
            max_rps: 25.0,
            milestones: vec![
                milestone(60.0, 1.15, "Traffic is picking up"),
                milestone(180.0, 1.25, "Featured on a newsletter"),
                milestone(360.0, 1.35, "Front page of the internet"),
                milestone(600.0, 1.5, "Global scale"),
            ],
            shift_interval: 75.0,
            shift_duration: 20.0,
            shift_profiles: vec![
                profile("Read-heavy browsing", &[
                    (Static, 0.2), (Read, 0.45), (Write, 0.1),
                    (Upload, 0.05), (Search, 0.1), (Malicious, 0.1),
                ]),
                profile("Write storm", &[
                    (Static, 0.1), (Read, 0.15), (Write, 0.45),
                    (Upload, 0.1), (Search, 0.1), (Malicious, 0.1),
                ]),
                profile("Media uploads", &[
                    (Static, 0.25), (Read, 0.1), (Write, 0.05),
                    (Upload, 0.45), (Search, 0.05), (Malicious, 0.1),
                ]),
                profile("Search frenzy", &[
                    (Static, 0.1), (Read, 0.15), (Write, 0.05),
                    (Upload, 0.05), (Search, 0.55), (Malicious, 0.1),
                ]),
            ],
            spike_interval: 120.0,
            spike_warning_lead: 10.0,
            spike_duration: 15.0,
            spike_weight: 0.45,
            upkeep_ramp_seconds: 1200.0,
            upkeep_growth: 1.0,
        }
    }
}

// ─── Disruptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisruptionParams {
    pub enabled: bool,
    pub check_interval: f64,
    pub probability: f64,
    pub duration: f64,
    pub cost_spike_multiplier: f64,
    pub capacity_drop_factor: f64,
    pub traffic_burst_multiplier: f64,
}

impl Default for DisruptionParams {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: 30.0,
            probability: 0.25,
            duration: 20.0,
            cost_spike_multiplier: 2.0,
            capacity_drop_factor: 0.5,
            traffic_burst_multiplier: 3.0,
        }
    }
}

// ─── Degradation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationParams {
    pub enabled: bool,
    pub damage_per_hit: f64,
    pub critical_health: f64,
    pub repair_rate: f64,
    pub repair_cost_fraction: f64,
    pub auto_repair: bool,
}

impl Default for DegradationParams {
    fn default() -> Self {
        Self {
            enabled: true,
            damage_per_hit: 1.0,
            critical_health: 40.0,
            repair_rate: 10.0,
            repair_cost_fraction: 0.25,
            auto_repair: false,
        }
    }
}

// ─── SimConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub mode: GameMode,
    pub start_money: f64,
    pub start_reputation: f64,
    pub entry_position: GridPos,
    pub distribution: BTreeMap<TrafficType, f64>,
    pub nodes: NodeCatalog,
    pub traffic: TrafficCatalog,
    pub scoring: ScoreTable,
    pub rules: RuleParams,
    pub difficulty: DifficultyParams,
    pub disruptions: DisruptionParams,
    pub degradation: DegradationParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::survival()
    }
}

impl SimConfig {
    /// Fixed budget, ramping difficulty, game over active.
    pub fn survival() -> Self {
        use TrafficType::*;
        Self {
            mode: GameMode::Survival,
            start_money: 500.0,
            start_reputation: 100.0,
            entry_position: GridPos::new(-10, 0),
            distribution: weights(&[
                (Static, 0.30), (Read, 0.20), (Write, 0.15),
                (Upload, 0.10), (Search, 0.10), (Malicious, 0.15),
            ]),
            nodes: NodeCatalog::default(),
            traffic: TrafficCatalog::default(),
            scoring: ScoreTable::default(),
            rules: RuleParams::default(),
            difficulty: DifficultyParams::default(),
            disruptions: DisruptionParams::default(),
            degradation: DegradationParams::default(),
        }
    }

    /// Player-chosen budget and flat spawn rate. No ramp, no events, no game over.
    pub fn sandbox(budget: f64, rps: f64, upkeep_enabled: bool) -> Self {
        let mut config = Self::survival();
        config.mode = GameMode::Sandbox;
        config.start_money = budget;
        config.rules.upkeep_enabled = upkeep_enabled;
        config.rules.game_over_enabled = false;
        config.difficulty.enabled = false;
        config.difficulty.base_rps = rps;
        config.disruptions.enabled = false;
        config
    }

    /// Switch to `mode`, flipping the rules that differ between the presets.
    /// Budget, rate and tables are kept.
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        let survival = mode == GameMode::Survival;
        self.mode = mode;
        self.rules.game_over_enabled = survival;
        self.difficulty.enabled = survival;
        self.disruptions.enabled = survival;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in NodeKind::PLACEABLE {
            let Some(spec) = self.nodes.spec_for(kind) else { continue };
            if spec.tiers.is_empty() {
                return Err(ConfigError::NoTiers { kind });
            }
            for (tier, pair) in spec.tiers.windows(2).enumerate() {
                if pair[1].capacity <= pair[0].capacity {
                    return Err(ConfigError::TierOrder { kind, tier: tier + 1 });
                }
            }
            if spec.processing_ms <= 0.0 || spec.tiers[0].capacity == 0 {
                return Err(ConfigError::ProcessingTime { kind });
            }
        }

        let total: f64 = self.distribution.values().sum();
        if total <= 0.0 || self.distribution.values().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(ConfigError::Distribution);
        }

        check_range("rules.cache_hit_rate", self.rules.cache_hit_rate, 0.0, 1.0)?;
        check_range("rules.max_frame_dt", self.rules.max_frame_dt, 0.0, 10.0)?;
        check_range("rules.transit_speed", self.rules.transit_speed, 1e-3, 1e3)?;
        check_range("difficulty.smoothing", self.difficulty.smoothing, 0.0, 1.0)?;
        check_range("difficulty.spike_weight", self.difficulty.spike_weight, 0.0, 1.0)?;
        check_range("disruptions.probability", self.disruptions.probability, 0.0, 1.0)?;
        check_range(
            "disruptions.capacity_drop_factor",
            self.disruptions.capacity_drop_factor,
            0.0,
            1.0,
        )?;
        check_range("start_reputation", self.start_reputation, 0.0, self.rules.max_reputation)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_validates() {
        SimConfig::survival().validate().unwrap();
        SimConfig::sandbox(2000.0, 2.0, false).validate().unwrap();
    }

    #[test]
    fn entry_has_no_spec() {
        let catalog = NodeCatalog::default();
        assert!(catalog.spec_for(NodeKind::Entry).is_none());
        for kind in NodeKind::PLACEABLE {
            assert!(catalog.spec_for(kind).is_some(), "{kind:?} missing");
        }
    }

    #[test]
    fn tiers_strictly_increase() {
        let catalog = NodeCatalog::default();
        let compute = catalog.spec_for(NodeKind::Compute).unwrap();
        assert_eq!(compute.base_capacity(), 5);
        assert_eq!(compute.capacity_at(2), 25);
        assert_eq!(compute.capacity_at(9), 25, "past max tier saturates");
        assert_eq!(compute.next_upgrade(0).map(|t| t.upgrade_cost), Some(200.0));
        assert!(compute.next_upgrade(2).is_none());
    }

    #[test]
    fn rejects_non_increasing_tiers() {
        let mut config = SimConfig::survival();
        config.nodes.database.tiers[1].capacity = 5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::TierOrder { kind: NodeKind::Database, tier: 1 }));
    }

    #[test]
    fn shift_profiles_sum_to_one() {
        for profile in DifficultyParams::default().shift_profiles {
            let total: f64 = profile.weights.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "{} sums to {}", profile.label, total);
        }
    }

    #[test]
    fn json_overrides_merge_with_defaults() {
        let config = SimConfig::from_json(r#"{"start_money": 1234.0, "mode": "sandbox"}"#).unwrap();
        assert_eq!(config.start_money, 1234.0);
        assert_eq!(config.mode, GameMode::Sandbox);
        assert_eq!(config.rules.queue_limit, 20);
    }

    #[test]
    fn with_mode_flips_mode_rules_only() {
        let sandbox = SimConfig::survival().with_mode(GameMode::Sandbox);
        assert_eq!(sandbox.mode, GameMode::Sandbox);
        assert!(!sandbox.rules.game_over_enabled);
        assert!(!sandbox.difficulty.enabled);
        assert!(!sandbox.disruptions.enabled);
        assert_eq!(sandbox.start_money, 500.0);

        let survival = SimConfig::sandbox(9000.0, 4.0, false).with_mode(GameMode::Survival);
        assert!(survival.rules.game_over_enabled);
        assert!(survival.difficulty.enabled);
        assert!(!survival.rules.upkeep_enabled, "upkeep choice is kept");
        assert_eq!(survival.difficulty.base_rps, 4.0);
    }

    #[test]
    fn json_rejects_bad_probability() {
        let err = SimConfig::from_json(r#"{"disruptions": {"enabled": true, "check_interval": 30.0,
            "probability": 1.5, "duration": 20.0, "cost_spike_multiplier": 2.0,
            "capacity_drop_factor": 0.5, "traffic_burst_multiplier": 3.0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "disruptions.probability", .. }));
    }
}
