// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Save Schema
//
// Saves are JSON. Older generations are upgraded step by step through the
// migration table on `serde_json::Value` before typed decoding, and a load
// either replaces the whole simulation or leaves it untouched.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::catalog::SimConfig;
use crate::disruption::ActiveDisruption;
use crate::ledger::Score;
use crate::service::{ServiceNode, FULL_HEALTH};
use crate::simulation::Simulation;
use crate::traffic::TrafficDistribution;
use crate::types::{Connection, GameMode, GridPos, NodeId, NodeKind, Rejected, TrafficType};

pub const SAVE_VERSION: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("save is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u64),
    #[error("cannot migrate save: {0}")]
    Migration(String),
    #[error("save is inconsistent: {0}")]
    Invalid(String),
}

// ─── Schema v2 ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedService {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: GridPos,
    pub tier: usize,
    pub health: f64,
    #[serde(default)]
    pub repairing: bool,
    pub connections: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub version: u64,
    pub mode: GameMode,
    pub money: Decimal,
    pub reputation: f64,
    pub score: Score,
    pub traffic_distribution: BTreeMap<TrafficType, f64>,
    pub services: Vec<SavedService>,
    pub connections: Vec<Connection>,
    pub entry_connections: Vec<NodeId>,
    pub elapsed_sim_seconds: f64,
    pub current_rps: Option<f64>,
    pub milestone_index: usize,
    pub active_event: Option<ActiveDisruption>,
}

impl SaveData {
    /// Capture everything except in-flight requests.
    pub fn capture(sim: &Simulation) -> Self {
        let topology = sim.topology();
        let services = topology
            .nodes()
            .map(|n| SavedService {
                id: n.id,
                kind: n.kind,
                position: n.position,
                tier: n.tier,
                health: n.health,
                repairing: n.repairing,
                connections: n.outgoing.iter().copied().collect(),
            })
            .collect();
        let connections = topology.connections().into_iter().filter(|c| !c.from.is_entry()).collect();

        Self {
            version: SAVE_VERSION,
            mode: sim.config().mode,
            money: sim.ledger().money(),
            reputation: sim.ledger().reputation(),
            score: sim.ledger().score().clone(),
            traffic_distribution: sim.difficulty().base_distribution().as_map().clone(),
            services,
            connections,
            entry_connections: topology.entry().outgoing.iter().copied().collect(),
            elapsed_sim_seconds: sim.elapsed(),
            current_rps: Some(sim.difficulty().current_rps()),
            milestone_index: sim.difficulty().milestone_index(),
            active_event: sim.disruptions().active().cloned(),
        }
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse any supported generation, migrating it to the current schema.
    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        let value: Value = serde_json::from_str(json)?;
        let value = migrate(value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Build a fresh simulation from this save on top of `config`.
    pub fn restore(&self, config: SimConfig, seed: u64) -> Result<Simulation, SaveError> {
        let config = config.with_mode(self.mode);
        let mut sim = Simulation::build(config, seed);

        let mut seen = HashSet::new();
        for saved in &self.services {
            if saved.id.is_entry() || !seen.insert(saved.id) {
                return Err(SaveError::Invalid(format!("duplicate or reserved node id {}", saved.id)));
            }
            let spec = sim
                .config
                .nodes
                .spec_for(saved.kind)
                .ok_or_else(|| SaveError::Invalid(format!("{} cannot be a placed service", saved.id)))?;
            if saved.tier > spec.max_tier() {
                return Err(SaveError::Invalid(format!("{} tier {} out of range", saved.id, saved.tier)));
            }
            if sim.topology.is_occupied(saved.position) {
                return Err(SaveError::Invalid(format!("{} overlaps another node", saved.id)));
            }
            let mut node = ServiceNode::new(saved.id, saved.kind, saved.position);
            node.tier = saved.tier;
            node.health = if saved.health.is_finite() { saved.health.clamp(0.0, FULL_HEALTH) } else { FULL_HEALTH };
            node.repairing = saved.repairing && node.health < FULL_HEALTH;
            sim.topology.insert_restored(node);
        }

        let edges = self
            .services
            .iter()
            .flat_map(|s| s.connections.iter().map(move |to| (s.id, *to)))
            .chain(self.entry_connections.iter().map(|to| (NodeId::ENTRY, *to)))
            .chain(self.connections.iter().map(|c| (c.from, c.to)));
        for (from, to) in edges {
            match sim.topology.add_connection(from, to) {
                Ok(()) | Err(Rejected::Duplicate { .. }) => {}
                Err(reason) => return Err(SaveError::Invalid(format!("edge {from} -> {to}: {reason}"))),
            }
        }

        let mix = TrafficDistribution::from_weights(&self.traffic_distribution)
            .ok_or_else(|| SaveError::Invalid("traffic distribution has no usable weights".into()))?;
        if !self.reputation.is_finite() || !self.elapsed_sim_seconds.is_finite() || self.elapsed_sim_seconds < 0.0 {
            return Err(SaveError::Invalid("non-finite economy or clock values".into()));
        }

        let max_reputation = sim.config.rules.max_reputation;
        sim.ledger.restore(self.money, self.reputation.min(max_reputation), self.score.clone());
        sim.difficulty.set_distribution(mix);
        let rps = self.current_rps.filter(|r| r.is_finite() && *r >= 0.0).unwrap_or(sim.config.difficulty.base_rps);
        // Without the ramp the flat rate is read from config every tick.
        if !sim.config.difficulty.enabled {
            sim.config.difficulty.base_rps = rps;
        }
        let milestone = self.milestone_index.min(sim.config.difficulty.milestones.len());
        sim.difficulty.restore(rps, milestone);
        sim.clock.restore_elapsed(self.elapsed_sim_seconds);
        let active = self.active_event.clone().filter(|e| e.ends_at > self.elapsed_sim_seconds);
        sim.disruptions.restore(active, &mut sim.topology);
        sim.refresh_modifiers();
        Ok(sim)
    }
}

impl Simulation {
    pub fn save(&self) -> SaveData {
        SaveData::capture(self)
    }

    pub fn save_json(&self) -> Result<String, SaveError> {
        self.save().to_json()
    }

    /// Replace the whole state from a save. On error nothing changes.
    pub fn load_json(&mut self, json: &str) -> Result<(), SaveError> {
        let loaded = SaveData::from_json(json).and_then(|data| data.restore(self.initial.clone(), self.seed));
        match loaded {
            Ok(mut sim) => {
                sim.clock.set_scale(self.clock.scale());
                *self = sim;
                tracing::info!(nodes = self.topology.len(), elapsed = self.elapsed(), "save loaded");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "save rejected");
                Err(err)
            }
        }
    }
}

// ─── Migration ───────────────────────────────────────────────────────────────

type Migration = fn(Value) -> Result<Value, SaveError>;

/// `(from_version, step)`; each step produces the next version.
const MIGRATIONS: &[(u64, Migration)] = &[(1, v1_to_v2)];

/// Upgrade `value` to `SAVE_VERSION`. A missing version is the first generation,
/// which never wrote one.
pub fn migrate(mut value: Value) -> Result<Value, SaveError> {
    loop {
        let version = match value.get("version") {
            None => 1,
            Some(v) => v.as_u64().ok_or_else(|| SaveError::Migration("version is not an integer".into()))?,
        };
        if version == SAVE_VERSION {
            return Ok(value);
        }
        let step = MIGRATIONS
            .iter()
            .find(|(from, _)| *from == version)
            .map(|(_, step)| *step)
            .ok_or(SaveError::UnsupportedVersion(version))?;
        tracing::debug!(from = version, "migrating save");
        value = step(value)?;
    }
}

/// Legacy traffic types spread over the current ones.
const LEGACY_TRAFFIC: &[(&str, &[(&str, f64)])] = &[
    ("WEB", &[("STATIC", 0.7), ("UPLOAD", 0.3)]),
    ("API", &[("READ", 0.5), ("WRITE", 0.3), ("SEARCH", 0.2)]),
    ("FRAUD", &[("MALICIOUS", 1.0)]),
];

const LEGACY_KINDS: &[(&str, &str)] = &[
    ("waf", "FIREWALL"),
    ("alb", "LOAD_BALANCER"),
    ("compute", "COMPUTE"),
    ("db", "DATABASE"),
    ("s3", "OBJECT_STORE"),
];

const LEGACY_ENTRY_ID: &str = "internet";

fn missing(field: &str) -> SaveError {
    SaveError::Migration(format!("missing or malformed `{field}`"))
}

fn number(obj: &Value, field: &str) -> Result<f64, SaveError> {
    obj.get(field).and_then(Value::as_f64).ok_or_else(|| missing(field))
}

/// First generation: three traffic types, string ids, short kind names,
/// score split into web/api/fraudBlocked.
fn v1_to_v2(v1: Value) -> Result<Value, SaveError> {
    let money = number(&v1, "money")?;
    let reputation = number(&v1, "reputation")?;

    let score = v1.get("score").ok_or_else(|| missing("score"))?;
    let score = json!({
        "total": number(score, "total")?,
        "storage": number(score, "web")?,
        "database": number(score, "api")?,
        "security": number(score, "fraudBlocked")?,
    });

    let mut distribution = Map::new();
    let legacy_mix = v1.get("trafficDistribution").and_then(Value::as_object).ok_or_else(|| missing("trafficDistribution"))?;
    for (legacy, weight) in legacy_mix {
        let weight = weight.as_f64().ok_or_else(|| missing("trafficDistribution"))?;
        let (_, split) = LEGACY_TRAFFIC
            .iter()
            .find(|(name, _)| *name == legacy.as_str())
            .ok_or_else(|| SaveError::Migration(format!("unknown legacy traffic type {legacy}")))?;
        for (name, share) in split.iter() {
            let slot = distribution.entry(name.to_string()).or_insert(json!(0.0));
            *slot = json!(slot.as_f64().unwrap_or(0.0) + weight * share);
        }
    }

    // String ids become sequential numeric ids in save order.
    let legacy_services = v1.get("services").and_then(Value::as_array).ok_or_else(|| missing("services"))?;
    let mut ids: BTreeMap<String, u32> = BTreeMap::new();
    for (i, service) in legacy_services.iter().enumerate() {
        let id = service.get("id").and_then(Value::as_str).ok_or_else(|| missing("services[].id"))?;
        if ids.insert(id.to_string(), i as u32 + 1).is_some() {
            return Err(SaveError::Migration(format!("duplicate service id {id}")));
        }
    }
    let remap = |legacy: &Value| -> Result<u32, SaveError> {
        let id = legacy.as_str().ok_or_else(|| missing("connection id"))?;
        if id == LEGACY_ENTRY_ID {
            return Ok(NodeId::ENTRY.0);
        }
        ids.get(id).copied().ok_or_else(|| SaveError::Migration(format!("connection to unknown service {id}")))
    };

    let mut services = Vec::with_capacity(legacy_services.len());
    for service in legacy_services {
        let legacy_id = service.get("id").ok_or_else(|| missing("services[].id"))?;
        let legacy_kind = service.get("type").and_then(Value::as_str).ok_or_else(|| missing("services[].type"))?;
        let kind = LEGACY_KINDS
            .iter()
            .find(|(name, _)| *name == legacy_kind)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| SaveError::Migration(format!("unknown legacy service type {legacy_kind}")))?;
        let position = service.get("position").ok_or_else(|| missing("services[].position"))?;
        let outgoing = match service.get("connections").and_then(Value::as_array) {
            Some(list) => list.iter().map(&remap).collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        services.push(json!({
            "id": remap(legacy_id)?,
            "kind": kind,
            "position": {
                "x": number(position, "x")?.round() as i32,
                "z": number(position, "z")?.round() as i32,
            },
            "tier": 0,
            "health": 100.0,
            "connections": outgoing,
        }));
    }

    let mut connections = Vec::new();
    let mut entry_connections = BTreeSet::new();
    for edge in v1.get("connections").and_then(Value::as_array).into_iter().flatten() {
        let from = remap(edge.get("from").ok_or_else(|| missing("connections[].from"))?)?;
        let to = remap(edge.get("to").ok_or_else(|| missing("connections[].to"))?)?;
        if from == NodeId::ENTRY.0 {
            entry_connections.insert(to);
        } else {
            connections.push(json!({ "from": from, "to": to }));
        }
    }

    Ok(json!({
        "version": 2,
        "mode": "survival",
        "money": money,
        "reputation": reputation,
        "score": score,
        "traffic_distribution": distribution,
        "services": services,
        "connections": connections,
        "entry_connections": entry_connections,
        "elapsed_sim_seconds": v1.get("elapsedSeconds").and_then(Value::as_f64).unwrap_or(0.0),
        "current_rps": Value::Null,
        "milestone_index": 0,
        "active_event": Value::Null,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn legacy_save() -> Value {
        json!({
            "money": 320.5,
            "reputation": 88.0,
            "requestsProcessed": 41,
            "score": { "total": 120.0, "web": 40.0, "api": 60.0, "fraudBlocked": 25.0 },
            "trafficDistribution": { "WEB": 0.5, "API": 0.35, "FRAUD": 0.15 },
            "services": [
                { "id": "svc_waf01", "type": "waf", "position": { "x": 0.0, "z": 0.0 }, "connections": ["svc_alb01"] },
                { "id": "svc_alb01", "type": "alb", "position": { "x": 4.0, "z": 0.0 }, "connections": ["svc_ec201"] },
                { "id": "svc_ec201", "type": "compute", "position": { "x": 8.0, "z": 0.0 }, "connections": ["svc_rds01"] },
                { "id": "svc_rds01", "type": "db", "position": { "x": 12.0, "z": 0.0 }, "connections": [] }
            ],
            "connections": [
                { "from": "internet", "to": "svc_waf01" },
                { "from": "svc_waf01", "to": "svc_alb01" },
                { "from": "svc_alb01", "to": "svc_ec201" },
                { "from": "svc_ec201", "to": "svc_rds01" }
            ]
        })
    }

    #[test]
    fn v1_migrates_to_current_schema() {
        let data = SaveData::from_json(&legacy_save().to_string()).unwrap();
        assert_eq!(data.version, SAVE_VERSION);
        assert_eq!(data.money, dec!(320.5));
        assert_eq!(data.score.storage, 40.0);
        assert_eq!(data.score.security, 25.0);
        assert_eq!(data.services.len(), 4);
        assert_eq!(data.services[0].kind, NodeKind::Firewall);
        assert_eq!(data.services[3].id, NodeId(4));
        assert_eq!(data.entry_connections, vec![NodeId(1)]);
        assert_eq!(data.connections.len(), 3);

        let total: f64 = data.traffic_distribution.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((data.traffic_distribution[&TrafficType::Static] - 0.35).abs() < 1e-9);
        assert!((data.traffic_distribution[&TrafficType::Malicious] - 0.15).abs() < 1e-9);
    }

    #[test]
    fn migrated_save_restores_a_playable_graph() {
        let data = SaveData::from_json(&legacy_save().to_string()).unwrap();
        let sim = data.restore(SimConfig::survival(), 1).unwrap();
        assert_eq!(sim.topology().len(), 4);
        assert_eq!(sim.topology().connections().len(), 4);
        assert_eq!(sim.ledger().reputation(), 88.0);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = SaveData::from_json(r#"{"version": 9}"#).unwrap_err();
        assert!(matches!(err, SaveError::UnsupportedVersion(9)));
    }

    #[test]
    fn unrecognized_legacy_shape_is_rejected() {
        let mut save = legacy_save();
        save["services"][1]["type"] = json!("quantum");
        let err = SaveData::from_json(&save.to_string()).unwrap_err();
        assert!(matches!(err, SaveError::Migration(_)));

        let err = SaveData::from_json(r#"{"money": 1}"#).unwrap_err();
        assert!(matches!(err, SaveError::Migration(_)));
    }

    #[test]
    fn invalid_edges_fail_restore() {
        let mut data = SaveData::from_json(&legacy_save().to_string()).unwrap();
        data.connections.push(Connection { from: NodeId(4), to: NodeId(1) });
        let err = data.restore(SimConfig::survival(), 1).unwrap_err();
        assert!(matches!(err, SaveError::Invalid(_)));
    }

    #[test]
    fn load_failure_leaves_state_untouched() {
        let mut sim = Simulation::survival(5);
        let fw = sim.place_node(NodeKind::Firewall, GridPos::new(0, 0)).unwrap();
        let before = sim.save();
        assert!(sim.load_json("{ not json").is_err());
        assert!(sim.load_json(r#"{"version": 3}"#).is_err());
        assert_eq!(sim.save(), before);
        assert!(sim.topology().get(fw).is_some());
    }
}
