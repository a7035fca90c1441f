// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core

pub mod types;
pub mod catalog;
pub mod adapter;
pub mod clock;
pub mod request;
pub mod service;
pub mod topology;
pub mod traffic;
pub mod routing;
pub mod ledger;
pub mod difficulty;
pub mod disruption;
pub mod simulation;
pub mod save;

pub use catalog::{ConfigError, SimConfig};
pub use clock::TimeScale;
pub use disruption::DisruptionKind;
pub use save::{SaveData, SaveError};
pub use simulation::Simulation;
pub use types::*;

use std::collections::BTreeMap;

use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Command outcome as seen by the browser UI.
#[derive(Serialize)]
struct CommandResult<T: Serialize> {
    ok: bool,
    value: Option<T>,
    reason: Option<String>,
}

fn to_js<T: Serialize>(result: Result<T, Rejected>) -> JsValue {
    let result = match result {
        Ok(value) => CommandResult { ok: true, value: Some(value), reason: None },
        Err(err) => CommandResult { ok: false, value: None, reason: Some(err.to_string()) },
    };
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn parse_kind(name: &str) -> Result<NodeKind, JsError> {
    NodeKind::parse(name).ok_or_else(|| JsError::new(&format!("unknown node kind {name}")))
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl Simulation {
    /// `config_json` overrides the survival preset; omit it for defaults.
    #[wasm_bindgen(constructor)]
    pub fn js_new(config_json: Option<String>, seed: u32) -> Result<Simulation, JsError> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config = match config_json {
            Some(json) => SimConfig::from_json(&json)?,
            None => SimConfig::survival(),
        };
        Ok(Simulation::new(config, seed as u64)?)
    }

    #[wasm_bindgen(js_name = sandbox)]
    pub fn js_sandbox(budget: f64, rps: f64, upkeep_enabled: bool, seed: u32) -> Simulation {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        Simulation::sandbox(budget, rps, upkeep_enabled, seed as u64)
    }

    /// Advance by one host frame (seconds of wall time).
    #[wasm_bindgen(js_name = frame)]
    pub fn js_frame(&mut self, wall_dt: f64) -> JsValue {
        let report = self.frame(wall_dt);
        serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = tick)]
    pub fn js_tick(&mut self, dt: f64) -> JsValue {
        let report = self.tick(dt);
        serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL)
    }

    /// Run simulated seconds in fixed steps without building reports.
    #[wasm_bindgen(js_name = runFor)]
    pub fn js_run_for(&mut self, seconds: f64, step: f64) -> u32 {
        if !(step > 0.0) || !seconds.is_finite() {
            return 0;
        }
        let mut ticks = 0;
        let mut remaining = seconds;
        while remaining > 0.0 && self.is_running() {
            self.step(step.min(remaining));
            remaining -= step;
            ticks += 1;
        }
        ticks
    }

    #[wasm_bindgen(js_name = snapshot)]
    pub fn js_snapshot(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.snapshot()).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = placeNode)]
    pub fn js_place_node(&mut self, kind: &str, x: i32, z: i32) -> Result<JsValue, JsError> {
        let kind = parse_kind(kind)?;
        Ok(to_js(self.place_node(kind, GridPos::new(x, z))))
    }

    #[wasm_bindgen(js_name = connect)]
    pub fn js_connect(&mut self, from: u32, to: u32) -> JsValue {
        to_js(self.connect(NodeId(from), NodeId(to)))
    }

    #[wasm_bindgen(js_name = disconnect)]
    pub fn js_disconnect(&mut self, from: u32, to: u32) -> JsValue {
        to_js(self.disconnect(NodeId(from), NodeId(to)))
    }

    #[wasm_bindgen(js_name = removeNode)]
    pub fn js_remove_node(&mut self, id: u32) -> JsValue {
        to_js(self.remove_node(NodeId(id)))
    }

    #[wasm_bindgen(js_name = upgradeNode)]
    pub fn js_upgrade_node(&mut self, id: u32) -> JsValue {
        to_js(self.upgrade_node(NodeId(id)))
    }

    #[wasm_bindgen(js_name = repairNode)]
    pub fn js_repair_node(&mut self, id: u32) -> JsValue {
        to_js(self.repair_node(NodeId(id)))
    }

    /// `weights` is an object keyed by traffic type name, e.g. `{ READ: 0.4, ... }`.
    #[wasm_bindgen(js_name = setTrafficMix)]
    pub fn js_set_traffic_mix(&mut self, weights: JsValue) -> Result<JsValue, JsError> {
        let raw: BTreeMap<String, f64> = serde_wasm_bindgen::from_value(weights)?;
        let mut parsed = BTreeMap::new();
        for (name, weight) in raw {
            let traffic =
                TrafficType::parse(&name).ok_or_else(|| JsError::new(&format!("unknown traffic type {name}")))?;
            parsed.insert(traffic, weight);
        }
        Ok(to_js(self.set_traffic_mix(&parsed)))
    }

    #[wasm_bindgen(js_name = setSpawnRate)]
    pub fn js_set_spawn_rate(&mut self, rps: f64) -> JsValue {
        to_js(self.set_spawn_rate(rps))
    }

    #[wasm_bindgen(js_name = burst)]
    pub fn js_burst(&mut self, count: u32) -> JsValue {
        to_js(self.burst(count).map(|ids| ids.len()))
    }

    /// Accepts 0 (paused), 1 or 3.
    #[wasm_bindgen(js_name = setTimeScale)]
    pub fn js_set_time_scale(&mut self, factor: u32) -> Result<(), JsError> {
        let scale = TimeScale::from_factor(factor).ok_or_else(|| JsError::new(&format!("unsupported time scale {factor}")))?;
        self.set_time_scale(scale);
        Ok(())
    }

    #[wasm_bindgen(js_name = reset)]
    pub fn js_reset(&mut self) {
        self.reset();
    }

    #[wasm_bindgen(js_name = save)]
    pub fn js_save(&self) -> Result<String, JsError> {
        Ok(self.save_json()?)
    }

    #[wasm_bindgen(js_name = load)]
    pub fn js_load(&mut self, json: &str) -> Result<(), JsError> {
        Ok(self.load_json(json)?)
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn js_is_running(&self) -> bool {
        self.is_running()
    }
}
