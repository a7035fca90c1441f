// Benchmark Scenarios
//
// Each scenario is a player layout built through the public command API,
// an optional mid-run event hook and a set of pass criteria.

use cloudgrid_engine::catalog::SimConfig;
use cloudgrid_engine::{DisruptionKind, GridPos, NodeId, NodeKind, Rejected, Simulation};

/// Fixed simulated step used by every run (20 Hz).
pub const TICK_SECONDS: f64 = 0.05;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub type Setup = Box<dyn Fn(&mut Simulation) -> Result<(), Rejected> + Send + Sync>;
pub type MidEvent = Box<dyn Fn(&mut Simulation, u64) + Send + Sync>;

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub seconds: f64,
    pub config: fn() -> SimConfig,
    /// Builds the player's network before the first tick.
    pub setup: Setup,
    /// Called before every tick with the tick index.
    pub mid_event: Option<MidEvent>,
    pub criteria: PassCriteria,
}

impl Scenario {
    pub fn ticks(&self) -> u64 {
        (self.seconds / TICK_SECONDS).round() as u64
    }
}

#[derive(Default)]
pub struct PassCriteria {
    pub min_survival_seconds: Option<f64>,
    pub min_completion_rate: Option<f64>,
    pub max_malicious_passed: Option<u64>,
    pub expect_game_over: bool,
}

// ─── Layout Helpers ─────────────────────────────────────────────────────────

/// Edge endpoint index meaning the fixed entry node.
const ENTRY: usize = usize::MAX;

/// Place `nodes` in order, then draw `edges` between their indices.
fn build(sim: &mut Simulation, nodes: &[(NodeKind, i32, i32)], edges: &[(usize, usize)]) -> Result<Vec<NodeId>, Rejected> {
    let ids = nodes
        .iter()
        .map(|&(kind, x, z)| sim.place_node(kind, GridPos::new(x, z)))
        .collect::<Result<Vec<_>, _>>()?;
    let id = |i: usize| if i == ENTRY { NodeId::ENTRY } else { ids[i] };
    for &(from, to) in edges {
        sim.connect(id(from), id(to))?;
    }
    Ok(ids)
}

/// Firewall, balancer, one compute, a database and an object store. Fits the
/// survival budget.
fn starter_stack(sim: &mut Simulation) -> Result<Vec<NodeId>, Rejected> {
    use NodeKind::*;
    build(
        sim,
        &[(Firewall, -6, 0), (LoadBalancer, -2, 0), (Compute, 2, 0), (Database, 6, -2), (ObjectStore, 6, 2)],
        &[(ENTRY, 0), (0, 1), (1, 2), (2, 3), (2, 4)],
    )
}

/// Everything: an edge CDN, a buffered compute pair and a cache in front of
/// the database.
fn full_stack(sim: &mut Simulation) -> Result<Vec<NodeId>, Rejected> {
    use NodeKind::*;
    let ids = build(
        sim,
        &[
            (Firewall, -6, 0),      // 0
            (LoadBalancer, -2, 0),  // 1
            (QueueBuffer, 0, -3),   // 2
            (Compute, 2, 0),        // 3
            (Compute, 2, -4),       // 4
            (Cache, 5, -1),         // 5
            (Database, 8, -2),      // 6
            (ObjectStore, 8, 3),    // 7
            (Cdn, -6, 5),           // 8
        ],
        &[
            (ENTRY, 0), (ENTRY, 8),
            (0, 1), (1, 2), (1, 3), (2, 4),
            (3, 5), (4, 5), (5, 6), (3, 6), (4, 6),
            (3, 7), (4, 7), (8, 7),
        ],
    )?;
    sim.upgrade_node(ids[3])?;
    sim.upgrade_node(ids[6])?;
    Ok(ids)
}

fn sandbox_config() -> SimConfig {
    SimConfig::sandbox(5000.0, 6.0, true)
}

// ─── Scenario Table ─────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "EMPTY_GRID",
            label: "Empty grid (no services)",
            category: "baseline",
            seconds: 300.0,
            config: SimConfig::survival,
            setup: Box::new(|_: &mut Simulation| Ok(())),
            mid_event: None,
            criteria: PassCriteria { expect_game_over: true, ..Default::default() },
        },
        Scenario {
            name: "STARTER_STACK",
            label: "Starter stack (FW > LB > Compute > DB/S3)",
            category: "survival",
            seconds: 600.0,
            config: SimConfig::survival,
            setup: Box::new(|sim: &mut Simulation| starter_stack(sim).map(|_| ())),
            mid_event: None,
            criteria: PassCriteria { min_survival_seconds: Some(120.0), ..Default::default() },
        },
        Scenario {
            name: "NO_FIREWALL",
            label: "Unprotected stack (LB first)",
            category: "survival",
            seconds: 600.0,
            config: SimConfig::survival,
            setup: Box::new(|sim: &mut Simulation| {
                use NodeKind::*;
                build(
                    sim,
                    &[(LoadBalancer, -4, 0), (Compute, 0, 0), (Database, 4, -2), (ObjectStore, 4, 2)],
                    &[(ENTRY, 0), (0, 1), (1, 2), (1, 3)],
                )
                .map(|_| ())
            }),
            mid_event: None,
            criteria: PassCriteria { expect_game_over: true, ..Default::default() },
        },
        Scenario {
            name: "OUTAGE_DRILL",
            label: "Starter stack under forced outages",
            category: "disruption",
            seconds: 600.0,
            config: SimConfig::survival,
            setup: Box::new(|sim: &mut Simulation| starter_stack(sim).map(|_| ())),
            mid_event: Some(Box::new(|sim: &mut Simulation, tick: u64| {
                let kind = match tick {
                    1200 => DisruptionKind::ServiceOutage,
                    3600 => DisruptionKind::CapacityDrop,
                    6000 => DisruptionKind::CostSpike,
                    _ => return,
                };
                // A scheduler event may already be running; skipping is fine.
                let _ = sim.trigger_disruption(kind);
            })),
            criteria: PassCriteria { min_survival_seconds: Some(90.0), ..Default::default() },
        },
        Scenario {
            name: "SANDBOX_FULL_STACK",
            label: "Sandbox: full stack at 6 rps",
            category: "sandbox",
            seconds: 600.0,
            config: sandbox_config,
            setup: Box::new(|sim: &mut Simulation| full_stack(sim).map(|_| ())),
            mid_event: None,
            criteria: PassCriteria {
                min_completion_rate: Some(60.0),
                max_malicious_passed: Some(0),
                ..Default::default()
            },
        },
        Scenario {
            name: "SANDBOX_BURST",
            label: "Sandbox: full stack with 150-request bursts",
            category: "sandbox",
            seconds: 300.0,
            config: sandbox_config,
            setup: Box::new(|sim: &mut Simulation| full_stack(sim).map(|_| ())),
            mid_event: Some(Box::new(|sim: &mut Simulation, tick: u64| {
                if tick > 0 && tick % 1200 == 0 {
                    let _ = sim.burst(150);
                }
            })),
            criteria: PassCriteria { max_malicious_passed: Some(0), ..Default::default() },
        },
    ]
}
