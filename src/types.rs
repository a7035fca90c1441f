// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identifiers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The fixed ingress node. Service ids start at 1.
    pub const ENTRY: NodeId = NodeId(0);

    pub fn is_entry(&self) -> bool {
        *self == Self::ENTRY
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_entry() {
            write!(f, "entry")
        } else {
            write!(f, "svc-{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ─── Grid Position ───────────────────────────────────────────────────────────

/// Snapped grid cell on the build plane. One node per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub z: i32,
}

impl GridPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Linear interpolation toward `other`, used for in-flight request rendering.
    pub fn lerp(&self, other: &GridPos, t: f64) -> (f64, f64) {
        let t = t.clamp(0.0, 1.0);
        (
            self.x as f64 + (other.x - self.x) as f64 * t,
            self.z as f64 + (other.z - self.z) as f64 * t,
        )
    }
}

// ─── Node Kind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Entry,
    Firewall,
    LoadBalancer,
    QueueBuffer,
    Compute,
    Cache,
    Database,
    ObjectStore,
    Cdn,
}

/// How a node kind treats a request once its processing timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehavior {
    /// Ingress only; never holds requests.
    Ingress,
    /// Absorbs malicious traffic, forwards the rest at random.
    Filter,
    /// Forwards uniformly at random.
    Balance,
    /// Forwards uniformly at random; exists to add queue depth.
    Buffer,
    /// Type-directed forward toward an accepting sink.
    Compute,
    /// Probabilistic short-circuit, otherwise type-directed forward.
    Cache,
    /// Terminal: completes iff it accepts the type.
    Sink,
    /// Terminal for what it accepts, may hand uploads to a connected store.
    EdgeSink,
}

impl NodeKind {
    /// Every kind a player can place, in catalog order.
    pub const PLACEABLE: [NodeKind; 8] = [
        NodeKind::Firewall,
        NodeKind::LoadBalancer,
        NodeKind::QueueBuffer,
        NodeKind::Compute,
        NodeKind::Cache,
        NodeKind::Database,
        NodeKind::ObjectStore,
        NodeKind::Cdn,
    ];

    pub fn behavior(&self) -> NodeBehavior {
        match self {
            Self::Entry => NodeBehavior::Ingress,
            Self::Firewall => NodeBehavior::Filter,
            Self::LoadBalancer => NodeBehavior::Balance,
            Self::QueueBuffer => NodeBehavior::Buffer,
            Self::Compute => NodeBehavior::Compute,
            Self::Cache => NodeBehavior::Cache,
            Self::Database | Self::ObjectStore => NodeBehavior::Sink,
            Self::Cdn => NodeBehavior::EdgeSink,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.behavior(), NodeBehavior::Sink | NodeBehavior::EdgeSink)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Entry => "Internet",
            Self::Firewall => "Firewall",
            Self::LoadBalancer => "Load Balancer",
            Self::QueueBuffer => "Queue Buffer",
            Self::Compute => "Compute",
            Self::Cache => "Cache",
            Self::Database => "Database",
            Self::ObjectStore => "Object Store",
            Self::Cdn => "CDN",
        }
    }

    /// Parse the wire name used by the save schema and the WASM surface.
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_uppercase().as_str() {
            "ENTRY" => Self::Entry,
            "FIREWALL" => Self::Firewall,
            "LOAD_BALANCER" => Self::LoadBalancer,
            "QUEUE_BUFFER" => Self::QueueBuffer,
            "COMPUTE" => Self::Compute,
            "CACHE" => Self::Cache,
            "DATABASE" => Self::Database,
            "OBJECT_STORE" => Self::ObjectStore,
            "CDN" => Self::Cdn,
            _ => return None,
        };
        Some(kind)
    }
}

// ─── Traffic Type ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficType {
    Static,
    Read,
    Write,
    Upload,
    Search,
    Malicious,
}

impl TrafficType {
    pub const ALL: [TrafficType; 6] = [
        TrafficType::Static,
        TrafficType::Read,
        TrafficType::Write,
        TrafficType::Upload,
        TrafficType::Search,
        TrafficType::Malicious,
    ];

    pub fn is_malicious(&self) -> bool {
        *self == Self::Malicious
    }

    /// Score bucket a completed request of this type counts toward.
    pub fn category(&self) -> ScoreCategory {
        match self {
            Self::Static | Self::Upload => ScoreCategory::Storage,
            Self::Read | Self::Write | Self::Search => ScoreCategory::Database,
            Self::Malicious => ScoreCategory::Security,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_uppercase().as_str() {
            "STATIC" => Self::Static,
            "READ" => Self::Read,
            "WRITE" => Self::Write,
            "UPLOAD" => Self::Upload,
            "SEARCH" => Self::Search,
            "MALICIOUS" => Self::Malicious,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Storage,
    Database,
    Security,
}

// ─── Request Lifecycle ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Spawned,
    InTransit,
    Queued,
    Processing,
    Completed, // TERMINAL
    Failed,    // TERMINAL
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Why a request failed. An expected outcome, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    QueueOverflow,
    WrongSink,
    UnreachableSink,
    NoConnection,
    NoEntryConnection,
    BypassedFirewall,
    NodeRemoved,
}

/// Resolved fate of a request, as seen by the economy ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Completed { cached: bool },
    Failed { reason: FailureReason },
    MaliciousBlocked,
    MaliciousPassed { reason: FailureReason },
}

impl Outcome {
    /// Classify a failure by traffic type. Malicious traffic that was not
    /// stopped by a firewall counts as a breach whatever the reason.
    pub fn failure(traffic: TrafficType, reason: FailureReason) -> Self {
        if traffic.is_malicious() {
            Outcome::MaliciousPassed { reason }
        } else {
            Outcome::Failed { reason }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::MaliciousBlocked)
    }
}

// ─── Game Mode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Survival,
    Sandbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    GameOver,
}

// ─── SimEvent ────────────────────────────────────────────────────────────────

/// Cues emitted during a tick for UI, audio and logging consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    RequestResolved {
        request: RequestId,
        traffic: TrafficType,
        node: Option<NodeId>,
        outcome: Outcome,
    },
    MilestoneReached { index: usize, label: String },
    SpikeWarning { starts_in: f64 },
    SpikeStarted,
    SpikeEnded,
    ShiftStarted { label: String },
    ShiftEnded,
    DisruptionStarted { kind: crate::disruption::DisruptionKind, ends_at: f64 },
    DisruptionEnded { kind: crate::disruption::DisruptionKind },
    NodeDegraded { node: NodeId, health: f64 },
    RepairStarted { node: NodeId },
    RepairFinished { node: NodeId },
    GameOver { score: f64, elapsed: f64 },
}

// ─── Snapshot Views ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: GridPos,
    pub tier: usize,
    pub capacity: u32,
    pub processing: u32,
    pub queued: u32,
    pub load: f64,
    pub health: f64,
    pub disabled: bool,
    pub repairing: bool,
    pub outgoing: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub traffic: TrafficType,
    pub state: RequestState,
    pub target: Option<NodeId>,
    pub progress: f64,
    pub x: f64,
    pub z: f64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EconomyView {
    pub money: f64,
    pub reputation: f64,
    pub score_total: f64,
    pub score_storage: f64,
    pub score_database: f64,
    pub score_security: f64,
    pub upkeep_per_second: f64,
    pub requests_completed: u64,
    pub requests_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DifficultyView {
    pub elapsed: f64,
    pub current_rps: f64,
    pub target_rps: f64,
    pub distribution: Vec<(TrafficType, f64)>,
    pub milestone_index: usize,
    pub spike_active: bool,
    pub shift_active: bool,
    pub active_event: Option<crate::disruption::ActiveDisruption>,
    pub upkeep_multiplier: f64,
    pub capacity_factor: f64,
    pub spawn_multiplier: f64,
}

// ─── TickReport ──────────────────────────────────────────────────────────────

/// Read-only state handed to render/UI/audio/persistence after each tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub status: RunStatus,
    pub mode: GameMode,
    pub economy: EconomyView,
    pub difficulty: DifficultyView,
    pub nodes: Vec<NodeView>,
    pub entry_position: GridPos,
    pub connections: Vec<Connection>,
    pub requests: Vec<RequestView>,
    pub events: Vec<SimEvent>,
}

// ─── Command Rejections ──────────────────────────────────────────────────────

/// A player command that could not be applied. State is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejected {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("grid cell ({}, {}) is occupied", .0.x, .0.z)]
    OccupiedPosition(GridPos),
    #[error("{0} cannot connect to itself")]
    SelfLoop(NodeId),
    #[error("{from} is already connected to {to}")]
    Duplicate { from: NodeId, to: NodeId },
    #[error("{from:?} cannot feed {to:?}")]
    InvalidTopology { from: NodeKind, to: NodeKind },
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("no connection from {from} to {to}")]
    UnknownConnection { from: NodeId, to: NodeId },
    #[error("the entry node cannot be placed, upgraded or removed")]
    EntryImmutable,
    #[error("{0} is already at its top tier")]
    MaxTier(NodeId),
    #[error("{0} is not damaged enough to repair")]
    NotDamaged(NodeId),
    #[error("{0} is already being repaired")]
    AlreadyRepairing(NodeId),
    #[error("command is only available in sandbox mode")]
    SandboxOnly,
    #[error("traffic mix must have a positive total and no negative weights")]
    InvalidMix,
    #[error("spawn rate must be a non-negative number, got {0}")]
    InvalidRate(f64),
    #[error("the run is over")]
    GameOver,
}
