// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Request Routing

use rand::Rng;

use crate::catalog::TrafficCatalog;
use crate::topology::Topology;
use crate::types::{FailureReason, NodeBehavior, NodeId, NodeKind, TrafficType};

/// What happens to a request whose processing timer just elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Forward(NodeId),
    Complete { cached: bool },
    Block,
    Fail(FailureReason),
}

/// What happens to a request whose transit just finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arrival {
    Enqueue,
    Block,
    Fail(FailureReason),
}

/// Whether a node of `kind` absorbs `traffic` outright.
pub fn absorbs(kind: NodeKind, traffic: TrafficType) -> bool {
    kind.behavior() == NodeBehavior::Filter && traffic.is_malicious()
}

fn pick<R: Rng + ?Sized>(candidates: &[NodeId], rng: &mut R) -> Option<NodeId> {
    if candidates.is_empty() {
        None
    } else {
        Some(candidates[rng.gen_range(0..candidates.len())])
    }
}

// ─── Entry Selection ─────────────────────────────────────────────────────────

/// First hop for a freshly spawned request.
///
/// Static content prefers a CDN edge, everything else prefers a firewall,
/// and the fallback is a uniform pick among the entry's connections.
pub fn select_entry<R: Rng + ?Sized>(
    topology: &Topology,
    traffic: TrafficType,
    rng: &mut R,
) -> Result<NodeId, FailureReason> {
    let candidates = topology.neighbours(NodeId::ENTRY);
    if candidates.is_empty() {
        return Err(FailureReason::NoEntryConnection);
    }

    if traffic == TrafficType::Static {
        let cdns = topology.neighbours_where(NodeId::ENTRY, |k| k == NodeKind::Cdn);
        if let Some(id) = pick(&cdns, rng) {
            return Ok(id);
        }
    }
    let firewalls = topology.neighbours_where(NodeId::ENTRY, |k| k == NodeKind::Firewall);
    if let Some(id) = pick(&firewalls, rng) {
        return Ok(id);
    }
    pick(&candidates, rng).ok_or(FailureReason::NoEntryConnection)
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Decide the fate of `traffic` finishing processing at `node`.
pub fn resolve<R: Rng + ?Sized>(
    topology: &Topology,
    node: NodeId,
    traffic: TrafficType,
    catalog: &TrafficCatalog,
    cache_hit_rate: f64,
    rng: &mut R,
) -> Resolution {
    let Some(kind) = topology.kind_of(node) else {
        return Resolution::Fail(FailureReason::NodeRemoved);
    };
    let spec = catalog.spec_for(traffic);

    match kind.behavior() {
        NodeBehavior::Filter if traffic.is_malicious() => Resolution::Block,
        NodeBehavior::Ingress | NodeBehavior::Filter | NodeBehavior::Balance | NodeBehavior::Buffer => {
            match pick(&topology.neighbours(node), rng) {
                Some(next) => Resolution::Forward(next),
                None => Resolution::Fail(FailureReason::NoConnection),
            }
        }
        NodeBehavior::Compute => {
            if traffic.is_malicious() {
                return Resolution::Fail(FailureReason::BypassedFirewall);
            }
            let caches = topology.neighbours_where(node, |k| k == NodeKind::Cache);
            let sinks = topology.neighbours_where(node, |k| spec.accepts(k));
            // A cache is only worth the detour if it can reach a sink on a miss.
            let backed = caches
                .iter()
                .copied()
                .find(|&cache| !topology.neighbours_where(cache, |k| spec.accepts(k)).is_empty());
            let next = if spec.cacheable {
                backed.or(sinks.first().copied())
            } else {
                sinks.first().copied().or(backed)
            };
            match next.or(caches.first().copied()) {
                Some(next) => Resolution::Forward(next),
                None => Resolution::Fail(FailureReason::UnreachableSink),
            }
        }
        NodeBehavior::Cache => {
            if spec.cacheable && rng.gen::<f64>() < cache_hit_rate {
                return Resolution::Complete { cached: true };
            }
            match topology.neighbours_where(node, |k| spec.accepts(k)).first() {
                Some(next) => Resolution::Forward(*next),
                None => Resolution::Fail(FailureReason::UnreachableSink),
            }
        }
        NodeBehavior::Sink => {
            if spec.accepts(kind) {
                Resolution::Complete { cached: false }
            } else {
                Resolution::Fail(FailureReason::WrongSink)
            }
        }
        NodeBehavior::EdgeSink => {
            if spec.accepts(kind) {
                return Resolution::Complete { cached: false };
            }
            let stores = if spec.accepts(NodeKind::ObjectStore) {
                topology.neighbours_where(node, |k| k == NodeKind::ObjectStore)
            } else {
                Vec::new()
            };
            match stores.first() {
                Some(next) => Resolution::Forward(*next),
                None => Resolution::Fail(FailureReason::WrongSink),
            }
        }
    }
}

// ─── Arrival Admission ───────────────────────────────────────────────────────

/// Admission control at the end of a hop. Overflow is a hard drop.
pub fn arrive(topology: &Topology, target: NodeId, traffic: TrafficType, queue_limit: usize) -> Arrival {
    let Some(node) = topology.get(target) else {
        return Arrival::Fail(FailureReason::NodeRemoved);
    };
    if absorbs(node.kind, traffic) {
        Arrival::Block
    } else if node.queue_full(queue_limit) {
        Arrival::Fail(FailureReason::QueueOverflow)
    } else {
        Arrival::Enqueue
    }
}
