// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Topology Graph

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::service::ServiceNode;
use crate::types::{Connection, GridPos, NodeId, NodeKind, Rejected};

/// Directed edges a player may draw, keyed by the source kind.
pub fn allowed_targets(from: NodeKind) -> &'static [NodeKind] {
    use NodeKind::*;
    match from {
        Entry => &[Firewall, LoadBalancer, Cdn],
        Firewall => &[LoadBalancer, QueueBuffer],
        QueueBuffer => &[LoadBalancer, Compute],
        LoadBalancer => &[QueueBuffer, Compute],
        Compute => &[Cache, Database, ObjectStore],
        Cache => &[Database, ObjectStore],
        Cdn => &[ObjectStore],
        Database | ObjectStore => &[],
    }
}

pub fn can_connect(from: NodeKind, to: NodeKind) -> bool {
    allowed_targets(from).contains(&to)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryNode {
    pub position: GridPos,
    pub outgoing: BTreeSet<NodeId>,
}

/// The entry node plus every placed service, keyed by id so iteration
/// order is stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    entry: EntryNode,
    nodes: BTreeMap<NodeId, ServiceNode>,
    next_id: u32,
}

impl Topology {
    pub fn new(entry_position: GridPos) -> Self {
        Self {
            entry: EntryNode { position: entry_position, outgoing: BTreeSet::new() },
            nodes: BTreeMap::new(),
            next_id: 1,
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn entry(&self) -> &EntryNode {
        &self.entry
    }

    pub fn get(&self, id: NodeId) -> Option<&ServiceNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ServiceNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.is_entry() || self.nodes.contains_key(&id)
    }

    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        if id.is_entry() {
            Some(NodeKind::Entry)
        } else {
            self.nodes.get(&id).map(|n| n.kind)
        }
    }

    pub fn position_of(&self, id: NodeId) -> Option<GridPos> {
        if id.is_entry() {
            Some(self.entry.position)
        } else {
            self.nodes.get(&id).map(|n| n.position)
        }
    }

    pub fn outgoing(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        if id.is_entry() {
            Some(&self.entry.outgoing)
        } else {
            self.nodes.get(&id).map(|n| &n.outgoing)
        }
    }

    /// Outgoing neighbours of `id` that still exist, ascending.
    pub fn neighbours(&self, id: NodeId) -> Vec<NodeId> {
        self.outgoing(id)
            .map(|out| out.iter().copied().filter(|n| self.nodes.contains_key(n)).collect())
            .unwrap_or_default()
    }

    /// Existing outgoing neighbours of `id` whose kind satisfies `pred`, ascending.
    pub fn neighbours_where(&self, id: NodeId, pred: impl Fn(NodeKind) -> bool) -> Vec<NodeId> {
        self.neighbours(id)
            .into_iter()
            .filter(|n| self.kind_of(*n).is_some_and(&pred))
            .collect()
    }

    pub fn is_occupied(&self, position: GridPos) -> bool {
        self.entry.position == position || self.nodes.values().any(|n| n.position == position)
    }

    /// Every edge in the graph, derived from the outgoing sets.
    pub fn connections(&self) -> Vec<Connection> {
        let from_entry = self.entry.outgoing.iter().map(|to| Connection { from: NodeId::ENTRY, to: *to });
        let from_services = self
            .nodes
            .values()
            .flat_map(|n| n.outgoing.iter().map(move |to| Connection { from: n.id, to: *to }));
        from_entry.chain(from_services).collect()
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    pub fn add_node(&mut self, kind: NodeKind, position: GridPos) -> Result<NodeId, Rejected> {
        if kind == NodeKind::Entry {
            return Err(Rejected::EntryImmutable);
        }
        if self.is_occupied(position) {
            return Err(Rejected::OccupiedPosition(position));
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, ServiceNode::new(id, kind, position));
        Ok(id)
    }

    /// Insert a node with a pre-assigned id (save restore). Edges are added
    /// separately once every node exists.
    pub(crate) fn insert_restored(&mut self, node: ServiceNode) {
        self.next_id = self.next_id.max(node.id.0 + 1);
        self.nodes.insert(node.id, node);
    }

    /// Remove a node and strip it from every outgoing set, the entry's included.
    pub fn remove_node(&mut self, id: NodeId) -> Result<ServiceNode, Rejected> {
        if id.is_entry() {
            return Err(Rejected::EntryImmutable);
        }
        let node = self.nodes.remove(&id).ok_or(Rejected::UnknownNode(id))?;
        self.entry.outgoing.remove(&id);
        for other in self.nodes.values_mut() {
            other.outgoing.remove(&id);
        }
        Ok(node)
    }

    pub fn add_connection(&mut self, from: NodeId, to: NodeId) -> Result<(), Rejected> {
        if from == to {
            return Err(Rejected::SelfLoop(from));
        }
        let from_kind = self.kind_of(from).ok_or(Rejected::UnknownNode(from))?;
        let to_kind = self.kind_of(to).ok_or(Rejected::UnknownNode(to))?;
        if !can_connect(from_kind, to_kind) {
            return Err(Rejected::InvalidTopology { from: from_kind, to: to_kind });
        }
        let outgoing = self.outgoing_mut(from).ok_or(Rejected::UnknownNode(from))?;
        if !outgoing.insert(to) {
            return Err(Rejected::Duplicate { from, to });
        }
        Ok(())
    }

    pub fn remove_connection(&mut self, from: NodeId, to: NodeId) -> Result<(), Rejected> {
        let outgoing = self.outgoing_mut(from).ok_or(Rejected::UnknownNode(from))?;
        if outgoing.remove(&to) {
            Ok(())
        } else {
            Err(Rejected::UnknownConnection { from, to })
        }
    }

    fn outgoing_mut(&mut self, id: NodeId) -> Option<&mut BTreeSet<NodeId>> {
        if id.is_entry() {
            Some(&mut self.entry.outgoing)
        } else {
            self.nodes.get_mut(&id).map(|n| &mut n.outgoing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        Topology::new(GridPos::new(-10, 0))
    }

    #[test]
    fn entry_cell_counts_as_occupied() {
        let mut t = topology();
        assert_eq!(
            t.add_node(NodeKind::Firewall, GridPos::new(-10, 0)),
            Err(Rejected::OccupiedPosition(GridPos::new(-10, 0)))
        );
        let fw = t.add_node(NodeKind::Firewall, GridPos::new(-6, 0)).unwrap();
        assert_eq!(fw, NodeId(1));
        assert!(t.add_node(NodeKind::Compute, GridPos::new(-6, 0)).is_err());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn validity_table_is_directional() {
        let mut t = topology();
        let lb = t.add_node(NodeKind::LoadBalancer, GridPos::new(0, 0)).unwrap();
        let compute = t.add_node(NodeKind::Compute, GridPos::new(4, 0)).unwrap();
        let db = t.add_node(NodeKind::Database, GridPos::new(8, 0)).unwrap();

        t.add_connection(NodeId::ENTRY, lb).unwrap();
        t.add_connection(lb, compute).unwrap();
        t.add_connection(compute, db).unwrap();

        assert_eq!(
            t.add_connection(db, compute),
            Err(Rejected::InvalidTopology { from: NodeKind::Database, to: NodeKind::Compute })
        );
        assert_eq!(t.add_connection(NodeId::ENTRY, compute), Err(Rejected::InvalidTopology {
            from: NodeKind::Entry,
            to: NodeKind::Compute,
        }));
        assert_eq!(t.add_connection(lb, compute), Err(Rejected::Duplicate { from: lb, to: compute }));
        assert_eq!(t.add_connection(lb, lb), Err(Rejected::SelfLoop(lb)));
        assert_eq!(t.add_connection(lb, NodeId(99)), Err(Rejected::UnknownNode(NodeId(99))));
        assert_eq!(t.connections().len(), 3);
    }

    #[test]
    fn removal_cascades_through_entry() {
        let mut t = topology();
        let fw = t.add_node(NodeKind::Firewall, GridPos::new(0, 0)).unwrap();
        let lb = t.add_node(NodeKind::LoadBalancer, GridPos::new(4, 0)).unwrap();
        t.add_connection(NodeId::ENTRY, fw).unwrap();
        t.add_connection(NodeId::ENTRY, lb).unwrap();
        t.add_connection(fw, lb).unwrap();

        t.remove_node(lb).unwrap();
        assert!(t.entry().outgoing.contains(&fw));
        assert!(!t.entry().outgoing.contains(&lb));
        assert!(t.get(fw).unwrap().outgoing.is_empty());
        assert_eq!(t.connections(), vec![Connection { from: NodeId::ENTRY, to: fw }]);
        assert_eq!(t.remove_node(NodeId::ENTRY).unwrap_err(), Rejected::EntryImmutable);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut t = topology();
        let a = t.add_node(NodeKind::Cache, GridPos::new(0, 0)).unwrap();
        t.remove_node(a).unwrap();
        let b = t.add_node(NodeKind::Cache, GridPos::new(0, 0)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn disconnect_unknown_edge() {
        let mut t = topology();
        let fw = t.add_node(NodeKind::Firewall, GridPos::new(0, 0)).unwrap();
        assert_eq!(
            t.remove_connection(NodeId::ENTRY, fw),
            Err(Rejected::UnknownConnection { from: NodeId::ENTRY, to: fw })
        );
    }

    #[test]
    fn neighbour_filter_by_kind() {
        let mut t = topology();
        let compute = t.add_node(NodeKind::Compute, GridPos::new(0, 0)).unwrap();
        let cache = t.add_node(NodeKind::Cache, GridPos::new(2, 0)).unwrap();
        let db = t.add_node(NodeKind::Database, GridPos::new(4, 0)).unwrap();
        t.add_connection(compute, db).unwrap();
        t.add_connection(compute, cache).unwrap();
        assert_eq!(t.neighbours(compute), vec![cache, db]);
        assert_eq!(t.neighbours_where(compute, |k| k == NodeKind::Database), vec![db]);
    }
}
