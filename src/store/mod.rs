//! The graph data store: authoritative node/edge membership plus the local
//! layout state (positions, pins, focus) that must survive snapshot merges.

pub mod merge;

use std::collections::HashMap;

use eframe::egui::Vec2;
use log::warn;

use crate::model::{Edge, EdgeKey, Node};

/// A node plus its local layout state. Positions start as `None` and are
/// assigned by the simulation (or by a user drag) in world coordinates.
#[derive(Clone, Debug)]
pub struct NodeState {
    pub node: Node,
    pub pos: Option<Vec2>,
    pub vel: Vec2,
    pub pinned: bool,
    pub last_seq: u64,
}

impl NodeState {
    fn new(node: Node) -> Self {
        Self {
            node,
            pos: None,
            vel: Vec2::ZERO,
            pinned: false,
            last_seq: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EdgeState {
    pub edge: Edge,
    pub last_seq: u64,
}

/// Owned store object; all mutation goes through these methods (or the
/// merge engine built on them), never through ambient globals. `revision`
/// advances on every node/edge mutation, including in-place weight
/// updates, so layout caches can rebuild. Pure view state (positions,
/// pins, focus) does not touch it.
#[derive(Default)]
pub struct GraphStore {
    nodes: HashMap<String, NodeState>,
    edges: HashMap<EdgeKey, EdgeState>,
    focus: Option<String>,
    revision: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Keeps revisions monotonic when the merge engine swaps in a rebuilt
    /// store; a rebuilt store's own counter restarts from zero.
    pub(in crate::store) fn force_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeState> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeState> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&String, &NodeState)> {
        self.nodes.iter()
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&EdgeState> {
        self.edges.get(key)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&EdgeKey, &EdgeState)> {
        self.edges.iter()
    }

    pub fn incident_edges<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = (&'a EdgeKey, &'a EdgeState)> {
        self.edges.iter().filter(move |(key, _)| key.touches(node_id))
    }

    /// Strongest edge weight touching `node_id`. Used by the deterministic
    /// truncation ranking and by the details panel.
    pub fn strongest_incident_weight(&self, node_id: &str) -> f32 {
        self.incident_edges(node_id)
            .map(|(_, state)| state.edge.weight)
            .fold(0.0_f32, f32::max)
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    /// At most one node holds the focus flag; pointing it at a new node
    /// implicitly clears the previous holder. Focusing an unknown id is a
    /// no-op clear rather than an error.
    pub fn set_focus(&mut self, focus: Option<&str>) {
        self.focus = match focus {
            Some(id) if self.nodes.contains_key(id) => Some(id.to_owned()),
            Some(id) => {
                warn!("focus target {id:?} is not in the store; clearing focus");
                None
            }
            None => None,
        };
    }

    pub fn set_pinned(&mut self, id: &str, pinned: bool) {
        if let Some(state) = self.nodes.get_mut(id) {
            state.pinned = pinned;
            if pinned {
                state.vel = Vec2::ZERO;
            }
        }
    }

    pub fn pinned_ids(&self) -> Vec<String> {
        let mut ids = self
            .nodes
            .iter()
            .filter(|(_, state)| state.pinned)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn release_all_pins(&mut self) {
        for state in self.nodes.values_mut() {
            state.pinned = false;
        }
    }

    /// Direct position override from a drag. Zeroes velocity so the
    /// simulation does not fling the node when it is later unpinned.
    pub fn set_position(&mut self, id: &str, pos: Vec2) {
        if let Some(state) = self.nodes.get_mut(id) {
            state.pos = Some(pos);
            state.vel = Vec2::ZERO;
        }
    }

    /// Insert or update a node. An existing id keeps its layout state
    /// (position, velocity, pin) unless `clear_pin` is set; only the node
    /// data is replaced. Returns whether the id was new.
    pub fn upsert_node(&mut self, mut node: Node, seq: u64, clear_pin: bool) -> bool {
        node.sanitize();
        match self.nodes.get_mut(&node.id) {
            Some(state) => {
                state.node = node;
                state.last_seq = seq;
                if clear_pin {
                    state.pinned = false;
                }
                // Weight changes feed spring strength and radii, so even an
                // in-place update invalidates the layout index.
                self.revision = self.revision.wrapping_add(1);
                false
            }
            None => {
                let mut state = NodeState::new(node);
                state.last_seq = seq;
                self.nodes.insert(state.node.id.clone(), state);
                self.revision = self.revision.wrapping_add(1);
                true
            }
        }
    }

    /// Insert or update an edge. Edges referencing a missing endpoint are
    /// dropped (logged, never an error) to keep the referential-integrity
    /// invariant. Returns `None` for a dropped edge, otherwise whether the
    /// key was new.
    pub fn upsert_edge(&mut self, mut edge: Edge, seq: u64) -> Option<bool> {
        edge.sanitize();
        if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
            warn!(
                "dropping dangling edge {} -[{}]-> {}",
                edge.source, edge.label, edge.target
            );
            return None;
        }

        let key = edge.key();
        let was_new = match self.edges.get_mut(&key) {
            Some(state) => {
                state.edge = edge;
                state.last_seq = seq;
                self.revision = self.revision.wrapping_add(1);
                false
            }
            None => {
                self.edges.insert(key, EdgeState { edge, last_seq: seq });
                self.revision = self.revision.wrapping_add(1);
                true
            }
        };
        Some(was_new)
    }

    /// Remove a node and every edge referencing it. Removing the focus node
    /// clears the focus flag without reassigning it. Returns the number of
    /// incident edges removed, or `None` if the id was unknown.
    pub fn remove_node(&mut self, id: &str) -> Option<usize> {
        self.nodes.remove(id)?;

        let before = self.edges.len();
        self.edges.retain(|key, _| !key.touches(id));
        let removed_edges = before - self.edges.len();

        if self.focus.as_deref() == Some(id) {
            self.focus = None;
        }
        self.revision = self.revision.wrapping_add(1);
        Some(removed_edges)
    }

    pub fn remove_edge(&mut self, key: &EdgeKey) -> bool {
        let removed = self.edges.remove(key).is_some();
        if removed {
            self.revision = self.revision.wrapping_add(1);
        }
        removed
    }
}
