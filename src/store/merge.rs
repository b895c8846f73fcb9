//! Reconciles snapshot fetches and live update events into one consistent
//! store. Snapshots replace membership wholesale but carry pinned positions
//! and the focus flag across by node id; live events are guarded by
//! per-element sequence floors so out-of-order delivery converges to the
//! highest-sequence state.

use std::collections::HashMap;

use log::{debug, warn};

use crate::model::{EdgeKey, Snapshot};
use crate::remote::live::{GraphChange, LiveEvent};
use crate::store::GraphStore;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum SeqKey {
    Node(String),
    Edge(EdgeKey),
}

/// Counters describing one applied snapshot or event, so the caller knows
/// whether to rebuild the layout index and re-energize the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_updated: usize,
    pub edges_removed: usize,
    pub dangling_dropped: usize,
    pub stale_discarded: usize,
    /// Set by `snapshotInvalidated`: the caller should refetch at the
    /// current focus and depth while the stale graph keeps rendering.
    pub snapshot_invalidated: bool,
}

impl MergeOutcome {
    pub fn membership_changed(&self) -> bool {
        self.nodes_added > 0
            || self.nodes_removed > 0
            || self.edges_added > 0
            || self.edges_removed > 0
    }
}

/// The only writer of the store besides direct user interaction. Sequence
/// floors survive element removal so a stale upsert arriving after a remove
/// cannot resurrect it.
#[derive(Default)]
pub struct MergeEngine {
    seq_floor: HashMap<SeqKey, u64>,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the store's membership with a snapshot. Layout state
    /// (position, velocity, pin) and the focus flag carry across for any
    /// node id present in both old and new graphs.
    pub fn apply_snapshot(&mut self, store: &mut GraphStore, snapshot: Snapshot) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        let mut next = GraphStore::new();
        for mut node in snapshot.nodes {
            node.sanitize();
            let id = node.id.clone();
            let seq = store.node(&id).map_or(0, |state| state.last_seq);

            if !next.upsert_node(node, seq, false) {
                // Duplicate id inside one snapshot; last write already won.
                outcome.nodes_updated += 1;
                continue;
            }

            if let Some(previous) = store.node(&id) {
                outcome.nodes_updated += 1;
                let carried = next.node_mut(&id).map(|state| {
                    state.pos = previous.pos;
                    state.vel = previous.vel;
                    state.pinned = previous.pinned;
                });
                debug_assert!(carried.is_some());
            } else {
                outcome.nodes_added += 1;
            }
        }

        for edge in snapshot.edges {
            let key = edge.key();
            let seq = store.edge(&key).map_or(0, |state| state.last_seq);
            match next.upsert_edge(edge, seq) {
                Some(true) => outcome.edges_added += 1,
                Some(false) => outcome.edges_updated += 1,
                None => outcome.dangling_dropped += 1,
            }
        }

        outcome.nodes_removed = store
            .nodes()
            .filter(|(id, _)| !next.contains_node(id))
            .count();
        outcome.edges_removed = store
            .edges()
            .filter(|(key, _)| next.edge(key).is_none())
            .count();

        let focus = store.focus().map(str::to_owned);
        let revision = store.revision().max(next.revision()).wrapping_add(1);
        *store = next;
        store.force_revision(revision);
        store.set_focus(focus.as_deref());

        debug!(
            "snapshot merged: +{}/{} nodes, +{}/{} edges, {} dangling dropped",
            outcome.nodes_added,
            outcome.nodes_updated,
            outcome.edges_added,
            outcome.edges_updated,
            outcome.dangling_dropped
        );
        outcome
    }

    /// Apply one live event. Stale events (sequence number below the floor
    /// recorded for that element) are discarded with no observable effect.
    pub fn apply_event(&mut self, store: &mut GraphStore, event: LiveEvent) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        match event.change {
            GraphChange::UpsertNode { node, clear_pin } => {
                let key = SeqKey::Node(node.id.clone());
                if self.is_stale(&key, event.seq) {
                    self.discard(&mut outcome, "node upsert", &node.id, event.seq);
                    return outcome;
                }
                self.seq_floor.insert(key, event.seq);

                if store.upsert_node(node, event.seq, clear_pin) {
                    outcome.nodes_added += 1;
                } else {
                    outcome.nodes_updated += 1;
                }
            }
            GraphChange::UpsertEdge { edge } => {
                let key = SeqKey::Edge(edge.key());
                if self.is_stale(&key, event.seq) {
                    self.discard(&mut outcome, "edge upsert", &edge.source, event.seq);
                    return outcome;
                }
                self.seq_floor.insert(key, event.seq);

                match store.upsert_edge(edge, event.seq) {
                    Some(true) => outcome.edges_added += 1,
                    Some(false) => outcome.edges_updated += 1,
                    None => outcome.dangling_dropped += 1,
                }
            }
            GraphChange::RemoveNode { id } => {
                let key = SeqKey::Node(id.clone());
                if self.is_stale(&key, event.seq) {
                    self.discard(&mut outcome, "node removal", &id, event.seq);
                    return outcome;
                }
                self.seq_floor.insert(key, event.seq);

                if let Some(removed_edges) = store.remove_node(&id) {
                    outcome.nodes_removed += 1;
                    outcome.edges_removed += removed_edges;
                }
            }
            GraphChange::RemoveEdge { key } => {
                let seq_key = SeqKey::Edge(key.clone());
                if self.is_stale(&seq_key, event.seq) {
                    self.discard(&mut outcome, "edge removal", &key.source, event.seq);
                    return outcome;
                }
                self.seq_floor.insert(seq_key, event.seq);

                if store.remove_edge(&key) {
                    outcome.edges_removed += 1;
                }
            }
            GraphChange::SnapshotInvalidated => {
                outcome.snapshot_invalidated = true;
            }
        }

        outcome
    }

    fn is_stale(&self, key: &SeqKey, seq: u64) -> bool {
        self.seq_floor.get(key).is_some_and(|&floor| seq < floor)
    }

    fn discard(&self, outcome: &mut MergeOutcome, what: &str, id: &str, seq: u64) {
        warn!("discarding stale {what} for {id:?} (seq {seq})");
        outcome.stale_discarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node, NodeKind};
    use crate::remote::live::{GraphChange, LiveEvent};
    use eframe::egui::vec2;

    fn concept(id: &str) -> Node {
        Node::new(id, id, NodeKind::Concept)
    }

    fn upsert_node(seq: u64, node: Node) -> LiveEvent {
        LiveEvent {
            seq,
            change: GraphChange::UpsertNode {
                node,
                clear_pin: false,
            },
        }
    }

    fn snapshot(nodes: &[&str], edges: &[(&str, &str, f32)]) -> Snapshot {
        Snapshot {
            nodes: nodes.iter().map(|id| concept(id)).collect(),
            edges: edges
                .iter()
                .map(|(source, target, weight)| Edge::new(*source, *target, "related", *weight))
                .collect(),
        }
    }

    #[test]
    fn pinned_position_survives_snapshot_replacement() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_snapshot(&mut store, snapshot(&["AI", "ML"], &[("ML", "AI", 0.9)]));
        store.set_position("ML", vec2(100.0, 100.0));
        store.set_pinned("ML", true);
        store.set_focus(Some("ML"));

        let outcome =
            merge.apply_snapshot(&mut store, snapshot(&["ML", "DL"], &[("DL", "ML", 0.8)]));
        assert_eq!(outcome.nodes_added, 1);
        assert_eq!(outcome.nodes_removed, 1);

        let ml = store.node("ML").expect("ML carried across");
        assert!(ml.pinned);
        assert_eq!(ml.pos, Some(vec2(100.0, 100.0)));
        assert_eq!(store.focus(), Some("ML"));
        assert!(!store.contains_node("AI"));
    }

    #[test]
    fn snapshot_replacement_always_advances_the_revision() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_snapshot(&mut store, snapshot(&["AI", "ML"], &[]));
        let first = store.revision();

        // Same node count, different membership; caches keyed on the
        // revision must still notice.
        merge.apply_snapshot(&mut store, snapshot(&["DL", "NN"], &[]));
        assert!(store.revision() > first);
    }

    #[test]
    fn out_of_order_upserts_converge_to_highest_seq() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        let newest = Node::new("AI", "Artificial Intelligence", NodeKind::Topic);
        let older = Node::new("AI", "A.I.", NodeKind::Concept);

        merge.apply_event(&mut store, upsert_node(7, newest.clone()));
        let outcome = merge.apply_event(&mut store, upsert_node(3, older));
        assert_eq!(outcome.stale_discarded, 1);

        let state = store.node("AI").expect("node present");
        assert_eq!(state.node.label, newest.label);
        assert_eq!(state.node.kind, NodeKind::Topic);
    }

    #[test]
    fn stale_upsert_cannot_resurrect_removed_node() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_event(&mut store, upsert_node(4, concept("TensorFlow")));
        merge.apply_event(
            &mut store,
            LiveEvent {
                seq: 9,
                change: GraphChange::RemoveNode {
                    id: "TensorFlow".to_owned(),
                },
            },
        );
        let outcome = merge.apply_event(&mut store, upsert_node(6, concept("TensorFlow")));
        assert_eq!(outcome.stale_discarded, 1);
        assert!(!store.contains_node("TensorFlow"));
    }

    #[test]
    fn removing_focus_node_clears_focus_without_reassigning() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_snapshot(
            &mut store,
            snapshot(&["AI", "ML", "TensorFlow"], &[("TensorFlow", "ML", 0.6)]),
        );
        store.set_focus(Some("TensorFlow"));

        let outcome = merge.apply_event(
            &mut store,
            LiveEvent {
                seq: 1,
                change: GraphChange::RemoveNode {
                    id: "TensorFlow".to_owned(),
                },
            },
        );
        assert_eq!(outcome.nodes_removed, 1);
        assert_eq!(outcome.edges_removed, 1);
        assert_eq!(store.focus(), None);
    }

    #[test]
    fn live_upsert_never_moves_pinned_position() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_event(&mut store, upsert_node(1, concept("ML")));
        store.set_position("ML", vec2(42.0, -17.0));
        store.set_pinned("ML", true);

        merge.apply_event(
            &mut store,
            upsert_node(2, Node::new("ML", "Machine Learning", NodeKind::Concept)),
        );

        let state = store.node("ML").expect("node present");
        assert_eq!(state.pos, Some(vec2(42.0, -17.0)));
        assert!(state.pinned);
        assert_eq!(state.node.label, "Machine Learning");
    }

    #[test]
    fn dangling_live_edge_is_counted_not_applied() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_event(&mut store, upsert_node(1, concept("AI")));
        let outcome = merge.apply_event(
            &mut store,
            LiveEvent {
                seq: 2,
                change: GraphChange::UpsertEdge {
                    edge: Edge::new("AI", "Missing", "related", 0.4),
                },
            },
        );
        assert_eq!(outcome.dangling_dropped, 1);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn snapshot_invalidated_is_surfaced_without_mutation() {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();

        merge.apply_event(&mut store, upsert_node(1, concept("AI")));
        let outcome = merge.apply_event(
            &mut store,
            LiveEvent {
                seq: 2,
                change: GraphChange::SnapshotInvalidated,
            },
        );
        assert!(outcome.snapshot_invalidated);
        assert!(!outcome.membership_changed());
        assert!(store.contains_node("AI"));
    }
}
