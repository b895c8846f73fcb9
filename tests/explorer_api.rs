//! End-to-end tests of the exploration pipeline: fetch a snapshot from a
//! service, merge it into the store, apply live updates, and run the layout
//! headlessly.

use kg_atlas::model::{Edge, Node, NodeKind, Snapshot};
use kg_atlas::remote::live::{
    ChannelMessage, ConnectionStatus, GraphChange, LiveChannel, LiveEvent,
};
use kg_atlas::remote::mock::MockGraphService;
use kg_atlas::remote::{truncate_snapshot, GraphService};
use kg_atlas::sim::{LayoutFilter, LayoutIndex, SimConfig, Simulation};
use kg_atlas::store::merge::MergeEngine;
use kg_atlas::store::GraphStore;

fn settle(store: &mut GraphStore, config: &SimConfig) -> Simulation {
    let mut sim = Simulation::new();
    let layout = LayoutIndex::build(store, &LayoutFilter::default());
    for _ in 0..config.max_ticks {
        if !sim.tick(store, &layout, config, 1.0 / 60.0) {
            break;
        }
    }
    sim
}

#[test]
fn overview_fetch_merges_and_settles() {
    let service = MockGraphService::sample();
    let snapshot = service.fetch_overview(None).unwrap();
    let node_total = snapshot.nodes.len();
    let edge_total = snapshot.edges.len();

    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    let outcome = merge.apply_snapshot(&mut store, snapshot);

    assert_eq!(outcome.nodes_added, node_total);
    assert_eq!(outcome.edges_added, edge_total);
    assert_eq!(store.node_count(), node_total);

    let config = SimConfig::default();
    let sim = settle(&mut store, &config);
    assert!(sim.is_settled(&config), "layout should settle under budget");

    for (id, state) in store.nodes() {
        let pos = state.pos.unwrap_or_else(|| panic!("{id} has no position"));
        assert!(pos.x.is_finite() && pos.y.is_finite(), "{id} diverged");
    }
}

#[test]
fn refocus_fetch_preserves_pinned_layout() {
    let service = MockGraphService::sample();
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    merge.apply_snapshot(&mut store, service.fetch_overview(None).unwrap());

    let config = SimConfig::default();
    settle(&mut store, &config);

    store.set_position("Machine Learning", eframe::egui::vec2(250.0, -80.0));
    store.set_pinned("Machine Learning", true);

    let neighborhood = service
        .fetch_neighborhood("Machine Learning", 2, None)
        .unwrap();
    merge.apply_snapshot(&mut store, neighborhood);

    let state = store.node("Machine Learning").unwrap();
    assert!(state.pinned, "pin must survive a refocus fetch");
    let pos = state.pos.unwrap();
    assert!((pos.x - 250.0).abs() < f32::EPSILON);
    assert!((pos.y + 80.0).abs() < f32::EPSILON);
}

#[test]
fn reapplied_snapshot_does_not_duplicate() {
    // A reconnect typically replays the same snapshot; membership must not
    // grow and the outcome must report updates rather than additions.
    let service = MockGraphService::sample();
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();

    let first = service.fetch_overview(None).unwrap();
    merge.apply_snapshot(&mut store, first.clone());
    let baseline_nodes = store.node_count();
    let baseline_edges = store.edge_count();

    let outcome = merge.apply_snapshot(&mut store, first);
    assert_eq!(store.node_count(), baseline_nodes);
    assert_eq!(store.edge_count(), baseline_edges);
    assert_eq!(outcome.nodes_added, 0);
    assert_eq!(outcome.nodes_removed, 0);
}

#[test]
fn live_events_across_reconnect_converge() {
    let service = MockGraphService::sample();
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    merge.apply_snapshot(&mut store, service.fetch_overview(None).unwrap());

    let added = Node::new("Diffusion Models", "Diffusion Models", NodeKind::Concept);
    merge.apply_event(
        &mut store,
        LiveEvent {
            seq: 12,
            change: GraphChange::UpsertNode {
                node: added.clone(),
                clear_pin: false,
            },
        },
    );
    merge.apply_event(
        &mut store,
        LiveEvent {
            seq: 13,
            change: GraphChange::UpsertEdge {
                edge: Edge::new(
                    "Diffusion Models",
                    "Deep Learning",
                    "built_on",
                    0.8,
                ),
            },
        },
    );
    assert!(store.contains_node("Diffusion Models"));

    merge.apply_event(
        &mut store,
        LiveEvent {
            seq: 15,
            change: GraphChange::RemoveNode {
                id: "Diffusion Models".to_owned(),
            },
        },
    );
    assert!(!store.contains_node("Diffusion Models"));

    // A reconnect replays an older upsert for the removed node; the
    // sequence floor must keep it from resurrecting.
    let outcome = merge.apply_event(
        &mut store,
        LiveEvent {
            seq: 12,
            change: GraphChange::UpsertNode {
                node: added,
                clear_pin: false,
            },
        },
    );
    assert_eq!(outcome.stale_discarded, 1);
    assert!(!store.contains_node("Diffusion Models"));
}

#[test]
fn disconnect_status_is_reported_without_losing_applied_state() {
    let service = MockGraphService::sample();
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    merge.apply_snapshot(&mut store, service.fetch_overview(None).unwrap());

    let (tx, channel) = LiveChannel::from_parts();
    tx.send(ChannelMessage::Status(ConnectionStatus::Connected))
        .unwrap();
    tx.send(ChannelMessage::Event(LiveEvent {
        seq: 21,
        change: GraphChange::UpsertNode {
            node: Node::new("AlphaFold", "AlphaFold", NodeKind::Concept),
            clear_pin: false,
        },
    }))
    .unwrap();
    // The worker loses the connection after delivering the event.
    tx.send(ChannelMessage::Status(ConnectionStatus::Disconnected))
        .unwrap();

    let mut status = None;
    for message in channel.poll() {
        match message {
            ChannelMessage::Status(next) => status = Some(next),
            ChannelMessage::Event(event) => {
                merge.apply_event(&mut store, event);
            }
        }
    }

    assert_eq!(status, Some(ConnectionStatus::Disconnected));
    assert!(
        store.contains_node("AlphaFold"),
        "a disconnect must not undo already-applied events"
    );

    // Reconnect: the status flips back and later events keep applying.
    tx.send(ChannelMessage::Status(ConnectionStatus::Connected))
        .unwrap();
    tx.send(ChannelMessage::Event(LiveEvent {
        seq: 22,
        change: GraphChange::UpsertEdge {
            edge: Edge::new("AlphaFold", "Deep Learning", "built_on", 0.8),
        },
    }))
    .unwrap();
    for message in channel.poll() {
        match message {
            ChannelMessage::Status(next) => status = Some(next),
            ChannelMessage::Event(event) => {
                merge.apply_event(&mut store, event);
            }
        }
    }
    assert_eq!(status, Some(ConnectionStatus::Connected));
    assert_eq!(store.node_count(), service.fetch_overview(None).unwrap().nodes.len() + 1);
}

#[test]
fn snapshot_invalidated_event_is_surfaced() {
    let service = MockGraphService::sample();
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    merge.apply_snapshot(&mut store, service.fetch_overview(None).unwrap());

    let outcome = merge.apply_event(
        &mut store,
        LiveEvent {
            seq: 99,
            change: GraphChange::SnapshotInvalidated,
        },
    );
    assert!(outcome.snapshot_invalidated);
    assert!(!outcome.membership_changed());
}

#[test]
fn truncation_keeps_focus_and_consistent_edges() {
    let service = MockGraphService::sample();
    let mut snapshot: Snapshot = service.fetch_overview(None).unwrap();
    truncate_snapshot(&mut snapshot, Some("TensorFlow"), 5);

    assert_eq!(snapshot.nodes.len(), 5);
    assert!(snapshot.nodes.iter().any(|node| node.id == "TensorFlow"));

    // Every surviving edge must connect surviving nodes; merging must drop
    // nothing as dangling.
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    let outcome = merge.apply_snapshot(&mut store, snapshot);
    assert_eq!(outcome.dangling_dropped, 0);
}

#[test]
fn membership_change_reheats_a_settled_layout() {
    let service = MockGraphService::sample();
    let mut store = GraphStore::new();
    let mut merge = MergeEngine::new();
    merge.apply_snapshot(&mut store, service.fetch_overview(None).unwrap());

    let config = SimConfig::default();
    let mut sim = settle(&mut store, &config);
    assert!(sim.is_settled(&config));

    let outcome = merge.apply_event(
        &mut store,
        LiveEvent {
            seq: 40,
            change: GraphChange::UpsertNode {
                node: Node::new("AlphaGo", "AlphaGo", NodeKind::Event),
                clear_pin: false,
            },
        },
    );
    assert!(outcome.membership_changed());

    sim.reheat(0.6);
    let layout = LayoutIndex::build(&store, &LayoutFilter::default());
    assert!(
        sim.tick(&mut store, &layout, &config, 1.0 / 60.0),
        "a reheated layout must move again"
    );
    assert!(store.node("AlphaGo").unwrap().pos.is_some());
}
