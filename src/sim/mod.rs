//! Force-directed layout over the graph store. The simulation advances in
//! discrete per-frame ticks with a decaying energy budget: once the energy
//! drops below the settle threshold (or the tick cap is hit) further ticks
//! are no-ops until something reheats it — new membership or a user drag.
//!
//! Forces per tick: Barnes-Hut pairwise repulsion, springs along edges
//! whose rest length shrinks with relationship weight, a centering pull,
//! and collision separation from node radii. Pinned nodes receive no
//! integration but still act as anchors on their neighbors.

mod forces;
mod quadtree;

use std::collections::{HashMap, HashSet};

use eframe::egui::{vec2, Vec2};

use crate::model::NodeKind;
use crate::store::{GraphStore, NodeState};
use crate::util::stable_pair;
use forces::{collision_on, repulsion_on};
use quadtree::QuadTree;

const BARNES_HUT_THETA: f32 = 0.7;
const REPULSION_SOFTENING: f32 = 80.0;
const MAX_FORCE: f32 = 220.0;
const MAX_SPEED: f32 = 24.0;

/// Tunable parameters, adjustable live from the controls panel.
#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub repulsion: f32,
    pub spring: f32,
    pub center_pull: f32,
    pub collision: f32,
    pub velocity_damping: f32,
    pub energy_decay: f32,
    pub settle_threshold: f32,
    pub max_ticks: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            repulsion: 2400.0,
            spring: 0.14,
            center_pull: 0.025,
            collision: 0.85,
            velocity_damping: 0.82,
            energy_decay: 0.975,
            settle_threshold: 0.02,
            max_ticks: 400,
        }
    }
}

/// View-side membership filter: shapes what is simulated and rendered
/// without deleting anything from the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutFilter {
    pub min_edge_weight: f32,
    pub hidden_kinds: HashSet<NodeKind>,
}

impl LayoutFilter {
    pub fn shows_node(&self, state: &NodeState) -> bool {
        !self.hidden_kinds.contains(&state.node.kind)
    }
}

/// Indexed view of the store for the simulation and renderer: a stable
/// (sorted) node order, spring list and per-node radii. Rebuilt whenever
/// the store revision or the filter changes.
pub struct LayoutIndex {
    pub ids: Vec<String>,
    pub index_by_id: HashMap<String, usize>,
    /// Undirected springs: node indices plus the strongest weight between
    /// the pair (parallel edges collapse to one spring).
    pub springs: Vec<(usize, usize, f32)>,
    pub radii: Vec<f32>,
    pub store_revision: u64,
}

impl LayoutIndex {
    pub fn build(store: &GraphStore, filter: &LayoutFilter) -> Self {
        let mut ids = store
            .nodes()
            .filter(|(_, state)| filter.shows_node(state))
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        // Sorted order keeps tick results reproducible across runs.
        ids.sort();

        let mut index_by_id = HashMap::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            index_by_id.insert(id.clone(), index);
        }

        let radii = ids
            .iter()
            .map(|id| store.node(id).map_or(8.0, |state| node_radius(state.node.weight)))
            .collect::<Vec<_>>();

        let mut strongest: HashMap<(usize, usize), f32> = HashMap::new();
        for (key, state) in store.edges() {
            if state.edge.weight < filter.min_edge_weight {
                continue;
            }
            let (Some(&a), Some(&b)) = (index_by_id.get(&key.source), index_by_id.get(&key.target))
            else {
                continue;
            };
            if a == b {
                continue;
            }
            let pair = (a.min(b), a.max(b));
            let entry = strongest.entry(pair).or_insert(0.0);
            *entry = entry.max(state.edge.weight);
        }
        let mut springs = strongest
            .into_iter()
            .map(|((a, b), weight)| (a, b, weight))
            .collect::<Vec<_>>();
        springs.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));

        Self {
            ids,
            index_by_id,
            springs,
            radii,
            store_revision: store.revision(),
        }
    }

    pub fn is_stale(&self, store: &GraphStore) -> bool {
        self.store_revision != store.revision()
    }
}

/// Radius in world units derived from the node's visual weight hint. Shared
/// by collision forces and rendering so the two agree on overlap.
pub fn node_radius(weight: f32) -> f32 {
    6.0 + weight.clamp(0.1, 10.0).sqrt() * 5.0
}

#[derive(Default)]
struct Scratch {
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    forces: Vec<Vec2>,
    masses: Vec<f32>,
    pinned: Vec<bool>,
}

pub struct Simulation {
    energy: f32,
    ticks: u32,
    scratch: Scratch,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            energy: 1.0,
            ticks: 0,
            scratch: Scratch::default(),
        }
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn is_settled(&self, config: &SimConfig) -> bool {
        self.energy < config.settle_threshold
    }

    /// Raise the energy back to at least `amount` and restart the tick
    /// budget. Called on membership changes and during drags.
    pub fn reheat(&mut self, amount: f32) {
        self.energy = self.energy.max(amount.clamp(0.0, 1.0));
        self.ticks = 0;
    }

    /// Advance one tick. Returns true while the layout is still moving, so
    /// the caller knows to schedule another frame. Settled simulations
    /// return immediately.
    pub fn tick(
        &mut self,
        store: &mut GraphStore,
        layout: &LayoutIndex,
        config: &SimConfig,
        dt: f32,
    ) -> bool {
        let count = layout.ids.len();
        if count == 0 || self.is_settled(config) {
            return false;
        }

        self.gather(store, layout, count);
        let scratch = &mut self.scratch;

        let tree = QuadTree::build(&scratch.positions, &scratch.masses);
        let max_radius = layout.radii.iter().fold(0.0_f32, |acc, r| acc.max(*r));

        for index in 0..count {
            if scratch.pinned[index] {
                continue;
            }
            let mut force = Vec2::ZERO;
            if let Some(tree) = &tree {
                force += repulsion_on(
                    tree,
                    index,
                    &scratch.positions,
                    &scratch.masses,
                    config.repulsion,
                    REPULSION_SOFTENING,
                    BARNES_HUT_THETA,
                );
                force += collision_on(
                    tree,
                    index,
                    &scratch.positions,
                    &layout.radii,
                    max_radius,
                    config.collision,
                );
            }
            force -= scratch.positions[index] * config.center_pull;
            scratch.forces[index] = force;
        }

        for &(a, b, weight) in &layout.springs {
            let delta = scratch.positions[a] - scratch.positions[b];
            let distance = delta.length().max(0.0001);
            let direction = delta / distance;

            // Stronger relationships want shorter links.
            let rest = layout.radii[a] + layout.radii[b] + 30.0 + (1.0 - weight) * 150.0;
            let pull = (distance - rest) * config.spring * weight;
            if !scratch.pinned[a] {
                scratch.forces[a] -= direction * pull;
            }
            if !scratch.pinned[b] {
                scratch.forces[b] += direction * pull;
            }
        }

        let time_step = (dt * 60.0).clamp(0.25, 3.0);
        let damping = config.velocity_damping.clamp(0.5, 0.99).powf(time_step);
        let mut any_motion = false;

        for index in 0..count {
            if scratch.pinned[index] {
                scratch.velocities[index] = Vec2::ZERO;
                continue;
            }

            let mut force = scratch.forces[index];
            let force_len = force.length();
            if force_len > MAX_FORCE {
                force *= MAX_FORCE / force_len;
            }

            let mut velocity =
                (scratch.velocities[index] + force * (0.06 * time_step * self.energy)) * damping;
            let speed = velocity.length();
            if speed > MAX_SPEED {
                velocity *= MAX_SPEED / speed;
            }

            let mut position = scratch.positions[index] + velocity * time_step;
            if !position.x.is_finite() || !position.y.is_finite() {
                // Pathological input; restart this node from its jitter seed
                // instead of letting NaN spread through the layout.
                position = initial_position(&layout.ids[index], count);
                velocity = Vec2::ZERO;
            }

            if velocity.length_sq() > 0.0004 {
                any_motion = true;
            }
            scratch.velocities[index] = velocity;
            scratch.positions[index] = position;
        }

        self.scatter(store, layout, count);

        self.energy *= config.energy_decay;
        self.ticks += 1;
        if self.ticks >= config.max_ticks || !any_motion {
            self.energy = 0.0;
        }

        !self.is_settled(config)
    }

    fn gather(&mut self, store: &mut GraphStore, layout: &LayoutIndex, count: usize) {
        let scratch = &mut self.scratch;
        scratch.positions.clear();
        scratch.velocities.clear();
        scratch.masses.clear();
        scratch.pinned.clear();
        scratch.forces.clear();
        scratch.forces.resize(count, Vec2::ZERO);

        for id in &layout.ids {
            let (pos, vel, pinned, mass) = match store.node_mut(id) {
                Some(state) => {
                    let pos = *state
                        .pos
                        .get_or_insert_with(|| initial_position(id, count));
                    (pos, state.vel, state.pinned, state.node.weight)
                }
                None => (initial_position(id, count), Vec2::ZERO, false, 1.0),
            };
            scratch.positions.push(pos);
            scratch.velocities.push(vel);
            scratch.pinned.push(pinned);
            scratch.masses.push(mass.max(0.1));
        }
    }

    fn scatter(&mut self, store: &mut GraphStore, layout: &LayoutIndex, count: usize) {
        let scratch = &self.scratch;
        for index in 0..count {
            if scratch.pinned[index] {
                continue;
            }
            if let Some(state) = store.node_mut(&layout.ids[index]) {
                state.pos = Some(scratch.positions[index]);
                state.vel = scratch.velocities[index];
            }
        }
    }
}

/// Deterministic spawn position: stable per-id jitter scaled to the rough
/// footprint of the current node count.
pub fn initial_position(id: &str, count: usize) -> Vec2 {
    let (jx, jy) = stable_pair(id);
    let radius = 40.0 + (count as f32).sqrt() * 36.0;
    vec2(jx, jy) * radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::sample_snapshot;
    use crate::store::merge::MergeEngine;

    const DT: f32 = 1.0 / 60.0;

    fn sample_store() -> GraphStore {
        let mut store = GraphStore::new();
        MergeEngine::new().apply_snapshot(&mut store, sample_snapshot());
        store
    }

    fn run_until_settled(
        store: &mut GraphStore,
        layout: &LayoutIndex,
        sim: &mut Simulation,
        config: &SimConfig,
    ) -> u32 {
        let mut ticks = 0;
        while sim.tick(store, layout, config, DT) {
            ticks += 1;
            assert!(
                ticks <= config.max_ticks,
                "simulation failed to settle within the tick budget"
            );
        }
        ticks
    }

    #[test]
    fn sample_graph_settles_within_tick_budget() {
        let mut store = sample_store();
        let layout = LayoutIndex::build(&store, &LayoutFilter::default());
        let config = SimConfig::default();
        let mut sim = Simulation::new();

        run_until_settled(&mut store, &layout, &mut sim, &config);
        assert!(sim.is_settled(&config));

        // Every node ended up with a finite position.
        for (id, state) in store.nodes() {
            let pos = state.pos.unwrap_or_else(|| panic!("{id} has no position"));
            assert!(pos.x.is_finite() && pos.y.is_finite());
        }
    }

    #[test]
    fn settled_layout_has_no_unpinned_overlap() {
        let mut store = sample_store();
        let layout = LayoutIndex::build(&store, &LayoutFilter::default());
        let config = SimConfig::default();
        let mut sim = Simulation::new();
        run_until_settled(&mut store, &layout, &mut sim, &config);

        for a in 0..layout.ids.len() {
            for b in (a + 1)..layout.ids.len() {
                let pos_a = store.node(&layout.ids[a]).and_then(|s| s.pos).expect("pos");
                let pos_b = store.node(&layout.ids[b]).and_then(|s| s.pos).expect("pos");
                let distance = (pos_a - pos_b).length();
                assert!(
                    distance >= layout.radii[a] + layout.radii[b],
                    "{} and {} ended within collision radius ({distance})",
                    layout.ids[a],
                    layout.ids[b],
                );
            }
        }
    }

    #[test]
    fn layout_is_reproducible_for_identical_inputs() {
        let config = SimConfig::default();

        let run = || {
            let mut store = sample_store();
            let layout = LayoutIndex::build(&store, &LayoutFilter::default());
            let mut sim = Simulation::new();
            run_until_settled(&mut store, &layout, &mut sim, &config);
            layout
                .ids
                .iter()
                .map(|id| store.node(id).and_then(|s| s.pos).expect("pos"))
                .collect::<Vec<_>>()
        };

        let first = run();
        let second = run();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!((*a - *b).length() < 1e-3);
        }
    }

    #[test]
    fn dragged_node_stays_pinned_after_release() {
        let mut store = sample_store();
        let layout = LayoutIndex::build(&store, &LayoutFilter::default());
        let config = SimConfig::default();
        let mut sim = Simulation::new();

        // Drag "Machine Learning" to (100, 100); the release policy keeps
        // the pin, so subsequent ticks must not move it.
        store.set_position("Machine Learning", vec2(100.0, 100.0));
        store.set_pinned("Machine Learning", true);
        sim.reheat(1.0);

        run_until_settled(&mut store, &layout, &mut sim, &config);

        let state = store.node("Machine Learning").expect("node present");
        assert_eq!(state.pos, Some(vec2(100.0, 100.0)));
        assert!(state.pinned);
    }

    #[test]
    fn unpinned_node_moves_again_after_release_all() {
        let mut store = sample_store();
        let layout = LayoutIndex::build(&store, &LayoutFilter::default());
        let config = SimConfig::default();
        let mut sim = Simulation::new();

        // Pin far off any equilibrium so the centering force alone is
        // enough to move the node once the pin is released.
        let parked = vec2(600.0, 600.0);
        store.set_position("Machine Learning", parked);
        store.set_pinned("Machine Learning", true);
        run_until_settled(&mut store, &layout, &mut sim, &config);

        store.release_all_pins();
        sim.reheat(1.0);
        for _ in 0..60 {
            sim.tick(&mut store, &layout, &config, DT);
        }

        let pos = store
            .node("Machine Learning")
            .and_then(|s| s.pos)
            .expect("pos");
        assert!(
            (pos - parked).length() > 5.0,
            "released node should drift off its pin"
        );
    }

    #[test]
    fn settled_simulation_skips_ticks_until_reheat() {
        let mut store = sample_store();
        let layout = LayoutIndex::build(&store, &LayoutFilter::default());
        let config = SimConfig::default();
        let mut sim = Simulation::new();
        run_until_settled(&mut store, &layout, &mut sim, &config);

        let before = store
            .node("TensorFlow")
            .and_then(|s| s.pos)
            .expect("pos");
        assert!(!sim.tick(&mut store, &layout, &config, DT));
        let after = store
            .node("TensorFlow")
            .and_then(|s| s.pos)
            .expect("pos");
        assert_eq!(before, after);

        sim.reheat(0.5);
        assert!(!sim.is_settled(&config));
    }

    #[test]
    fn weight_update_marks_the_layout_stale() {
        use crate::model::Edge;

        let mut store = sample_store();
        let layout = LayoutIndex::build(&store, &LayoutFilter::default());
        assert!(!layout.is_stale(&store));

        // Same key, new weight; membership is unchanged but the springs
        // derived from the old weight are now wrong.
        store.upsert_edge(Edge::new("TensorFlow", "Deep Learning", "implements", 0.95), 1);
        assert!(layout.is_stale(&store));

        let rebuilt = LayoutIndex::build(&store, &LayoutFilter::default());
        let a = rebuilt.index_by_id["TensorFlow"];
        let b = rebuilt.index_by_id["Deep Learning"];
        let pair = (a.min(b), a.max(b));
        let spring = rebuilt
            .springs
            .iter()
            .find(|(x, y, _)| (*x, *y) == pair)
            .expect("spring present");
        assert!((spring.2 - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn filter_hides_kinds_from_the_layout() {
        let store = sample_store();
        let mut filter = LayoutFilter::default();
        filter.hidden_kinds.insert(NodeKind::Person);

        let layout = LayoutIndex::build(&store, &filter);
        assert!(!layout.ids.iter().any(|id| id == "Geoffrey Hinton"));
        assert_eq!(layout.ids.len(), store.node_count() - 1);
    }
}
