//! In-memory stand-in for the knowledge service, used for offline/demo
//! mode and tests. Serves the sample AI/ML concept graph (15 nodes, 15
//! edges) with the same contracts as the HTTP client: depth-bounded
//! breadth-first neighborhoods and deterministic truncation.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use serde_json::{json, Value};

use crate::model::{Edge, Node, NodeKind, Snapshot};
use crate::remote::live::{spawn_scripted_feed, GraphChange, LiveChannel, LiveEvent};
use crate::remote::{truncate_snapshot, FetchError, GraphService};

pub struct MockGraphService {
    snapshot: Snapshot,
    adjacency: HashMap<String, Vec<String>>,
}

impl MockGraphService {
    pub fn new(snapshot: Snapshot) -> Self {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for node in &snapshot.nodes {
            adjacency.entry(node.id.clone()).or_default();
        }
        // Direction is presentational; traversal treats edges as undirected.
        for edge in &snapshot.edges {
            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            adjacency
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
        for neighbors in adjacency.values_mut() {
            neighbors.sort();
            neighbors.dedup();
        }
        Self {
            snapshot,
            adjacency,
        }
    }

    pub fn sample() -> Self {
        Self::new(sample_snapshot())
    }

    /// Node ids within `depth` hops of `focus`, breadth-first.
    fn reachable(&self, focus: &str, depth: u32) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(focus.to_owned());
        queue.push_back((focus.to_owned(), 0u32));

        while let Some((current, distance)) = queue.pop_front() {
            if distance >= depth {
                continue;
            }
            let Some(neighbors) = self.adjacency.get(&current) else {
                continue;
            };
            for next in neighbors {
                if visited.insert(next.clone()) {
                    queue.push_back((next.clone(), distance + 1));
                }
            }
        }

        visited
    }
}

impl GraphService for MockGraphService {
    fn fetch_overview(&self, limit: Option<usize>) -> Result<Snapshot, FetchError> {
        let mut snapshot = self.snapshot.clone();
        if let Some(limit) = limit {
            truncate_snapshot(&mut snapshot, None, limit);
        }
        Ok(snapshot)
    }

    fn fetch_neighborhood(
        &self,
        focus: &str,
        depth: u32,
        limit: Option<usize>,
    ) -> Result<Snapshot, FetchError> {
        if !self.adjacency.contains_key(focus) {
            return Err(FetchError::Service(format!("unknown node id {focus:?}")));
        }

        let keep = self.reachable(focus, depth);
        let mut snapshot = Snapshot {
            nodes: self
                .snapshot
                .nodes
                .iter()
                .filter(|node| keep.contains(&node.id))
                .cloned()
                .collect(),
            edges: self
                .snapshot
                .edges
                .iter()
                .filter(|edge| keep.contains(&edge.source) && keep.contains(&edge.target))
                .cloned()
                .collect(),
        };
        if let Some(limit) = limit {
            truncate_snapshot(&mut snapshot, Some(focus), limit);
        }
        Ok(snapshot)
    }

    fn entity_details(&self, id: &str) -> Result<BTreeMap<String, Value>, FetchError> {
        let node = self
            .snapshot
            .nodes
            .iter()
            .find(|node| node.id == id)
            .ok_or_else(|| FetchError::Service(format!("unknown node id {id:?}")))?;

        let mut details = node.properties.clone();
        details.insert("label".to_owned(), json!(node.label));
        details.insert("type".to_owned(), json!(node.kind.label()));
        details.insert(
            "degree".to_owned(),
            json!(self.adjacency.get(id).map_or(0, Vec::len)),
        );
        Ok(details)
    }
}

fn node(id: &str, kind: NodeKind, weight: f32, summary: &str) -> Node {
    let mut node = Node::new(id, id, kind).with_weight(weight);
    node.properties
        .insert("summary".to_owned(), json!(summary));
    node
}

/// The sample dataset: a small AI/ML concept graph. Ids double as display
/// labels, which keeps drill-down navigation readable offline.
pub fn sample_snapshot() -> Snapshot {
    let nodes = vec![
        node("Artificial Intelligence", NodeKind::Topic, 3.0, "Machines performing tasks that normally require human intelligence."),
        node("Machine Learning", NodeKind::Concept, 2.6, "Algorithms that improve through experience with data."),
        node("Deep Learning", NodeKind::Concept, 2.2, "Machine learning with multi-layer neural networks."),
        node("Neural Networks", NodeKind::Concept, 1.8, "Layered networks of weighted connections."),
        node("Natural Language Processing", NodeKind::Concept, 1.8, "Understanding and generating human language."),
        node("Computer Vision", NodeKind::Concept, 1.8, "Extracting meaning from images and video."),
        node("Reinforcement Learning", NodeKind::Concept, 1.5, "Learning by acting and receiving rewards."),
        node("Supervised Learning", NodeKind::Concept, 1.4, "Learning from labeled examples."),
        node("Unsupervised Learning", NodeKind::Concept, 1.4, "Finding structure in unlabeled data."),
        node("TensorFlow", NodeKind::Keyword, 1.2, "Google's open-source machine learning framework."),
        node("PyTorch", NodeKind::Keyword, 1.2, "Meta's open-source deep learning framework."),
        node("Transformers", NodeKind::Topic, 1.6, "Attention-based sequence architecture."),
        node("Geoffrey Hinton", NodeKind::Person, 1.0, "Pioneer of deep learning research."),
        node("Google", NodeKind::Organization, 1.3, "Maintains TensorFlow and large AI research groups."),
        node("ImageNet", NodeKind::Document, 1.0, "Benchmark dataset for image classification."),
    ];

    let edges = vec![
        Edge::new("Machine Learning", "Artificial Intelligence", "subfield_of", 0.9),
        Edge::new("Deep Learning", "Machine Learning", "subfield_of", 0.9),
        Edge::new("Deep Learning", "Neural Networks", "built_on", 0.85),
        Edge::new("Natural Language Processing", "Artificial Intelligence", "subfield_of", 0.7),
        Edge::new("Computer Vision", "Artificial Intelligence", "subfield_of", 0.7),
        Edge::new("Reinforcement Learning", "Machine Learning", "subfield_of", 0.75),
        Edge::new("Supervised Learning", "Machine Learning", "paradigm_of", 0.8),
        Edge::new("Unsupervised Learning", "Machine Learning", "paradigm_of", 0.8),
        Edge::new("TensorFlow", "Deep Learning", "implements", 0.65),
        Edge::new("PyTorch", "Deep Learning", "implements", 0.65),
        Edge::new("Transformers", "Natural Language Processing", "applied_in", 0.7),
        Edge::new("Transformers", "Deep Learning", "based_on", 0.6),
        Edge::new("Geoffrey Hinton", "Deep Learning", "pioneered", 0.8),
        Edge::new("Google", "TensorFlow", "maintains", 0.9),
        Edge::new("ImageNet", "Computer Vision", "benchmark_for", 0.6),
    ];

    Snapshot { nodes, edges }
}

/// Scripted live traffic for the offline mode: a couple of upserts arriving
/// a few seconds apart, so the merge/reheat path is visible without a
/// backend.
pub fn demo_feed() -> LiveChannel {
    let events = vec![
        LiveEvent {
            seq: 1,
            change: GraphChange::UpsertNode {
                node: node(
                    "Diffusion Models",
                    NodeKind::Concept,
                    1.3,
                    "Generative models that learn to reverse noise.",
                ),
                clear_pin: false,
            },
        },
        LiveEvent {
            seq: 2,
            change: GraphChange::UpsertEdge {
                edge: Edge::new("Diffusion Models", "Deep Learning", "based_on", 0.6),
            },
        },
        LiveEvent {
            seq: 3,
            change: GraphChange::UpsertNode {
                node: node(
                    "AlphaGo",
                    NodeKind::Event,
                    1.1,
                    "Reinforcement learning system that defeated a Go world champion.",
                ),
                clear_pin: false,
            },
        },
        LiveEvent {
            seq: 4,
            change: GraphChange::UpsertEdge {
                edge: Edge::new("AlphaGo", "Reinforcement Learning", "milestone_of", 0.7),
            },
        },
    ];
    spawn_scripted_feed(events, Duration::from_secs(5))
}
