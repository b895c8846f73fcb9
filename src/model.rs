//! Wire and domain types for the knowledge graph.
//!
//! These mirror the JSON emitted by the knowledge service: a node list and
//! an edge list, each element carrying an open property bag the layout
//! engine treats as opaque.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity category tag. The set is open: tags the service introduces later
/// round-trip through [`NodeKind::Other`] instead of failing to decode.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Concept,
    Document,
    Keyword,
    Topic,
    Person,
    Organization,
    Location,
    Event,
    Other(String),
}

impl NodeKind {
    pub const KNOWN: [NodeKind; 8] = [
        NodeKind::Concept,
        NodeKind::Document,
        NodeKind::Keyword,
        NodeKind::Topic,
        NodeKind::Person,
        NodeKind::Organization,
        NodeKind::Location,
        NodeKind::Event,
    ];

    pub fn label(&self) -> &str {
        match self {
            Self::Concept => "concept",
            Self::Document => "document",
            Self::Keyword => "keyword",
            Self::Topic => "topic",
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Event => "event",
            Self::Other(tag) => tag.as_str(),
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "concept" => Self::Concept,
            "document" => Self::Document,
            "keyword" => Self::Keyword,
            "topic" => Self::Topic,
            "person" => Self::Person,
            "organization" => Self::Organization,
            "location" => Self::Location,
            "event" => Self::Event,
            _ => Self::Other(tag),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.label().to_owned()
    }
}

/// A knowledge-graph entity. `weight` is a visual size hint; positions are
/// never part of the wire format, they belong to the local layout state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_node_kind", rename = "type")]
    pub kind: NodeKind,
    #[serde(default = "default_node_weight")]
    pub weight: f32,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

fn default_node_kind() -> NodeKind {
    NodeKind::Concept
}

fn default_node_weight() -> f32 {
    1.0
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            weight: 1.0,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Clamp the size hint into a renderable range and fall back to the id
    /// when the service sent no label.
    pub fn sanitize(&mut self) {
        if !self.weight.is_finite() {
            self.weight = 1.0;
        }
        self.weight = self.weight.clamp(0.1, 10.0);
        if self.label.is_empty() {
            self.label = self.id.clone();
        }
    }
}

/// Identity of an edge: the ordered endpoint pair plus the relationship
/// label. Re-sending the same key updates weight/properties, it never
/// duplicates the edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub label: String,
}

impl EdgeKey {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: label.into(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// A labeled relationship. `weight` in (0, 1] drives both visual thickness
/// and the spring stiffness/rest length in the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_edge_weight")]
    pub weight: f32,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

fn default_edge_weight() -> f32 {
    0.5
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
        weight: f32,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: label.into(),
            weight,
            properties: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.label.clone())
    }

    pub fn sanitize(&mut self) {
        if !self.weight.is_finite() {
            self.weight = 0.5;
        }
        self.weight = self.weight.clamp(0.01, 1.0);
    }
}

/// A complete graph result from a fetch, as opposed to an incremental live
/// event. An empty snapshot is valid (an isolated focus with no neighbors).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
