//! Clients for the knowledge service: snapshot fetches, entity details and
//! the live update subscription. All I/O here is blocking and runs on
//! worker threads; results come back to the UI thread over `mpsc` channels.

pub mod live;
pub mod mock;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::model::Snapshot;

/// Typed fetch failure. The caller can always tell a failed fetch from a
/// valid empty snapshot (an isolated node with no neighbors).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned status {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("service error: {0}")]
    Service(String),
}

/// Contract of the graph retrieval + entity detail services. `depth` bounds
/// breadth-first distance from the focus (depth 0 returns just the focus
/// node); `limit` caps result size with the deterministic truncation rule
/// implemented by [`truncate_snapshot`].
pub trait GraphService: Send + Sync {
    fn fetch_overview(&self, limit: Option<usize>) -> Result<Snapshot, FetchError>;

    fn fetch_neighborhood(
        &self,
        focus: &str,
        depth: u32,
        limit: Option<usize>,
    ) -> Result<Snapshot, FetchError>;

    fn entity_details(&self, id: &str) -> Result<BTreeMap<String, Value>, FetchError>;
}

/// Deterministic truncation for over-limit results: the node named by
/// `keep` (the fetch focus) always survives, the rest are ranked by their
/// strongest incident edge weight descending with ties broken by id
/// ascending. Edges are then filtered to surviving endpoints. Repeated
/// calls with the same inputs produce the same graph.
pub fn truncate_snapshot(snapshot: &mut Snapshot, keep: Option<&str>, limit: usize) {
    if snapshot.nodes.len() <= limit {
        return;
    }

    let mut strongest: HashMap<&str, f32> = HashMap::new();
    for edge in &snapshot.edges {
        for endpoint in [edge.source.as_str(), edge.target.as_str()] {
            let entry = strongest.entry(endpoint).or_insert(0.0);
            *entry = entry.max(edge.weight);
        }
    }

    let mut ranked = snapshot
        .nodes
        .iter()
        .map(|node| {
            let weight = strongest.get(node.id.as_str()).copied().unwrap_or(0.0);
            (node.id.clone(), weight)
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut kept = keep
        .filter(|id| snapshot.nodes.iter().any(|node| node.id == *id))
        .map(|id| vec![id.to_owned()])
        .unwrap_or_default();
    for (id, _weight) in ranked {
        if kept.len() >= limit {
            break;
        }
        if !kept.contains(&id) {
            kept.push(id);
        }
    }

    snapshot.nodes.retain(|node| kept.contains(&node.id));
    snapshot
        .edges
        .retain(|edge| kept.contains(&edge.source) && kept.contains(&edge.target));
}

/// Blocking HTTP client for the collaborator endpoints:
/// `GET /api/knowledge-graph/overview`, `GET /api/knowledge-graph/neighborhood`
/// and `GET /api/entity/{id}`, each returning the JSON graph shape of
/// [`Snapshot`].
pub struct HttpGraphService {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpGraphService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    fn overview_request(&self, limit: Option<usize>) -> reqwest::blocking::RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/api/knowledge-graph/overview", self.base_url));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        request
    }

    fn neighborhood_request(
        &self,
        focus: &str,
        depth: u32,
        limit: Option<usize>,
    ) -> reqwest::blocking::RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/api/knowledge-graph/neighborhood", self.base_url))
            .query(&[("node", focus)])
            .query(&[("depth", depth)]);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        request
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, FetchError> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl GraphService for HttpGraphService {
    fn fetch_overview(&self, limit: Option<usize>) -> Result<Snapshot, FetchError> {
        let mut snapshot: Snapshot = self.get_json(self.overview_request(limit))?;
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
        let mut snapshot: Snapshot = self.get_json(self.neighborhood_request(focus, depth, limit))?;
        if let Some(limit) = limit {
            truncate_snapshot(&mut snapshot, Some(focus), limit);
        }
        Ok(snapshot)
    }

    fn entity_details(&self, id: &str) -> Result<BTreeMap<String, Value>, FetchError> {
        let url = format!("{}/api/entity/{}", self.base_url, urlencode(id));
        self.get_json(self.client.get(url))
    }
}

/// Percent-encoding for a path segment; query parameters go through the
/// request builder instead.
fn urlencode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
