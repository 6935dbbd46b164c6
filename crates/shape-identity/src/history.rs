use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::error::IdentityError;

/// A shape id and the feature that first emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryNode {
    pub feature_id: Uuid,
    pub shape_id: Uuid,
}

/// Persisted form of a [`ShapeHistory`]: vertex list plus
/// `(source shape id, target shape id)` edge list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub vertices: Vec<HistoryNode>,
    pub edges: Vec<(Uuid, Uuid)>,
}

/// Project-wide directed graph of shape id continuity ("evolves to").
///
/// Arena of nodes with per-node adjacency index lists; node indices are
/// stable because nothing is ever removed during a session. Shape ids are
/// unique across the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HistoryRecord", into = "HistoryRecord")]
pub struct ShapeHistory {
    nodes: Vec<HistoryNode>,
    out_edges: Vec<Vec<usize>>,
    in_edges: Vec<Vec<usize>>,
    index: HashMap<Uuid, usize>,
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

impl ShapeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `shape_id` as emitted by `feature_id`. A no-op returning
    /// false if the id is already known; the first emitter keeps it.
    pub fn add_shape(&mut self, feature_id: Uuid, shape_id: Uuid) -> bool {
        if self.index.contains_key(&shape_id) {
            return false;
        }
        self.index.insert(shape_id, self.nodes.len());
        self.nodes.push(HistoryNode {
            feature_id,
            shape_id,
        });
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        true
    }

    /// Record that `source` evolves into `target`. Both must be registered.
    /// Self loops and repeats are ignored (`Ok(false)`).
    pub fn add_connection(&mut self, source: Uuid, target: Uuid) -> Result<bool, IdentityError> {
        let from = self.node_index(source)?;
        let to = self.node_index(target)?;
        if from == to || self.out_edges[from].contains(&to) {
            return Ok(false);
        }
        self.out_edges[from].push(to);
        self.in_edges[to].push(from);
        Ok(true)
    }

    fn node_index(&self, id: Uuid) -> Result<usize, IdentityError> {
        self.index
            .get(&id)
            .copied()
            .ok_or(IdentityError::UnknownShape { id })
    }

    pub fn contains(&self, shape_id: Uuid) -> bool {
        self.index.contains_key(&shape_id)
    }

    pub fn node(&self, shape_id: Uuid) -> Option<HistoryNode> {
        self.index.get(&shape_id).map(|&i| self.nodes[i])
    }

    pub fn feature_of(&self, shape_id: Uuid) -> Option<Uuid> {
        self.node(shape_id).map(|n| n.feature_id)
    }

    pub fn nodes(&self) -> &[HistoryNode] {
        &self.nodes
    }

    pub fn edges(&self) -> Vec<(Uuid, Uuid)> {
        self.out_edges
            .iter()
            .enumerate()
            .flat_map(|(from, tos)| {
                tos.iter()
                    .map(move |&to| (self.nodes[from].shape_id, self.nodes[to].shape_id))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node indices reachable from `start`, itself included, in BFS order.
    /// `max_depth` bounds the number of hops.
    fn bfs(&self, start: usize, direction: Direction, max_depth: Option<usize>) -> Vec<usize> {
        let mut seen = HashSet::from([start]);
        let mut order = vec![start];
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            let next = match direction {
                Direction::Forward => &self.out_edges[node],
                Direction::Backward => &self.in_edges[node],
            };
            for &n in next {
                if seen.insert(n) {
                    order.push(n);
                    queue.push_back((n, depth + 1));
                }
            }
        }
        order
    }

    fn first_of_feature(
        &self,
        feature_id: Uuid,
        shape_id: Uuid,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> Option<Uuid> {
        let start = *self.index.get(&shape_id)?;
        self.bfs(start, direction, max_depth)
            .into_iter()
            .map(|i| self.nodes[i])
            .find(|n| n.feature_id == feature_id)
            .map(|n| n.shape_id)
    }

    /// First node of `feature_id` reachable forward from `shape_id`.
    pub fn evolve(&self, feature_id: Uuid, shape_id: Uuid) -> Option<Uuid> {
        self.evolve_within(feature_id, shape_id, None)
    }

    pub fn evolve_within(
        &self,
        feature_id: Uuid,
        shape_id: Uuid,
        max_depth: Option<usize>,
    ) -> Option<Uuid> {
        self.first_of_feature(feature_id, shape_id, Direction::Forward, max_depth)
    }

    /// First node of `feature_id` reachable backward from `shape_id`.
    pub fn devolve(&self, feature_id: Uuid, shape_id: Uuid) -> Option<Uuid> {
        self.devolve_within(feature_id, shape_id, None)
    }

    pub fn devolve_within(
        &self,
        feature_id: Uuid,
        shape_id: Uuid,
        max_depth: Option<usize>,
    ) -> Option<Uuid> {
        self.first_of_feature(feature_id, shape_id, Direction::Backward, max_depth)
    }

    /// Standalone copy of everything reachable forward from `shape_id`.
    pub fn create_evolve_history(&self, shape_id: Uuid) -> ShapeHistory {
        self.extract(shape_id, Direction::Forward)
    }

    /// Standalone copy of everything reachable backward from `shape_id`.
    pub fn create_devolve_history(&self, shape_id: Uuid) -> ShapeHistory {
        self.extract(shape_id, Direction::Backward)
    }

    fn extract(&self, shape_id: Uuid, direction: Direction) -> ShapeHistory {
        let mut sub = ShapeHistory::new();
        let Some(&start) = self.index.get(&shape_id) else {
            return sub;
        };
        let reached = self.bfs(start, direction, None);
        for &i in &reached {
            sub.add_shape(self.nodes[i].feature_id, self.nodes[i].shape_id);
        }
        for &i in &reached {
            for &to in &self.out_edges[i] {
                let (source, target) = (self.nodes[i].shape_id, self.nodes[to].shape_id);
                if sub.contains(target) {
                    // both endpoints were just added
                    let _ = sub.add_connection(source, target);
                }
            }
        }
        sub
    }

    /// Anchor `pick_history` onto this graph at the first of its shape ids
    /// (in its own node order) that this graph also has, and return every id
    /// of `feature_id` reachable forward from that anchor.
    pub fn resolve_histories(&self, pick_history: &ShapeHistory, feature_id: Uuid) -> Vec<Uuid> {
        let Some(anchor) = pick_history
            .nodes
            .iter()
            .find_map(|n| self.index.get(&n.shape_id).copied())
        else {
            return Vec::new();
        };
        self.bfs(anchor, Direction::Forward, None)
            .into_iter()
            .map(|i| self.nodes[i])
            .filter(|n| n.feature_id == feature_id)
            .map(|n| n.shape_id)
            .collect()
    }

    /// Like [`ShapeHistory::resolve_histories`] with a caller-supplied node
    /// filter, moving on to the next shared anchor while an anchor yields
    /// nothing.
    pub fn resolve_histories_filtered(
        &self,
        pick_history: &ShapeHistory,
        max_depth: Option<usize>,
        accept: impl Fn(&HistoryNode) -> bool,
    ) -> Vec<Uuid> {
        for node in &pick_history.nodes {
            let Some(&anchor) = self.index.get(&node.shape_id) else {
                continue;
            };
            let found: Vec<Uuid> = self
                .bfs(anchor, Direction::Forward, max_depth)
                .into_iter()
                .map(|i| self.nodes[i])
                .filter(|n| accept(n))
                .map(|n| n.shape_id)
                .collect();
            if !found.is_empty() {
                trace!(anchor = %node.shape_id, found = found.len(), "pick history anchored");
                return found;
            }
        }
        Vec::new()
    }
}

impl From<HistoryRecord> for ShapeHistory {
    fn from(record: HistoryRecord) -> Self {
        let mut history = ShapeHistory::new();
        for v in record.vertices {
            history.add_shape(v.feature_id, v.shape_id);
        }
        for (source, target) in record.edges {
            // edges to unknown vertices are dropped
            let _ = history.add_connection(source, target);
        }
        history
    }
}

impl From<ShapeHistory> for HistoryRecord {
    fn from(history: ShapeHistory) -> Self {
        HistoryRecord {
            edges: history.edges(),
            vertices: history.nodes,
        }
    }
}
