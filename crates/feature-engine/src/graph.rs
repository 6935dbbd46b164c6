use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use seer_types::InputRole;
use slotmap::{new_key_type, SlotMap};
use tracing::debug;
use uuid::Uuid;

use crate::types::{EngineError, Feature};

// ─── Keys ───────────────────────────────────────────────────────────────────

new_key_type! {
    pub struct FeatureKey;
    pub struct EdgeKey;
}

/// A dependency: `parent`'s output feeds `child` in the given roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub parent: FeatureKey,
    pub child: FeatureKey,
    pub roles: BTreeSet<InputRole>,
}

/// Directed acyclic graph of features.
///
/// Features and edges live in slot maps; insertion order is kept separately
/// so topological order is deterministic. Every structural edit is checked
/// for cycles before anything is mutated.
#[derive(Debug, Clone, Default)]
pub struct FeatureGraph {
    features: SlotMap<FeatureKey, Feature>,
    edges: SlotMap<EdgeKey, GraphEdge>,
    by_id: HashMap<Uuid, FeatureKey>,
    order: Vec<FeatureKey>,
}

impl FeatureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, feature: Feature) -> FeatureKey {
        let id = feature.id;
        let key = self.features.insert(feature);
        self.by_id.insert(id, key);
        self.order.push(key);
        key
    }

    pub fn key(&self, id: Uuid) -> Result<FeatureKey, EngineError> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or(EngineError::FeatureNotFound { id })
    }

    pub fn feature(&self, id: Uuid) -> Option<&Feature> {
        self.by_id.get(&id).and_then(|k| self.features.get(*k))
    }

    pub fn feature_mut(&mut self, id: Uuid) -> Option<&mut Feature> {
        let key = *self.by_id.get(&id)?;
        self.features.get_mut(key)
    }

    pub fn get(&self, key: FeatureKey) -> Option<&Feature> {
        self.features.get(key)
    }

    pub fn get_mut(&mut self, key: FeatureKey) -> Option<&mut Feature> {
        self.features.get_mut(key)
    }

    /// Features in insertion order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.order.iter().filter_map(|k| self.features.get(*k))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn edge_between(&self, parent: FeatureKey, child: FeatureKey) -> Option<EdgeKey> {
        self.edges
            .iter()
            .find(|(_, e)| e.parent == parent && e.child == child)
            .map(|(k, _)| k)
    }

    fn child_keys(&self, key: FeatureKey) -> Vec<FeatureKey> {
        let mut children: Vec<FeatureKey> = self
            .edges
            .values()
            .filter(|e| e.parent == key)
            .map(|e| e.child)
            .collect();
        children.dedup();
        children
    }

    /// Whether `to` can be reached from `from` along edges.
    fn reaches(&self, from: FeatureKey, to: FeatureKey) -> bool {
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(key) = queue.pop_front() {
            if key == to {
                return true;
            }
            for child in self.child_keys(key) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        false
    }

    /// Make `parent` feed `child` in `role`. An existing edge gains the role.
    /// Refused, leaving the graph untouched, if the edge would close a cycle.
    pub fn connect(
        &mut self,
        parent_id: Uuid,
        child_id: Uuid,
        role: InputRole,
    ) -> Result<EdgeKey, EngineError> {
        let parent = self.key(parent_id)?;
        let child = self.key(child_id)?;
        if let Some(edge) = self.edge_between(parent, child) {
            self.edges[edge].roles.insert(role);
            self.mark_dirty(child);
            return Ok(edge);
        }
        if self.reaches(child, parent) {
            return Err(EngineError::CycleDetected {
                parent: parent_id,
                child: child_id,
            });
        }
        let edge = self.edges.insert(GraphEdge {
            parent,
            child,
            roles: BTreeSet::from([role]),
        });
        self.features[parent].state.leaf = false;
        self.mark_dirty(child);
        debug!(%parent_id, %child_id, %role, "features connected");
        Ok(edge)
    }

    /// Remove the edge from `parent` to `child`.
    pub fn disconnect(&mut self, parent_id: Uuid, child_id: Uuid) -> Result<GraphEdge, EngineError> {
        let parent = self.key(parent_id)?;
        let child = self.key(child_id)?;
        let key = self
            .edge_between(parent, child)
            .ok_or(EngineError::EdgeNotFound {
                parent: parent_id,
                child: child_id,
            })?;
        let edge = self
            .edges
            .remove(key)
            .ok_or(EngineError::EdgeNotFound {
                parent: parent_id,
                child: child_id,
            })?;
        self.refresh_leaf(parent);
        self.mark_dirty(child);
        Ok(edge)
    }

    /// Remove a feature and every edge touching it. Former children are
    /// marked dirty.
    pub fn remove(&mut self, id: Uuid) -> Result<Feature, EngineError> {
        let key = self.key(id)?;
        let touching: Vec<EdgeKey> = self
            .edges
            .iter()
            .filter(|(_, e)| e.parent == key || e.child == key)
            .map(|(k, _)| k)
            .collect();
        let mut affected = Vec::new();
        for edge_key in touching {
            if let Some(edge) = self.edges.remove(edge_key) {
                affected.push(if edge.parent == key { edge.child } else { edge.parent });
                if edge.parent == key {
                    self.mark_dirty(edge.child);
                }
            }
        }
        let feature = self
            .features
            .remove(key)
            .ok_or(EngineError::FeatureNotFound { id })?;
        self.by_id.remove(&id);
        self.order.retain(|k| *k != key);
        for other in affected {
            self.refresh_leaf(other);
        }
        Ok(feature)
    }

    fn refresh_leaf(&mut self, key: FeatureKey) {
        let leaf = !self.edges.values().any(|e| e.parent == key);
        if let Some(feature) = self.features.get_mut(key) {
            feature.state.leaf = leaf;
        }
    }

    /// Mark a feature and everything downstream of it dirty.
    pub fn mark_dirty(&mut self, key: FeatureKey) {
        let mut seen = HashSet::from([key]);
        let mut queue = VecDeque::from([key]);
        while let Some(k) = queue.pop_front() {
            if let Some(feature) = self.features.get_mut(k) {
                feature.state.dirty = true;
            }
            for child in self.child_keys(k) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }

    /// The parent feeding `child` in `role`, if connected.
    pub fn input(&self, child: FeatureKey, role: InputRole) -> Option<FeatureKey> {
        self.edges
            .values()
            .find(|e| e.child == child && e.roles.contains(&role))
            .map(|e| e.parent)
    }

    /// Parents of `key` with the edge roles.
    pub fn parents(&self, key: FeatureKey) -> Vec<(FeatureKey, &BTreeSet<InputRole>)> {
        self.edges
            .values()
            .filter(|e| e.child == key)
            .map(|e| (e.parent, &e.roles))
            .collect()
    }

    pub fn children(&self, key: FeatureKey) -> Vec<FeatureKey> {
        self.child_keys(key)
    }

    /// Every feature, parents before children. Ties go to insertion order.
    pub fn topological_order(&self) -> Vec<FeatureKey> {
        let mut in_degree: HashMap<FeatureKey, usize> =
            self.order.iter().map(|k| (*k, 0)).collect();
        for edge in self.edges.values() {
            if let Some(d) = in_degree.get_mut(&edge.child) {
                *d += 1;
            }
        }
        let mut sorted = Vec::with_capacity(self.order.len());
        let mut done: HashSet<FeatureKey> = HashSet::new();
        while sorted.len() < self.order.len() {
            let Some(next) = self
                .order
                .iter()
                .copied()
                .find(|k| !done.contains(k) && in_degree.get(k) == Some(&0))
            else {
                break;
            };
            done.insert(next);
            sorted.push(next);
            for edge in self.edges.values().filter(|e| e.parent == next) {
                if let Some(d) = in_degree.get_mut(&edge.child) {
                    *d = d.saturating_sub(1);
                }
            }
        }
        sorted
    }

    /// Every edge as `(parent id, child id, roles)`, in edge insertion order.
    pub fn connections(&self) -> Vec<(Uuid, Uuid, BTreeSet<InputRole>)> {
        self.edges
            .values()
            .filter_map(|e| {
                let parent = self.features.get(e.parent)?.id;
                let child = self.features.get(e.child)?.id;
                Some((parent, child, e.roles.clone()))
            })
            .collect()
    }
}
