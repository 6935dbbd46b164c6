pub mod config;
pub mod graph;
pub mod rebuild;
pub mod resolve;
pub mod types;

use geom_kernel::KernelBundle;
use seer_types::InputRole;
use shape_identity::{
    DiagnosticKind, Diagnostics, IdGenerator, Pick, PickResolution, ShapeHistory,
    ShapeIdentityTable,
};
use tracing::info;
use uuid::Uuid;

pub use crate::config::{EngineConfig, IdMode};
pub use crate::graph::{FeatureGraph, FeatureKey, GraphEdge};
pub use crate::types::{EngineError, Feature, FeatureKind, FeatureState};

/// The parametric modeling engine.
///
/// Owns the feature graph and the project-wide shape history, and drives
/// recomputes through a kernel supplied per call.
pub struct Engine {
    pub graph: FeatureGraph,
    pub history: ShapeHistory,
    pub config: EngineConfig,
    ids: Box<dyn IdGenerator>,
    /// Diagnostics from the last recompute and from rejected edits since.
    pub diagnostics: Diagnostics,
    /// Errors from the last recompute.
    pub errors: Vec<(Uuid, String)>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_parts(FeatureGraph::new(), ShapeHistory::new(), config)
    }

    /// Assemble an engine around a graph and history, e.g. after loading.
    /// The id source skips every id the parts already carry.
    pub fn from_parts(graph: FeatureGraph, history: ShapeHistory, config: EngineConfig) -> Self {
        let mut ids = config.id_generator();
        for id in persisted_ids(&graph, &history) {
            ids.reserve(id);
        }
        Self {
            graph,
            history,
            config,
            ids,
            diagnostics: Diagnostics::new(),
            errors: Vec::new(),
        }
    }

    /// Id source shared by feature construction and identification.
    pub fn ids(&mut self) -> &mut dyn IdGenerator {
        self.ids.as_mut()
    }

    /// Add an unconnected feature. It starts dirty.
    pub fn add_feature(&mut self, name: impl Into<String>, kind: FeatureKind) -> Uuid {
        let id = self.ids.next_id();
        let feature = Feature::new(id, name, kind, self.ids.as_mut());
        self.graph.add(feature);
        id
    }

    /// Feed `parent`'s output into `child` as `role`.
    pub fn connect(&mut self, parent: Uuid, child: Uuid, role: InputRole) -> Result<(), EngineError> {
        match self.graph.connect(parent, child, role) {
            Ok(_) => Ok(()),
            Err(error @ EngineError::CycleDetected { .. }) => {
                self.diagnostics.report(
                    DiagnosticKind::CycleRejected,
                    Some(child),
                    error.to_string(),
                );
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    pub fn disconnect(&mut self, parent: Uuid, child: Uuid) -> Result<(), EngineError> {
        self.graph.disconnect(parent, child).map(|_| ())
    }

    pub fn remove_feature(&mut self, id: Uuid) -> Result<Feature, EngineError> {
        self.graph.remove(id)
    }

    /// Replace a feature's parameters. It and its dependents go dirty.
    pub fn edit_feature(&mut self, id: Uuid, kind: FeatureKind) -> Result<(), EngineError> {
        let key = self.graph.key(id)?;
        if let Some(feature) = self.graph.get_mut(key) {
            feature.set_kind(kind, self.ids.as_mut());
        }
        self.graph.mark_dirty(key);
        Ok(())
    }

    pub fn set_skipped(&mut self, id: Uuid, skipped: bool) -> Result<(), EngineError> {
        let key = self.graph.key(id)?;
        if let Some(feature) = self.graph.get_mut(key) {
            feature.state.skipped = skipped;
        }
        self.graph.mark_dirty(key);
        Ok(())
    }

    /// Inactive features are left dirty by recomputes until reactivated.
    pub fn set_active(&mut self, id: Uuid, active: bool) -> Result<(), EngineError> {
        let key = self.graph.key(id)?;
        if let Some(feature) = self.graph.get_mut(key) {
            feature.state.active = active;
        }
        if active {
            self.graph.mark_dirty(key);
        }
        Ok(())
    }

    /// Mark a feature and everything downstream dirty.
    pub fn set_dirty(&mut self, id: Uuid) -> Result<(), EngineError> {
        let key = self.graph.key(id)?;
        self.graph.mark_dirty(key);
        Ok(())
    }

    /// Clear one feature's dirty flag without recomputing it.
    pub fn set_clean(&mut self, id: Uuid) -> Result<(), EngineError> {
        let feature = self
            .graph
            .feature_mut(id)
            .ok_or(EngineError::FeatureNotFound { id })?;
        feature.state.dirty = false;
        Ok(())
    }

    /// Recompute every dirty feature. Returns the ids updated, in order.
    pub fn recompute_all(&mut self, kb: &mut dyn KernelBundle) -> Vec<Uuid> {
        let state = rebuild::recompute_all(
            &mut self.graph,
            &mut self.history,
            self.ids.as_mut(),
            &self.config,
            kb,
        );
        info!(
            recomputed = state.recomputed.len(),
            diagnostics = state.diagnostics.len(),
            "engine recompute"
        );
        self.diagnostics = state.diagnostics;
        self.errors = state.errors;
        state.recomputed
    }

    pub fn feature(&self, id: Uuid) -> Option<&Feature> {
        self.graph.feature(id)
    }

    /// The identity table of a feature's current output.
    pub fn table(&self, id: Uuid) -> Option<&ShapeIdentityTable> {
        self.graph.feature(id).map(|f| &f.table)
    }

    /// Pick a sub-shape of a feature's current output.
    pub fn make_pick(&self, feature_id: Uuid, shape_id: Uuid) -> Result<Pick, EngineError> {
        let feature = self
            .graph
            .feature(feature_id)
            .ok_or(EngineError::FeatureNotFound { id: feature_id })?;
        let record = feature
            .table
            .offset_of_id(shape_id)
            .and_then(|o| feature.table.record(o))
            .ok_or(EngineError::ShapeNotFound {
                feature_id,
                shape_id,
            })?;
        Ok(Pick::new(feature_id, shape_id, record.kind, &self.history))
    }

    /// Where `pick` stands against the picked feature's current output.
    pub fn resolve_pick(&self, pick: &Pick) -> PickResolution {
        match self.graph.feature(pick.feature_id) {
            Some(feature) => shape_identity::resolve_pick(
                pick,
                &feature.table,
                &self.history,
                self.config.max_history_depth,
            ),
            None => PickResolution::Lost,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Every id a graph and history already hand out: feature ids, tags, ledger
/// rows, derived and Boolean-keyed ids, and history nodes.
fn persisted_ids<'a>(
    graph: &'a FeatureGraph,
    history: &'a ShapeHistory,
) -> impl Iterator<Item = Uuid> + 'a {
    let features = graph.features().flat_map(|f| {
        let tags = f.tags.iter().map(|t| t.id);
        let ledger = f.ledger.records().iter().flat_map(|r| [r.in_id, r.out_id]);
        let derived = f.derived.iter().map(|(_, id)| *id);
        let edges = f.mapper.edge_records().iter().map(|e| e.id);
        let splits = f
            .mapper
            .split_face_records()
            .iter()
            .flat_map(|s| [s.face_id, s.wire_id]);
        let table = f.table.records().iter().filter_map(|r| r.id);
        std::iter::once(f.id)
            .chain(tags)
            .chain(ledger)
            .chain(derived)
            .chain(edges)
            .chain(splits)
            .chain(table)
    });
    let nodes = history
        .nodes()
        .iter()
        .flat_map(|n| [n.feature_id, n.shape_id]);
    features.chain(nodes)
}
