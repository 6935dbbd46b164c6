use std::collections::BTreeSet;

use feature_engine::{Engine, Feature, FeatureKind};
use seer_types::{FeatureTagRecord, InputRole};
use serde::{Deserialize, Serialize};
use shape_identity::{DerivedIds, EvolutionLedger, IntersectionMapper, ShapeHistory};
use tracing::debug;
use uuid::Uuid;

use crate::errors::SaveError;
use crate::metadata::ProjectMetadata;

/// Format identifier written into every project file.
pub const FORMAT_NAME: &str = "cadseer";

/// Current file format version.
pub const FORMAT_VERSION: u32 = 1;

/// The top-level file structure.
///
/// Holds the parametric recipe plus the identity bookkeeping needed to
/// reproduce the same shape ids after a reload. Kernel handles are never
/// written; a loaded project recomputes from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Format identifier.
    pub format: String,
    /// Format version number.
    pub version: u32,
    pub project: ProjectMetadata,
    /// Features in creation order.
    pub features: Vec<FeatureEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
    #[serde(default)]
    pub history: ShapeHistory,
}

/// One feature's persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub id: Uuid,
    pub name: String,
    pub kind: FeatureKind,
    #[serde(default)]
    pub tags: Vec<FeatureTagRecord>,
    #[serde(default)]
    pub ledger: EvolutionLedger,
    #[serde(default)]
    pub derived: DerivedIds,
    #[serde(default)]
    pub mapper: IntersectionMapper,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default = "active_default")]
    pub active: bool,
}

fn active_default() -> bool {
    true
}

impl From<&Feature> for FeatureEntry {
    fn from(feature: &Feature) -> Self {
        Self {
            id: feature.id,
            name: feature.name.clone(),
            kind: feature.kind.clone(),
            tags: feature.tags.clone(),
            ledger: feature.ledger.clone(),
            derived: feature.derived.clone(),
            mapper: feature.mapper.clone(),
            skipped: feature.state.skipped,
            active: feature.state.active,
        }
    }
}

/// A graph edge: `parent` feeds `child` in `roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub parent: Uuid,
    pub child: Uuid,
    pub roles: BTreeSet<InputRole>,
}

impl ProjectFile {
    /// Snapshot an engine.
    pub fn from_engine(engine: &Engine, metadata: &ProjectMetadata) -> Self {
        Self {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            project: metadata.clone(),
            features: engine.graph.features().map(FeatureEntry::from).collect(),
            connections: engine
                .graph
                .connections()
                .into_iter()
                .map(|(parent, child, roles)| ConnectionEntry {
                    parent,
                    child,
                    roles,
                })
                .collect(),
            history: engine.history.clone(),
        }
    }
}

/// Serialize a project to a pretty-printed JSON string.
pub fn save_project(engine: &Engine, metadata: &ProjectMetadata) -> Result<String, SaveError> {
    let file = ProjectFile::from_engine(engine, metadata);
    debug!(
        features = file.features.len(),
        connections = file.connections.len(),
        shapes = file.history.len(),
        "saving project"
    );
    serde_json::to_string_pretty(&file).map_err(|e| SaveError::Serialize(e.to_string()))
}
