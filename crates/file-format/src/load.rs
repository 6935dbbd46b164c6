use std::collections::HashSet;

use feature_engine::{Engine, EngineConfig, EngineError, Feature, FeatureGraph, FeatureState};
use shape_identity::ShapeIdentityTable;
use tracing::info;

use crate::errors::LoadError;
use crate::metadata::ProjectMetadata;
use crate::save::{FeatureEntry, ProjectFile, FORMAT_NAME, FORMAT_VERSION};

/// Deserialize a project from a JSON string.
///
/// Validates the format identifier and version, migrates older files, and
/// rebuilds the feature graph. Every feature comes back dirty with an empty
/// table; the first recompute regenerates geometry and, from the persisted
/// tags, ledgers, derived maps and mappers, the same shape ids.
pub fn load_project(
    json: &str,
    config: EngineConfig,
) -> Result<(Engine, ProjectMetadata), LoadError> {
    let raw: ProjectFile =
        serde_json::from_str(json).map_err(|e| LoadError::ParseError(e.to_string()))?;

    if raw.format != FORMAT_NAME {
        return Err(LoadError::UnknownFormat(raw.format));
    }
    if raw.version > FORMAT_VERSION {
        return Err(LoadError::FutureVersion {
            file_version: raw.version,
            supported_version: FORMAT_VERSION,
        });
    }
    let file = if raw.version < FORMAT_VERSION {
        crate::migrate::migrate(raw, FORMAT_VERSION)?
    } else {
        raw
    };

    let mut graph = FeatureGraph::new();
    let mut seen = HashSet::new();
    for entry in file.features {
        if !seen.insert(entry.id) {
            return Err(LoadError::DuplicateFeature { id: entry.id });
        }
        graph.add(feature_from_entry(entry));
    }
    for connection in &file.connections {
        for &role in &connection.roles {
            graph
                .connect(connection.parent, connection.child, role)
                .map_err(|e| LoadError::InvalidConnection {
                    parent: connection.parent,
                    child: connection.child,
                    reason: match e {
                        EngineError::CycleDetected { .. } => "would create a cycle".to_string(),
                        other => other.to_string(),
                    },
                })?;
        }
    }

    info!(
        project = %file.project.name,
        features = graph.len(),
        shapes = file.history.len(),
        "project loaded"
    );
    Ok((
        Engine::from_parts(graph, file.history, config),
        file.project,
    ))
}

fn feature_from_entry(entry: FeatureEntry) -> Feature {
    Feature {
        id: entry.id,
        name: entry.name,
        kind: entry.kind,
        tags: entry.tags,
        state: FeatureState {
            skipped: entry.skipped,
            active: entry.active,
            ..FeatureState::default()
        },
        table: ShapeIdentityTable::default(),
        ledger: entry.ledger,
        derived: entry.derived,
        mapper: entry.mapper,
        output: None,
        last_error: None,
    }
}
