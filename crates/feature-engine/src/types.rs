use geom_kernel::{BooleanKind, KernelError, ShapeHandle};
use seer_types::{FeatureTagRecord, InputRole};
use serde::{Deserialize, Serialize};
use shape_identity::{
    DerivedIds, EvolutionLedger, IdGenerator, IntersectionMapper, Pick, ShapeIdentityTable,
};
use uuid::Uuid;

/// A modeling operation with its parameters.
///
/// Closed set of feature kinds; every capability (update, identification,
/// description) dispatches on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureKind {
    Box {
        length: f64,
        width: f64,
        height: f64,
    },
    Offset {
        distance: f64,
    },
    Chamfer {
        distance: f64,
        edges: Vec<Pick>,
    },
    Boolean {
        operation: BooleanKind,
    },
    Instance {
        count: usize,
        spacing: [f64; 3],
    },
}

impl FeatureKind {
    /// Short type name for display.
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureKind::Box { .. } => "Box",
            FeatureKind::Offset { .. } => "Offset",
            FeatureKind::Chamfer { .. } => "Chamfer",
            FeatureKind::Boolean { .. } => "Boolean",
            FeatureKind::Instance { .. } => "Instance",
        }
    }

    /// Labels of the sub-shapes this kind fixes ids for at construction.
    pub fn tag_names(&self) -> &'static [&'static str] {
        match self {
            FeatureKind::Box { .. } => &[
                "solid", "shell", "top", "bottom", "front", "back", "left", "right",
            ],
            FeatureKind::Instance { .. } => &["compound"],
            FeatureKind::Offset { .. }
            | FeatureKind::Chamfer { .. }
            | FeatureKind::Boolean { .. } => &[],
        }
    }

    /// Inputs this kind consumes, in the order it consumes them.
    pub fn input_roles(&self) -> &'static [InputRole] {
        match self {
            FeatureKind::Box { .. } => &[],
            FeatureKind::Boolean { .. } => &[InputRole::Target, InputRole::Tool],
            FeatureKind::Offset { .. }
            | FeatureKind::Chamfer { .. }
            | FeatureKind::Instance { .. } => &[InputRole::Target],
        }
    }

    /// Parameter name/value pairs.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        match self {
            FeatureKind::Box {
                length,
                width,
                height,
            } => vec![
                ("length", length.to_string()),
                ("width", width.to_string()),
                ("height", height.to_string()),
            ],
            FeatureKind::Offset { distance } => vec![("distance", distance.to_string())],
            FeatureKind::Chamfer { distance, edges } => vec![
                ("distance", distance.to_string()),
                ("edges", edges.len().to_string()),
            ],
            FeatureKind::Boolean { operation } => {
                vec![("operation", format!("{operation:?}"))]
            }
            FeatureKind::Instance { count, spacing } => vec![
                ("count", count.to_string()),
                ("spacing", format!("{spacing:?}")),
            ],
        }
    }

    /// One-line human description, e.g. `Box(length=1, width=2, height=3)`.
    pub fn describe(&self) -> String {
        let params: Vec<String> = self
            .parameters()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("{}({})", self.type_name(), params.join(", "))
    }

    /// Fresh tag records for this kind.
    pub fn make_tags(&self, ids: &mut dyn IdGenerator) -> Vec<FeatureTagRecord> {
        self.tag_names()
            .iter()
            .map(|tag| FeatureTagRecord::new(ids.next_id(), *tag))
            .collect()
    }
}

/// Per-feature status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureState {
    /// Needs recomputing.
    pub dirty: bool,
    /// Takes part in recomputes. Inactive features stay dirty.
    pub active: bool,
    /// Nothing consumes this feature's output.
    pub leaf: bool,
    /// Passes its target input through unchanged.
    pub skipped: bool,
    /// The last update failed; table and output are from the last success.
    pub failed: bool,
}

impl Default for FeatureState {
    fn default() -> Self {
        Self {
            dirty: true,
            active: true,
            leaf: true,
            skipped: false,
            failed: false,
        }
    }
}

/// A single feature in the dependency graph.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Unique identifier.
    pub id: Uuid,
    /// User-visible name.
    pub name: String,
    pub kind: FeatureKind,
    /// Fixed ids for labelled sub-shapes (primitives only).
    pub tags: Vec<FeatureTagRecord>,
    pub state: FeatureState,
    /// Ids of the current output. Rebuilt on every successful recompute.
    pub table: ShapeIdentityTable,
    pub ledger: EvolutionLedger,
    pub derived: DerivedIds,
    pub mapper: IntersectionMapper,
    /// Root of the last successful output, if any.
    pub output: Option<ShapeHandle>,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

impl Feature {
    pub fn new(id: Uuid, name: impl Into<String>, kind: FeatureKind, ids: &mut dyn IdGenerator) -> Self {
        let tags = kind.make_tags(ids);
        Self {
            id,
            name: name.into(),
            kind,
            tags,
            state: FeatureState::default(),
            table: ShapeIdentityTable::default(),
            ledger: EvolutionLedger::new(),
            derived: DerivedIds::new(),
            mapper: IntersectionMapper::new(),
            output: None,
            last_error: None,
        }
    }

    /// Swap in a new kind. Tags already fixed for a label are kept so a
    /// parameter edit does not change primitive ids.
    pub fn set_kind(&mut self, kind: FeatureKind, ids: &mut dyn IdGenerator) {
        let mut tags = Vec::new();
        for name in kind.tag_names() {
            match self.tags.iter().find(|t| t.tag == *name) {
                Some(existing) => tags.push(existing.clone()),
                None => tags.push(FeatureTagRecord::new(ids.next_id(), *name)),
            }
        }
        self.tags = tags;
        self.kind = kind;
    }
}

/// Errors from the feature engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("feature not found: {id}")]
    FeatureNotFound { id: Uuid },

    #[error("no connection from {parent} to {child}")]
    EdgeNotFound { parent: Uuid, child: Uuid },

    #[error("connecting {parent} to {child} would create a cycle")]
    CycleDetected { parent: Uuid, child: Uuid },

    #[error("feature {id} has no {role} input with output")]
    MissingInput { id: Uuid, role: InputRole },

    #[error("shape {shape_id} is not in the output of feature {feature_id}")]
    ShapeNotFound { feature_id: Uuid, shape_id: Uuid },

    #[error("identity bookkeeping of feature {id} needed {count} repairs")]
    IdentityViolation { id: Uuid, count: usize },

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use shape_identity::SequentialIds;

    #[test]
    fn box_has_eight_tags_and_no_inputs() {
        let mut ids = SequentialIds::new(0);
        let kind = FeatureKind::Box {
            length: 1.0,
            width: 2.0,
            height: 3.0,
        };
        assert_eq!(kind.make_tags(&mut ids).len(), 8);
        assert!(kind.input_roles().is_empty());
        assert_eq!(kind.describe(), "Box(length=1, width=2, height=3)");
    }

    #[test]
    fn editing_parameters_keeps_tag_ids() {
        let mut ids = SequentialIds::new(0);
        let mut feature = Feature::new(
            Uuid::from_u128(1),
            "box",
            FeatureKind::Box {
                length: 1.0,
                width: 1.0,
                height: 1.0,
            },
            &mut ids,
        );
        let before = feature.tags.clone();
        feature.set_kind(
            FeatureKind::Box {
                length: 5.0,
                width: 1.0,
                height: 1.0,
            },
            &mut ids,
        );
        assert_eq!(feature.tags, before);
        assert!(feature.state.dirty);
    }

    #[test]
    fn kinds_round_trip_through_json() {
        let kind = FeatureKind::Boolean {
            operation: BooleanKind::Subtract,
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"Boolean\""));
        let back: FeatureKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
