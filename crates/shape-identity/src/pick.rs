use geom_kernel::ShapeKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::history::ShapeHistory;
use crate::table::ShapeIdentityTable;

/// A stored reference to one sub-shape of an upstream feature's output.
///
/// Carries the devolve history of the shape at the time it was picked, so it
/// can be re-resolved after the shape disappears, even across a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub feature_id: Uuid,
    pub shape_id: Uuid,
    pub kind: ShapeKind,
    #[serde(default)]
    pub history: ShapeHistory,
}

impl Pick {
    pub fn new(feature_id: Uuid, shape_id: Uuid, kind: ShapeKind, history: &ShapeHistory) -> Self {
        Self {
            feature_id,
            shape_id,
            kind,
            history: history.create_devolve_history(shape_id),
        }
    }
}

/// Where a pick stands against the live model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickResolution {
    /// The picked id is still in the feature's output.
    Resolved(Uuid),
    /// The picked id is gone; these live ids continue its lineage.
    Stale(Vec<Uuid>),
    /// No lineage path to the live model.
    Lost,
}

impl PickResolution {
    /// Live ids to use, empty when lost.
    pub fn ids(&self) -> Vec<Uuid> {
        match self {
            PickResolution::Resolved(id) => vec![*id],
            PickResolution::Stale(ids) => ids.clone(),
            PickResolution::Lost => Vec::new(),
        }
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, PickResolution::Lost)
    }
}

/// Re-resolve `pick` against `live_table`, the current table of the picked
/// feature.
///
/// The stored history is anchored on the live graph at each of its ids in
/// turn (nearest ancestor first); the first anchor whose forward reach
/// holds live shapes of the picked kind wins. With no stored history the
/// live graph's own devolve history of the id is tried.
pub fn resolve_pick(
    pick: &Pick,
    live_table: &ShapeIdentityTable,
    history: &ShapeHistory,
    max_depth: Option<usize>,
) -> PickResolution {
    if live_table.has_id(pick.shape_id) {
        return PickResolution::Resolved(pick.shape_id);
    }
    let accept = |node: &crate::history::HistoryNode| {
        live_table
            .offset_of_id(node.shape_id)
            .and_then(|o| live_table.record(o))
            .is_some_and(|r| r.kind == pick.kind)
    };

    let found = history.resolve_histories_filtered(&pick.history, max_depth, accept);
    if !found.is_empty() {
        return PickResolution::Stale(found);
    }
    let live = history.create_devolve_history(pick.shape_id);
    let found = history.resolve_histories_filtered(&live, max_depth, accept);
    if !found.is_empty() {
        return PickResolution::Stale(found);
    }
    PickResolution::Lost
}
