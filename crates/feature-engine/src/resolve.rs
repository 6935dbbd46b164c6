use geom_kernel::ShapeHandle;
use shape_identity::{
    resolve_pick, DiagnosticKind, Diagnostics, Pick, PickResolution, ShapeHistory,
    ShapeIdentityTable,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Resolve a feature's stored picks against its input's live table.
///
/// Lost picks are reported as `UnresolvedPick` and dropped; the feature
/// carries on with whatever did resolve.
pub fn resolve_picks(
    feature_id: Uuid,
    picks: &[Pick],
    live_table: &ShapeIdentityTable,
    history: &ShapeHistory,
    max_depth: Option<usize>,
    diagnostics: &mut Diagnostics,
) -> Vec<ShapeHandle> {
    let mut handles = Vec::new();
    for pick in picks {
        let resolution = resolve_pick(pick, live_table, history, max_depth);
        match &resolution {
            PickResolution::Resolved(id) => {
                debug!(%id, "pick resolved directly");
            }
            PickResolution::Stale(ids) => {
                info!(picked = %pick.shape_id, resolved = ids.len(), "stale pick re-resolved");
            }
            PickResolution::Lost => {
                diagnostics.report(
                    DiagnosticKind::UnresolvedPick,
                    Some(feature_id),
                    format!("{} {} has no live successor", pick.kind, pick.shape_id),
                );
            }
        }
        for id in resolution.ids() {
            if let Some(handle) = live_table.get_shape(id) {
                if !handles.contains(&handle) {
                    handles.push(handle);
                }
            }
        }
    }
    handles
}
