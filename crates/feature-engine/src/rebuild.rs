use geom_kernel::{KernelBundle, OpOutput, ShapeHandle};
use shape_identity::{
    DiagnosticKind, Diagnostics, IdGenerator, Identification, IdentityOutcome,
    IntersectionMapper, PriorIdentity, ShapeHistory, ShapeIdentityTable,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::graph::{FeatureGraph, FeatureKey};
use crate::resolve::resolve_picks;
use crate::types::{EngineError, Feature, FeatureKind};

/// Outcome of one recompute pass.
#[derive(Debug, Default)]
pub struct RebuildState {
    /// Features updated in this pass, in the order they ran.
    pub recomputed: Vec<Uuid>,
    /// Features that failed, with error messages.
    pub errors: Vec<(Uuid, String)>,
    pub diagnostics: Diagnostics,
}

/// An upstream feature's output as seen by a consumer.
struct Input<'g> {
    root: ShapeHandle,
    table: &'g ShapeIdentityTable,
}

/// A fully identified result, not yet committed to the feature.
enum Update {
    Computed {
        root: ShapeHandle,
        outcome: IdentityOutcome,
        mapper: IntersectionMapper,
    },
    PassThrough {
        root: Option<ShapeHandle>,
        table: ShapeIdentityTable,
    },
}

/// Recompute every dirty, active feature in topological order.
///
/// A feature that fails is marked failed and clean, keeps its previous table
/// and output, and the pass moves on; dependents consume the stale output.
/// Inactive features are left dirty and untouched.
#[instrument(skip_all, fields(features = graph.len()))]
pub fn recompute_all(
    graph: &mut FeatureGraph,
    history: &mut ShapeHistory,
    ids: &mut dyn IdGenerator,
    config: &EngineConfig,
    kb: &mut dyn KernelBundle,
) -> RebuildState {
    let mut state = RebuildState::default();

    for key in graph.topological_order() {
        let Some(feature) = graph.get(key) else {
            continue;
        };
        if !feature.state.dirty {
            continue;
        }
        let feature_id = feature.id;
        if !feature.state.active {
            debug!(feature = %feature_id, "inactive, left dirty");
            continue;
        }

        let mut local = Diagnostics::new();
        let result = update_feature(graph, key, history, ids, config, kb, &mut local);
        let result = match result {
            Ok(Update::Computed { .. }) if config.strict_identity => {
                let count = local.count(DiagnosticKind::StructuralInvariantViolation);
                if count > 0 {
                    Err(EngineError::IdentityViolation {
                        id: feature_id,
                        count,
                    })
                } else {
                    result
                }
            }
            other => other,
        };

        match result {
            Ok(update) => {
                commit(graph, key, history, update, &mut local);
                state.recomputed.push(feature_id);
            }
            Err(error) => {
                if matches!(error, EngineError::Kernel(_)) {
                    local.report(
                        DiagnosticKind::GeometryKernelFailure,
                        Some(feature_id),
                        error.to_string(),
                    );
                } else {
                    warn!(feature = %feature_id, %error, "feature update failed");
                }
                if let Some(feature) = graph.get_mut(key) {
                    feature.state.failed = true;
                    feature.state.dirty = false;
                    feature.last_error = Some(error.to_string());
                }
                state.errors.push((feature_id, error.to_string()));
            }
        }
        state.diagnostics.absorb(local);
    }

    info!(
        recomputed = state.recomputed.len(),
        failed = state.errors.len(),
        "recompute pass finished"
    );
    state
}

fn gather_inputs<'g>(
    graph: &'g FeatureGraph,
    key: FeatureKey,
    feature: &Feature,
) -> Result<Vec<Input<'g>>, EngineError> {
    let mut inputs = Vec::new();
    for &role in feature.kind.input_roles() {
        let input = graph
            .input(key, role)
            .and_then(|k| graph.get(k))
            .and_then(|parent| {
                parent.output.map(|root| Input {
                    root,
                    table: &parent.table,
                })
            })
            .ok_or(EngineError::MissingInput {
                id: feature.id,
                role,
            })?;
        inputs.push(input);
    }
    Ok(inputs)
}

fn update_feature(
    graph: &FeatureGraph,
    key: FeatureKey,
    history: &ShapeHistory,
    ids: &mut dyn IdGenerator,
    config: &EngineConfig,
    kb: &mut dyn KernelBundle,
    diagnostics: &mut Diagnostics,
) -> Result<Update, EngineError> {
    let feature = graph
        .get(key)
        .ok_or(EngineError::FeatureNotFound { id: Uuid::nil() })?;
    let inputs = gather_inputs(graph, key, feature)?;

    if feature.state.skipped {
        debug!(feature = %feature.id, "skipped, passing target through");
        return Ok(match inputs.first() {
            Some(target) => Update::PassThrough {
                root: Some(target.root),
                table: target.table.clone(),
            },
            None => Update::PassThrough {
                root: None,
                table: ShapeIdentityTable::default(),
            },
        });
    }

    let output = execute(feature, &inputs, kb, history, config, diagnostics)?;
    let kernel = kb.as_introspect();
    let prior = PriorIdentity {
        table: feature.output.map(|_| &feature.table),
        ledger: &feature.ledger,
        derived: &feature.derived,
    };
    let mut mapper = feature.mapper.clone();
    let outcome = identify(
        feature,
        &output,
        &inputs,
        Identification::new(feature.id, output.root, kernel, ids, diagnostics, prior),
        &mut mapper,
    );
    Ok(Update::Computed {
        root: output.root,
        outcome,
        mapper,
    })
}

/// Run the kernel operation for a feature.
fn execute(
    feature: &Feature,
    inputs: &[Input<'_>],
    kb: &mut dyn KernelBundle,
    history: &ShapeHistory,
    config: &EngineConfig,
    diagnostics: &mut Diagnostics,
) -> Result<OpOutput, EngineError> {
    let output = match &feature.kind {
        FeatureKind::Box {
            length,
            width,
            height,
        } => kb.make_box(*length, *width, *height)?,
        FeatureKind::Offset { distance } => kb.offset(inputs[0].root, *distance)?,
        FeatureKind::Chamfer { distance, edges } => {
            let handles = resolve_picks(
                feature.id,
                edges,
                inputs[0].table,
                history,
                config.max_history_depth,
                diagnostics,
            );
            kb.chamfer(inputs[0].root, &handles, *distance)?
        }
        FeatureKind::Boolean { operation } => {
            kb.boolean(inputs[0].root, inputs[1].root, *operation)?
        }
        FeatureKind::Instance { count, spacing } => {
            kb.instance(inputs[0].root, *count, *spacing)?
        }
    };
    Ok(output)
}

/// The matching passes for each kind, most trustworthy first. Input tables
/// come before the feature's own previous table.
fn identify(
    feature: &Feature,
    output: &OpOutput,
    inputs: &[Input<'_>],
    mut ident: Identification<'_>,
    mapper: &mut IntersectionMapper,
) -> IdentityOutcome {
    match &feature.kind {
        FeatureKind::Box { .. } => {
            ident.tag_match(output, &feature.tags);
            ident.prior_match();
        }
        FeatureKind::Offset { .. } => {
            let target = inputs[0].table;
            ident.shape_match(target);
            ident.unique_type_match(target);
            ident.modified_match(output, target);
            ident.prior_match();
            ident.outer_wire_match(target);
        }
        FeatureKind::Chamfer { .. } => {
            let target = inputs[0].table;
            ident.shape_match(target);
            ident.unique_type_match(target);
            ident.modified_match(output, target);
            ident.generated_match(output, target);
            ident.prior_match();
            ident.outer_wire_match(target);
        }
        FeatureKind::Boolean { .. } => {
            let (target, tool) = (inputs[0].table, inputs[1].table);
            ident.shape_match(target);
            ident.shape_match(tool);
            ident.unique_type_match(target);
            ident.unique_type_match(tool);
            mapper.map(&mut ident, output, &[target, tool]);
            ident.modified_match(output, target);
            ident.modified_match(output, tool);
            ident.generated_match(output, target);
            ident.generated_match(output, tool);
            ident.prior_match();
            ident.outer_wire_match(target);
            ident.outer_wire_match(tool);
        }
        FeatureKind::Instance { .. } => {
            let target = inputs[0].table;
            ident.tag_match(output, &feature.tags);
            ident.shape_match(target);
            ident.partner_match(target);
            ident.prior_match();
            ident.outer_wire_match(target);
        }
    }
    ident.derived_match();
    ident.ensure_no_nils();
    ident.ensure_no_duplicates();
    ident.finish()
}

/// Install a successful update and push its ids and continuity into the
/// history graph.
fn commit(
    graph: &mut FeatureGraph,
    key: FeatureKey,
    history: &mut ShapeHistory,
    update: Update,
    diagnostics: &mut Diagnostics,
) {
    let Some(feature) = graph.get_mut(key) else {
        return;
    };
    match update {
        Update::Computed {
            root,
            outcome,
            mapper,
        } => {
            for id in outcome.table.get_all_ids() {
                history.add_shape(feature.id, id);
            }
            for (from, to) in &outcome.connections {
                if let Err(error) = history.add_connection(*from, *to) {
                    diagnostics.report(
                        DiagnosticKind::StructuralInvariantViolation,
                        Some(feature.id),
                        format!("history connection {from} -> {to} dropped: {error}"),
                    );
                }
            }
            debug!(
                feature = %feature.id,
                shapes = outcome.table.len(),
                connections = outcome.connections.len(),
                "feature committed"
            );
            feature.table = outcome.table;
            feature.ledger = outcome.ledger;
            feature.derived = outcome.derived;
            feature.mapper = mapper;
            feature.output = Some(root);
        }
        Update::PassThrough { root, table } => {
            feature.output = root;
            feature.table = table;
        }
    }
    feature.state.failed = false;
    feature.state.dirty = false;
    feature.last_error = None;
}
