//! ModelBuilder: fluent API for scripting modeling sessions in tests.
//!
//! Wraps an `Engine` and a `MockKernel`. All methods accept feature names
//! instead of UUIDs for readability; every structural call recomputes, the
//! way an interactive session does after each edit.

use std::collections::HashMap;

use feature_engine::{Engine, EngineConfig, Feature, FeatureKind};
use geom_kernel::{BooleanKind, KernelIntrospect, MockKernel, ShapeHandle, ShapeKind};
use seer_types::InputRole;
use shape_identity::{DiagnosticKind, Diagnostics, Pick, PickResolution, ShapeIdentityTable};
use tracing::debug;
use uuid::Uuid;

use crate::assertions;
use crate::helpers::HarnessError;

/// A fluent builder for constructing and verifying models in tests.
pub struct ModelBuilder {
    pub engine: Engine,
    kernel: MockKernel,
    named_features: HashMap<String, Uuid>,
    history: Vec<(String, String)>,
    auto_check: bool,
}

impl ModelBuilder {
    /// Sequential ids from seed 0.
    pub fn mock() -> Self {
        Self::with_config(EngineConfig::deterministic(0))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config),
            kernel: MockKernel::new(),
            named_features: HashMap::new(),
            history: Vec::new(),
            auto_check: false,
        }
    }

    /// After every recompute, fail on engine errors or identity repairs.
    pub fn with_auto_check(mut self) -> Self {
        self.auto_check = true;
        self
    }

    // ── Features ────────────────────────────────────────────────────────

    pub fn add_box(
        &mut self,
        name: &str,
        length: f64,
        width: f64,
        height: f64,
    ) -> Result<Uuid, HarnessError> {
        self.add(
            name,
            FeatureKind::Box {
                length,
                width,
                height,
            },
            &[],
        )
    }

    pub fn offset(&mut self, name: &str, target: &str, distance: f64) -> Result<Uuid, HarnessError> {
        self.add(
            name,
            FeatureKind::Offset { distance },
            &[(target, InputRole::Target)],
        )
    }

    /// Chamfer `edges` of `target`'s output. Picks are made now, against the
    /// current model.
    pub fn chamfer(
        &mut self,
        name: &str,
        target: &str,
        distance: f64,
        edges: &[Uuid],
    ) -> Result<Uuid, HarnessError> {
        let edges = edges
            .iter()
            .map(|edge| self.pick(target, *edge))
            .collect::<Result<Vec<_>, _>>()?;
        self.add(
            name,
            FeatureKind::Chamfer { distance, edges },
            &[(target, InputRole::Target)],
        )
    }

    pub fn instance(
        &mut self,
        name: &str,
        target: &str,
        count: usize,
        spacing: [f64; 3],
    ) -> Result<Uuid, HarnessError> {
        self.add(
            name,
            FeatureKind::Instance { count, spacing },
            &[(target, InputRole::Target)],
        )
    }

    pub fn boolean_union(&mut self, name: &str, a: &str, b: &str) -> Result<Uuid, HarnessError> {
        self.boolean_op(name, a, b, BooleanKind::Union)
    }

    /// `a` minus `b`.
    pub fn boolean_subtract(&mut self, name: &str, a: &str, b: &str) -> Result<Uuid, HarnessError> {
        self.boolean_op(name, a, b, BooleanKind::Subtract)
    }

    pub fn boolean_intersect(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
    ) -> Result<Uuid, HarnessError> {
        self.boolean_op(name, a, b, BooleanKind::Intersect)
    }

    fn boolean_op(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
        operation: BooleanKind,
    ) -> Result<Uuid, HarnessError> {
        self.add(
            name,
            FeatureKind::Boolean { operation },
            &[(a, InputRole::Target), (b, InputRole::Tool)],
        )
    }

    // ── Edits ───────────────────────────────────────────────────────────

    /// Replace a feature's parameters and recompute.
    pub fn edit(&mut self, name: &str, kind: FeatureKind) -> Result<&mut Self, HarnessError> {
        let id = self.feature_id(name)?;
        self.engine.edit_feature(id, kind)?;
        self.log("Edit", name);
        self.recompute()?;
        Ok(self)
    }

    pub fn connect(
        &mut self,
        parent: &str,
        child: &str,
        role: InputRole,
    ) -> Result<&mut Self, HarnessError> {
        let (parent_id, child_id) = (self.feature_id(parent)?, self.feature_id(child)?);
        self.engine.connect(parent_id, child_id, role)?;
        self.log("Connect", child);
        Ok(self)
    }

    pub fn skip(&mut self, name: &str, skipped: bool) -> Result<&mut Self, HarnessError> {
        let id = self.feature_id(name)?;
        self.engine.set_skipped(id, skipped)?;
        self.log(if skipped { "Skip" } else { "Unskip" }, name);
        self.recompute()?;
        Ok(self)
    }

    /// Force a feature and its dependents to recompute.
    pub fn touch(&mut self, name: &str) -> Result<&mut Self, HarnessError> {
        let id = self.feature_id(name)?;
        self.engine.set_dirty(id)?;
        self.log("Touch", name);
        self.recompute()?;
        Ok(self)
    }

    pub fn delete_feature(&mut self, name: &str) -> Result<&mut Self, HarnessError> {
        let id = self.feature_id(name)?;
        self.engine.remove_feature(id)?;
        self.named_features.remove(name);
        self.log("Delete", name);
        self.recompute()?;
        Ok(self)
    }

    /// Recompute dirty features. Returns the ids recomputed.
    pub fn recompute(&mut self) -> Result<Vec<Uuid>, HarnessError> {
        let recomputed = self.engine.recompute_all(&mut self.kernel);
        if self.auto_check {
            self.check_errors()?;
        }
        Ok(recomputed)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn feature_id(&self, name: &str) -> Result<Uuid, HarnessError> {
        self.named_features
            .get(name)
            .copied()
            .ok_or_else(|| HarnessError::FeatureNotFound {
                name: name.to_string(),
            })
    }

    pub fn feature(&self, name: &str) -> Result<&Feature, HarnessError> {
        let id = self.feature_id(name)?;
        self.engine
            .feature(id)
            .ok_or_else(|| HarnessError::FeatureNotFound {
                name: name.to_string(),
            })
    }

    pub fn feature_count(&self) -> usize {
        self.engine.graph.len()
    }

    pub fn table(&self, name: &str) -> Result<&ShapeIdentityTable, HarnessError> {
        Ok(&self.feature(name)?.table)
    }

    /// All ids of a feature's output, in table order.
    pub fn ids(&self, name: &str) -> Result<Vec<Uuid>, HarnessError> {
        Ok(self.table(name)?.get_all_ids())
    }

    /// Ids of one kind, in table order.
    pub fn ids_of_kind(&self, name: &str, kind: ShapeKind) -> Result<Vec<Uuid>, HarnessError> {
        let table = self.table(name)?;
        Ok(table
            .of_kind(kind)
            .into_iter()
            .filter_map(|o| table.record(o).and_then(|r| r.id))
            .collect())
    }

    /// The fixed id of a primitive's labelled sub-shape.
    pub fn tag_id(&self, name: &str, tag: &str) -> Result<Uuid, HarnessError> {
        seer_types::tag_id(&self.feature(name)?.tags, tag).ok_or_else(|| {
            HarnessError::TagNotFound {
                name: name.to_string(),
                tag: tag.to_string(),
            }
        })
    }

    /// Id of the first edge under the `child`-th child of `name`'s output
    /// root. Tells pattern copies apart.
    pub fn first_edge_of_child(&self, name: &str, child: usize) -> Result<Uuid, HarnessError> {
        let not_found = || HarnessError::AssertionFailed {
            detail: format!("{name} has no edge under child {child}"),
        };
        let feature = self.feature(name)?;
        let root = feature.output.ok_or_else(not_found)?;
        let solid: ShapeHandle = *self.kernel.children(root).get(child).ok_or_else(not_found)?;
        let edge = *self
            .kernel
            .sub_shapes(solid, ShapeKind::Edge)
            .first()
            .ok_or_else(not_found)?;
        feature.table.get_id(edge).ok_or_else(not_found)
    }

    pub fn pick(&self, name: &str, shape_id: Uuid) -> Result<Pick, HarnessError> {
        let id = self.feature_id(name)?;
        Ok(self.engine.make_pick(id, shape_id)?)
    }

    pub fn resolve(&self, pick: &Pick) -> PickResolution {
        self.engine.resolve_pick(pick)
    }

    pub fn kernel(&self) -> &MockKernel {
        &self.kernel
    }

    /// Kernel knobs take effect at the next recompute.
    pub fn kernel_mut(&mut self) -> &mut MockKernel {
        &mut self.kernel
    }

    pub fn engine_errors(&self) -> &[(Uuid, String)] {
        &self.engine.errors
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.engine.diagnostics
    }

    /// The action log.
    pub fn history(&self) -> &[(String, String)] {
        &self.history
    }

    // ── File I/O ────────────────────────────────────────────────────────

    pub fn save(&self) -> Result<String, HarnessError> {
        let meta = file_format::ProjectMetadata::new("harness");
        file_format::save_project(&self.engine, &meta).map_err(|e| HarnessError::File(e.to_string()))
    }

    /// Replace the session with a loaded project and recompute it on a fresh
    /// kernel.
    pub fn load(&mut self, json: &str, config: EngineConfig) -> Result<&mut Self, HarnessError> {
        let (engine, _) = file_format::load_project(json, config)
            .map_err(|e| HarnessError::File(e.to_string()))?;
        self.engine = engine;
        self.kernel = MockKernel::new();
        self.named_features = self
            .engine
            .graph
            .features()
            .map(|f| (f.name.clone(), f.id))
            .collect();
        self.log("Load", "project");
        self.recompute()?;
        Ok(self)
    }

    // ── Inline Assertions ───────────────────────────────────────────────

    pub fn assert_no_errors(&self) -> Result<&Self, HarnessError> {
        if self.engine.errors.is_empty() {
            Ok(self)
        } else {
            Err(HarnessError::AssertionFailed {
                detail: format!(
                    "expected no errors, got {}: {:?}",
                    self.engine.errors.len(),
                    self.engine.errors
                ),
            })
        }
    }

    pub fn assert_has_errors(&self) -> Result<&Self, HarnessError> {
        if !self.engine.errors.is_empty() {
            Ok(self)
        } else {
            Err(HarnessError::AssertionFailed {
                detail: "expected errors, but none found".to_string(),
            })
        }
    }

    /// Every feature's table is fully and uniquely identified, and no pass
    /// needed repairing.
    pub fn assert_identity_clean(&self) -> Result<&Self, HarnessError> {
        for feature in self.engine.graph.features() {
            assertions::assert_ids_well_formed(&feature.table, &feature.name)?;
        }
        assertions::assert_diagnostic_count(
            &self.engine.diagnostics,
            DiagnosticKind::StructuralInvariantViolation,
            0,
            "last recompute",
        )?;
        Ok(self)
    }

    // ── Internal Helpers ────────────────────────────────────────────────

    fn add(
        &mut self,
        name: &str,
        kind: FeatureKind,
        inputs: &[(&str, InputRole)],
    ) -> Result<Uuid, HarnessError> {
        self.check_name_available(name)?;
        let parents = inputs
            .iter()
            .map(|(parent, role)| Ok((self.feature_id(parent)?, *role)))
            .collect::<Result<Vec<_>, HarnessError>>()?;
        let type_name = kind.type_name();
        let id = self.engine.add_feature(name, kind);
        for (parent, role) in parents {
            self.engine.connect(parent, id, role)?;
        }
        self.named_features.insert(name.to_string(), id);
        self.log(&format!("Add({type_name})"), name);
        self.recompute()?;
        Ok(id)
    }

    fn log(&mut self, action: &str, subject: &str) {
        debug!(action, subject, "harness step");
        self.history.push((action.to_string(), subject.to_string()));
    }

    fn check_name_available(&self, name: &str) -> Result<(), HarnessError> {
        if self.named_features.contains_key(name) {
            Err(HarnessError::DuplicateName {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn check_errors(&self) -> Result<(), HarnessError> {
        if let Some((id, message)) = self.engine.errors.last() {
            return Err(HarnessError::AssertionFailed {
                detail: format!("auto_check: engine error on feature {id}: {message}"),
            });
        }
        assertions::assert_diagnostic_count(
            &self.engine.diagnostics,
            DiagnosticKind::StructuralInvariantViolation,
            0,
            "auto_check",
        )
    }
}
