use std::collections::{BTreeSet, HashMap, HashSet};

use geom_kernel::{KernelIntrospect, OpOutput, ShapeHandle, ShapeKind};
use seer_types::{tag_id, FeatureTagRecord};
use tracing::debug;
use uuid::Uuid;

use crate::derived::{DerivedIds, DerivedKey};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ids::IdGenerator;
use crate::ledger::{EvolutionLedger, EvolutionRelation};
use crate::table::ShapeIdentityTable;

/// What a feature's previous recompute left behind for this one to match
/// against.
#[derive(Debug, Clone, Copy)]
pub struct PriorIdentity<'a> {
    pub table: Option<&'a ShapeIdentityTable>,
    pub ledger: &'a EvolutionLedger,
    pub derived: &'a DerivedIds,
}

/// Everything one successful identification produces.
#[derive(Debug, Clone, Default)]
pub struct IdentityOutcome {
    pub table: ShapeIdentityTable,
    pub ledger: EvolutionLedger,
    pub derived: DerivedIds,
    /// Old id → new id continuity established this pass, in discovery order.
    pub connections: Vec<(Uuid, Uuid)>,
}

/// One identification run over a feature's fresh output tree.
///
/// Holds the fresh table while the matching passes fill it in. Passes only
/// ever assign ids to records that are still nil, so callers order them from
/// most to least trustworthy. The ledger and derived map are rebuilt, using
/// the prior ones as the lookup source.
pub struct Identification<'a> {
    feature_id: Uuid,
    kernel: &'a dyn KernelIntrospect,
    ids: &'a mut dyn IdGenerator,
    diagnostics: &'a mut Diagnostics,
    prior: PriorIdentity<'a>,
    table: ShapeIdentityTable,
    ledger: EvolutionLedger,
    consulted: HashSet<Uuid>,
    derived: DerivedIds,
    connections: Vec<(Uuid, Uuid)>,
}

impl<'a> Identification<'a> {
    pub fn new(
        feature_id: Uuid,
        root: ShapeHandle,
        kernel: &'a dyn KernelIntrospect,
        ids: &'a mut dyn IdGenerator,
        diagnostics: &'a mut Diagnostics,
        prior: PriorIdentity<'a>,
    ) -> Self {
        Self {
            feature_id,
            kernel,
            ids,
            diagnostics,
            prior,
            table: ShapeIdentityTable::from_tree(root, kernel),
            ledger: EvolutionLedger::new(),
            consulted: HashSet::new(),
            derived: DerivedIds::new(),
            connections: Vec::new(),
        }
    }

    pub fn feature_id(&self) -> Uuid {
        self.feature_id
    }

    pub fn kernel(&self) -> &'a dyn KernelIntrospect {
        self.kernel
    }

    pub fn table(&self) -> &ShapeIdentityTable {
        &self.table
    }

    /// A fresh id from the run's generator.
    pub fn mint(&mut self) -> Uuid {
        self.ids.next_id()
    }

    /// Guarded assignment; see [`ShapeIdentityTable::claim`].
    pub fn claim(&mut self, offset: usize, id: Uuid) -> bool {
        self.table.claim(offset, id)
    }

    /// Note that `from` continues as `to` in this feature.
    pub fn connect(&mut self, from: Uuid, to: Uuid) {
        if from != to && !self.connections.contains(&(from, to)) {
            self.connections.push((from, to));
        }
    }

    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.report(kind, Some(self.feature_id), message);
    }

    /// The first `needed` ledger ids for `in_id` under `relation`, minting
    /// as needed. The first time an in-id is consulted in this run, all of
    /// its prior rows carry over so a split that shrinks and grows back
    /// gets its old ids again.
    pub fn evolve_ids(
        &mut self,
        in_id: Uuid,
        relation: EvolutionRelation,
        needed: usize,
    ) -> Vec<Uuid> {
        if self.consulted.insert(in_id) {
            for record in self.prior.ledger.records() {
                if record.in_id == in_id {
                    self.ledger
                        .insert_relation(record.in_id, record.out_id, record.relation);
                }
            }
        }
        self.ledger
            .update_splits(in_id, relation, needed, &mut *self.ids)
    }

    /// Ids of the primitive's labelled sub-shapes, fixed at feature creation.
    pub fn tag_match(&mut self, output: &OpOutput, tags: &[FeatureTagRecord]) {
        for (name, handle) in &output.named {
            let (Some(id), Some(offset)) = (tag_id(tags, name), self.table.index_of(*handle))
            else {
                continue;
            };
            self.claim(offset, id);
        }
    }

    /// Shapes carried over unchanged keep their id. Tries the exact handle,
    /// then same underlying data.
    pub fn shape_match(&mut self, source: &ShapeIdentityTable) {
        for offset in 0..self.table.len() {
            let record = self.table.records()[offset];
            if record.id.is_some() {
                continue;
            }
            let id = source
                .find(record.shape, self.kernel)
                .and_then(|o| source.record(o))
                .filter(|r| r.kind == record.kind)
                .and_then(|r| r.id);
            if let Some(id) = id {
                self.claim(offset, id);
            }
        }
    }

    /// Where exactly one shape of a kind is unidentified on both sides, they
    /// are the same shape.
    pub fn unique_type_match(&mut self, source: &ShapeIdentityTable) {
        for kind in ShapeKind::ALL {
            let fresh = self.table.unidentified(kind);
            let [offset] = fresh.as_slice() else {
                continue;
            };
            let remaining: Vec<Uuid> = source
                .of_kind(kind)
                .into_iter()
                .filter_map(|o| source.record(o).and_then(|r| r.id))
                .filter(|id| !self.table.has_id(*id))
                .collect();
            if let [id] = remaining.as_slice() {
                self.claim(*offset, *id);
            }
        }
    }

    /// Fresh-table offsets of every output the kernel reported for any
    /// handle of source record `source_offset`, in report order.
    fn related(
        &self,
        source: &ShapeIdentityTable,
        source_offset: usize,
        relation: impl Fn(ShapeHandle) -> Vec<ShapeHandle>,
    ) -> Vec<usize> {
        let mut offsets = Vec::new();
        for handle in source.handles(source_offset) {
            for out in relation(*handle) {
                if let Some(o) = self.table.find(out, self.kernel) {
                    if !offsets.contains(&o) {
                        offsets.push(o);
                    }
                }
            }
        }
        offsets
    }

    fn nil_only(&self, offsets: Vec<usize>) -> Vec<usize> {
        offsets
            .into_iter()
            .filter(|o| self.table.record(*o).is_some_and(|r| r.id.is_none()))
            .collect()
    }

    /// Assign ledger ids for `in_id` positionally to `targets`.
    fn split_assign(&mut self, in_id: Uuid, relation: EvolutionRelation, targets: &[usize]) {
        let ids = self.evolve_ids(in_id, relation, targets.len());
        for (offset, id) in targets.iter().zip(ids) {
            if self.claim(*offset, id) {
                self.connect(in_id, id);
            }
        }
    }

    /// The kernel's Modified relation. A single replacement keeps the
    /// source id; a split goes through the ledger.
    pub fn modified_match(&mut self, output: &OpOutput, source: &ShapeIdentityTable) {
        for source_offset in 0..source.len() {
            let Some(in_id) = source.record(source_offset).and_then(|r| r.id) else {
                continue;
            };
            let all = self.related(source, source_offset, |h| output.modified(h).to_vec());
            let single = all.len() == 1;
            let targets = self.nil_only(all);
            if targets.is_empty() {
                continue;
            }
            if single && self.claim(targets[0], in_id) {
                continue;
            }
            self.split_assign(in_id, EvolutionRelation::Modified, &targets);
        }
    }

    /// The kernel's Generated relation, keyed through the ledger by the
    /// causing shape's id.
    pub fn generated_match(&mut self, output: &OpOutput, source: &ShapeIdentityTable) {
        for source_offset in 0..source.len() {
            let Some(in_id) = source.record(source_offset).and_then(|r| r.id) else {
                continue;
            };
            let all = self.related(source, source_offset, |h| output.generated(h).to_vec());
            let targets = self.nil_only(all);
            if !targets.is_empty() {
                self.split_assign(in_id, EvolutionRelation::Generated, &targets);
            }
        }
    }

    /// Located copies of a source shape, through the ledger in table order.
    pub fn partner_match(&mut self, source: &ShapeIdentityTable) {
        for source_record in source.records().to_vec() {
            let Some(in_id) = source_record.id else {
                continue;
            };
            let targets: Vec<usize> = self
                .table
                .unidentified(source_record.kind)
                .into_iter()
                .filter(|o| {
                    self.table
                        .record(*o)
                        .is_some_and(|r| self.kernel.is_partner(source_record.shape, r.shape))
                })
                .collect();
            if !targets.is_empty() {
                self.split_assign(in_id, EvolutionRelation::Partner, &targets);
            }
        }
    }

    /// Outer wires of identified faces. A face carrying its source's id
    /// takes the source wire's id; a face whose id came out of the ledger
    /// gets a wire id keyed on the face id.
    pub fn outer_wire_match(&mut self, source: &ShapeIdentityTable) {
        for face in self.table.of_kind(ShapeKind::Face) {
            let Some(face_id) = self.table.record(face).and_then(|r| r.id) else {
                continue;
            };
            let Some(wire) = self.table.outer_wire(face) else {
                continue;
            };
            if self.table.record(wire).is_some_and(|r| r.id.is_some()) {
                continue;
            }

            let source_wire_id = |face_id: Uuid| {
                source
                    .offset_of_id(face_id)
                    .and_then(|o| source.outer_wire(o))
                    .and_then(|w| source.record(w))
                    .and_then(|r| r.id)
            };

            if let Some(source_wire) = source_wire_id(face_id) {
                if self.claim(wire, source_wire) {
                    continue;
                }
            }
            let origin = self
                .ledger
                .devolve(face_id)
                .into_iter()
                .find_map(source_wire_id);
            let Some(origin) = origin else {
                continue;
            };
            let ids = self.evolve_ids(face_id, EvolutionRelation::OuterWire, 1);
            if let Some(&id) = ids.first() {
                if self.claim(wire, id) {
                    self.connect(origin, id);
                }
            }
        }
    }

    /// Whatever is left below the faces gets an id from its parents' ids,
    /// top-down so parents are settled first. Siblings with identical parent
    /// sets are told apart by their order in the table.
    pub fn derived_match(&mut self) {
        for kind in ShapeKind::DERIVABLE {
            let mut seen: HashMap<BTreeSet<Uuid>, usize> = HashMap::new();
            for offset in self.table.unidentified(kind) {
                let parent_ids: Option<BTreeSet<Uuid>> = self
                    .table
                    .parents(offset)
                    .iter()
                    .map(|p| self.table.record(*p).and_then(|r| r.id))
                    .collect();
                let Some(parents) = parent_ids.filter(|p| !p.is_empty()) else {
                    continue;
                };
                let ordinal = seen.entry(parents.clone()).or_insert(0);
                let key = DerivedKey {
                    parents,
                    ordinal: *ordinal,
                };
                *ordinal += 1;

                let remembered = self
                    .derived
                    .get(&key)
                    .or_else(|| self.prior.derived.get(&key));
                let id = match remembered {
                    Some(id) if !self.table.has_id(id) => id,
                    _ => self.ids.next_id(),
                };
                if self.claim(offset, id) {
                    self.derived.insert(key, id);
                }
            }
        }
    }

    /// Mint an id for anything still nil. Every hit is a defect in an
    /// earlier pass and is reported as such.
    pub fn ensure_no_nils(&mut self) {
        let nils: Vec<(usize, ShapeKind)> = self
            .table
            .records()
            .iter()
            .filter(|r| r.id.is_none())
            .map(|r| (r.offset, r.kind))
            .collect();
        for (offset, kind) in nils {
            let id = self.ids.next_id();
            self.table.update_id(offset, id);
            self.report(
                DiagnosticKind::StructuralInvariantViolation,
                format!("{kind} at offset {offset} left without an id; minted {id}"),
            );
        }
    }

    /// Re-mint every id already held by an earlier record.
    pub fn ensure_no_duplicates(&mut self) {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for record in self.table.records() {
            if let Some(id) = record.id {
                if !seen.insert(id) {
                    duplicates.push((record.offset, id));
                }
            }
        }
        for (offset, id) in duplicates {
            let fresh = self.ids.next_id();
            self.table.update_id(offset, fresh);
            self.report(
                DiagnosticKind::StructuralInvariantViolation,
                format!("duplicate id {id} at offset {offset}; replaced with {fresh}"),
            );
        }
    }

    /// Shape match then unique-type match against the feature's own
    /// previous table, if it has one.
    pub fn prior_match(&mut self) {
        if let Some(previous) = self.prior.table {
            self.shape_match(previous);
            self.unique_type_match(previous);
        }
    }

    /// Close the run. Prior ledger rows for ids no pass consulted are kept,
    /// so a shape that is absent for a while gets its old ids back later.
    pub fn finish(mut self) -> IdentityOutcome {
        for record in self.prior.ledger.records() {
            if !self.consulted.contains(&record.in_id) {
                self.ledger
                    .insert_relation(record.in_id, record.out_id, record.relation);
            }
        }
        debug!(
            feature = %self.feature_id,
            shapes = self.table.len(),
            rows = self.ledger.len(),
            connections = self.connections.len(),
            "identification finished"
        );
        IdentityOutcome {
            table: self.table,
            ledger: self.ledger,
            derived: self.derived,
            connections: self.connections,
        }
    }
}
