use std::collections::{BTreeSet, HashMap};

use geom_kernel::{OpOutput, ShapeHandle, ShapeKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::diagnostics::DiagnosticKind;
use crate::matching::Identification;
use crate::table::ShapeIdentityTable;

/// An edge a Boolean created where two input faces meet, keyed by the
/// unordered pair of face ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionEdgeRecord {
    pub faces: BTreeSet<Uuid>,
    pub id: Uuid,
}

/// A piece of an input face that a Boolean cut, keyed by the face it came
/// from and the intersection edges bounding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFaceRecord {
    pub source_face: Uuid,
    pub edges: BTreeSet<Uuid>,
    pub face_id: Uuid,
    pub wire_id: Uuid,
}

/// Ids for topology that only exists because of a Boolean.
///
/// Kernel handles change on every run, so new edges and split faces are
/// recognized by canonical keys built from input ids instead. Records
/// persist with the owning feature and are only appended to, so the
/// registration order used for weak-match tie-breaks is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionMapper {
    #[serde(default)]
    edges: Vec<IntersectionEdgeRecord>,
    #[serde(default)]
    split_faces: Vec<SplitFaceRecord>,
}

impl IntersectionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_records(&self) -> &[IntersectionEdgeRecord] {
        &self.edges
    }

    pub fn split_face_records(&self) -> &[SplitFaceRecord] {
        &self.split_faces
    }

    /// Id registered for the edge between two faces.
    pub fn edge_id(&self, faces: &BTreeSet<Uuid>) -> Option<Uuid> {
        self.edges.iter().find(|r| &r.faces == faces).map(|r| r.id)
    }

    pub fn register_edge(&mut self, faces: BTreeSet<Uuid>, id: Uuid) {
        self.edges.push(IntersectionEdgeRecord { faces, id });
    }

    pub fn register_split_face(&mut self, record: SplitFaceRecord) {
        self.split_faces.push(record);
    }

    /// Exact key match among records not yet claimed in this run.
    pub fn strong_match(
        &self,
        source_face: Uuid,
        edges: &BTreeSet<Uuid>,
        claimed: &[bool],
    ) -> Option<usize> {
        self.split_faces.iter().enumerate().position(|(index, r)| {
            !claimed.get(index).copied().unwrap_or(false)
                && r.source_face == source_face
                && &r.edges == edges
        })
    }

    /// Unclaimed record of the same source face sharing the most edges.
    /// Ties go to the earliest registered; no overlap means no match.
    pub fn weak_match(
        &self,
        source_face: Uuid,
        edges: &BTreeSet<Uuid>,
        claimed: &[bool],
    ) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, record) in self.split_faces.iter().enumerate() {
            if claimed.get(index).copied().unwrap_or(false) || record.source_face != source_face {
                continue;
            }
            let overlap = record.edges.intersection(edges).count();
            if overlap == 0 {
                continue;
            }
            if best.map_or(true, |(_, size)| overlap > size) {
                best = Some((index, overlap));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Identify the Boolean's section edges and split faces in `ident`'s
    /// table. `sources` are the operand tables, target first.
    ///
    /// Runs before the Modified pass so split pieces get their keyed ids
    /// rather than positional ledger ids.
    pub fn map(
        &mut self,
        ident: &mut Identification<'_>,
        output: &OpOutput,
        sources: &[&ShapeIdentityTable],
    ) {
        let kernel = ident.kernel();
        let origin_id = |handle: ShapeHandle| {
            sources.iter().find_map(|s| {
                s.find(handle, kernel)
                    .and_then(|o| s.record(o))
                    .and_then(|r| r.id)
            })
        };

        // Intersection edges.
        let mut pair_seen: HashMap<BTreeSet<Uuid>, usize> = HashMap::new();
        let mut section_ids: Vec<Uuid> = Vec::new();
        let mut face_sections: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
        for section in &output.sections {
            let [first, second] = section.faces;
            let (Some(a), Some(b)) = (origin_id(first), origin_id(second)) else {
                debug!(edge = ?section.edge, "section edge with unidentified origin face");
                continue;
            };
            let key: BTreeSet<Uuid> = [a, b].into_iter().collect();
            let hits = pair_seen.entry(key.clone()).or_insert(0);
            *hits += 1;
            if *hits > 1 {
                ident.report(
                    DiagnosticKind::AmbiguousIntersection,
                    format!("faces {a} and {b} intersect in more than one edge"),
                );
                continue;
            }
            let id = match self.edge_id(&key) {
                Some(id) => id,
                None => {
                    let id = ident.mint();
                    self.register_edge(key, id);
                    id
                }
            };
            let Some(offset) = ident.table().find(section.edge, kernel) else {
                continue;
            };
            if ident.claim(offset, id) {
                section_ids.push(id);
                face_sections.entry(a).or_default().insert(id);
                face_sections.entry(b).or_default().insert(id);
            } else {
                warn!(%id, "intersection edge id already taken");
            }
        }
        if section_ids.is_empty() {
            return;
        }

        // Split faces.
        let mut claimed = vec![false; self.split_faces.len()];
        for source in sources {
            for record in source.records() {
                let Some(source_face) = record.id.filter(|_| record.kind == ShapeKind::Face)
                else {
                    continue;
                };
                if !face_sections.contains_key(&source_face) {
                    continue;
                }
                let mut pieces: Vec<usize> = Vec::new();
                for handle in source.handles(record.offset) {
                    for out in output.modified(*handle) {
                        if let Some(o) = ident.table().find(*out, kernel) {
                            if !pieces.contains(&o) {
                                pieces.push(o);
                            }
                        }
                    }
                }

                for piece in pieces {
                    let table = ident.table();
                    if table.record(piece).is_some_and(|r| r.id.is_some()) {
                        continue;
                    }
                    let Some(wire) = table.outer_wire(piece) else {
                        continue;
                    };
                    let edges: BTreeSet<Uuid> = table
                        .children(wire)
                        .iter()
                        .filter_map(|e| table.record(*e).and_then(|r| r.id))
                        .filter(|id| section_ids.contains(id))
                        .collect();
                    if edges.is_empty() {
                        continue;
                    }

                    let index = match self.strong_match(source_face, &edges, &claimed) {
                        Some(index) => index,
                        None => match self.weak_match(source_face, &edges, &claimed) {
                            Some(index) => {
                                self.split_faces[index].edges = edges;
                                index
                            }
                            None => {
                                let face_id = ident.mint();
                                let wire_id = ident.mint();
                                self.register_split_face(SplitFaceRecord {
                                    source_face,
                                    edges,
                                    face_id,
                                    wire_id,
                                });
                                claimed.push(false);
                                self.split_faces.len() - 1
                            }
                        },
                    };
                    claimed[index] = true;
                    let split = self.split_faces[index].clone();
                    if ident.claim(piece, split.face_id) {
                        ident.connect(source_face, split.face_id);
                    }
                    ident.claim(wire, split.wire_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn edges(ns: &[u128]) -> BTreeSet<Uuid> {
        ns.iter().map(|n| id(*n)).collect()
    }

    fn split(face: u128, es: &[u128], out: u128) -> SplitFaceRecord {
        SplitFaceRecord {
            source_face: id(face),
            edges: edges(es),
            face_id: id(out),
            wire_id: id(out + 1000),
        }
    }

    #[test]
    fn weak_match_breaks_ties_by_registration_order() {
        let mut mapper = IntersectionMapper::new();
        mapper.register_split_face(split(1, &[10, 11, 12], 100));
        mapper.register_split_face(split(1, &[10, 11, 12, 13], 101));
        mapper.register_split_face(split(1, &[10], 102));

        // overlaps are [3, 3, 1]
        let wanted = edges(&[10, 11, 12, 14]);
        let claimed = [false; 3];
        assert_eq!(mapper.weak_match(id(1), &wanted, &claimed), Some(0));
        // with the first one taken the second size-3 candidate wins
        assert_eq!(mapper.weak_match(id(1), &wanted, &[true, false, false]), Some(1));
    }

    #[test]
    fn weak_match_needs_overlap_and_same_source_face() {
        let mut mapper = IntersectionMapper::new();
        mapper.register_split_face(split(1, &[10], 100));
        assert_eq!(mapper.weak_match(id(1), &edges(&[11]), &[false]), None);
        assert_eq!(mapper.weak_match(id(2), &edges(&[10]), &[false]), None);
    }

    #[test]
    fn strong_match_skips_claimed_records() {
        let mut mapper = IntersectionMapper::new();
        mapper.register_split_face(split(1, &[10], 100));
        mapper.register_split_face(split(1, &[10], 101));
        let key = edges(&[10]);
        assert_eq!(mapper.strong_match(id(1), &key, &[false, false]), Some(0));
        assert_eq!(mapper.strong_match(id(1), &key, &[true, false]), Some(1));
        assert_eq!(mapper.strong_match(id(1), &key, &[true, true]), None);
    }

    #[test]
    fn edge_lookup_is_unordered() {
        let mut mapper = IntersectionMapper::new();
        mapper.register_edge(edges(&[1, 2]), id(50));
        assert_eq!(mapper.edge_id(&edges(&[2, 1])), Some(id(50)));
        assert_eq!(mapper.edge_id(&edges(&[1, 3])), None);
    }
}
