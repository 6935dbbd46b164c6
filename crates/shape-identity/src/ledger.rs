use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::IdGenerator;

/// Which kernel relation produced an evolution row.
///
/// A shape can be modified into some shapes and generate others in the same
/// operation (a chamfered edge does both); keeping the relation apart keeps
/// each output list stable on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvolutionRelation {
    #[default]
    Modified,
    Generated,
    /// Located copy of the input (pattern instances).
    Partner,
    /// Outer wire of a face whose id evolved.
    OuterWire,
}

/// "`in_id` produced `out_id`" in the owning feature's last recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvolutionRecord {
    pub in_id: Uuid,
    pub out_id: Uuid,
    #[serde(default)]
    pub relation: EvolutionRelation,
}

/// Per-feature table of how input ids persist into output ids.
///
/// Rows are kept in insertion order. Several rows may share an `in_id`
/// (a split); their order is the order the outputs were first seen and is
/// what keeps per-piece ids stable across recomputes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<EvolutionRecord>", into = "Vec<EvolutionRecord>")]
pub struct EvolutionLedger {
    records: Vec<EvolutionRecord>,
    by_in: HashMap<Uuid, Vec<usize>>,
    by_out: HashMap<Uuid, Vec<usize>>,
}

impl EvolutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `Modified` row.
    pub fn insert_evolve(&mut self, in_id: Uuid, out_id: Uuid) {
        self.insert_relation(in_id, out_id, EvolutionRelation::Modified);
    }

    /// Append a row. Duplicate in-ids are allowed (1→N).
    pub fn insert_relation(&mut self, in_id: Uuid, out_id: Uuid, relation: EvolutionRelation) {
        let index = self.records.len();
        self.records.push(EvolutionRecord {
            in_id,
            out_id,
            relation,
        });
        self.by_in.entry(in_id).or_default().push(index);
        self.by_out.entry(out_id).or_default().push(index);
    }

    /// Every out id recorded for `in_id`, in row order.
    pub fn evolve(&self, in_id: Uuid) -> Vec<Uuid> {
        self.rows_in(in_id).map(|r| r.out_id).collect()
    }

    /// Out ids recorded for `in_id` under one relation, in row order.
    pub fn evolve_by(&self, in_id: Uuid, relation: EvolutionRelation) -> Vec<Uuid> {
        self.rows_in(in_id)
            .filter(|r| r.relation == relation)
            .map(|r| r.out_id)
            .collect()
    }

    /// Every in id that produced `out_id`.
    pub fn devolve(&self, out_id: Uuid) -> Vec<Uuid> {
        self.by_out
            .get(&out_id)
            .map(|rows| rows.iter().map(|&i| self.records[i].in_id).collect())
            .unwrap_or_default()
    }

    pub fn has_evolve_record_in(&self, id: Uuid) -> bool {
        self.by_in.contains_key(&id)
    }

    pub fn has_evolve_record_out(&self, id: Uuid) -> bool {
        self.by_out.contains_key(&id)
    }

    /// Make sure `in_id` has at least `needed` rows under `relation` and
    /// return the first `needed` out ids in row order.
    ///
    /// With J existing rows and K = `needed` > J, K−J fresh ids are minted
    /// and appended. Callers pair the result positionally with the kernel's
    /// output list, whose order is stable for identical topology, so the
    /// same piece gets the same id every time.
    pub fn update_splits(
        &mut self,
        in_id: Uuid,
        relation: EvolutionRelation,
        needed: usize,
        ids: &mut dyn IdGenerator,
    ) -> Vec<Uuid> {
        let mut outs = self.evolve_by(in_id, relation);
        while outs.len() < needed {
            let fresh = ids.next_id();
            self.insert_relation(in_id, fresh, relation);
            outs.push(fresh);
        }
        outs.truncate(needed);
        outs
    }

    pub fn records(&self) -> &[EvolutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn rows_in(&self, in_id: Uuid) -> impl Iterator<Item = &EvolutionRecord> {
        self.by_in
            .get(&in_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.records[i])
    }
}

impl From<Vec<EvolutionRecord>> for EvolutionLedger {
    fn from(records: Vec<EvolutionRecord>) -> Self {
        let mut ledger = EvolutionLedger::new();
        for r in records {
            ledger.insert_relation(r.in_id, r.out_id, r.relation);
        }
        ledger
    }
}

impl From<EvolutionLedger> for Vec<EvolutionRecord> {
    fn from(ledger: EvolutionLedger) -> Self {
        ledger.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;

    #[test]
    fn duplicate_in_ids_keep_row_order() {
        let mut ledger = EvolutionLedger::new();
        let a = Uuid::from_u128(1);
        let (x, y) = (Uuid::from_u128(10), Uuid::from_u128(11));
        ledger.insert_evolve(a, x);
        ledger.insert_evolve(a, y);
        assert_eq!(ledger.evolve(a), vec![x, y]);
        assert_eq!(ledger.devolve(y), vec![a]);
        assert!(ledger.has_evolve_record_in(a));
        assert!(ledger.has_evolve_record_out(x));
        assert!(!ledger.has_evolve_record_out(a));
    }

    #[test]
    fn relations_are_kept_apart() {
        let mut ledger = EvolutionLedger::new();
        let edge = Uuid::from_u128(1);
        let trimmed = Uuid::from_u128(2);
        let bevel = Uuid::from_u128(3);
        ledger.insert_relation(edge, trimmed, EvolutionRelation::Modified);
        ledger.insert_relation(edge, bevel, EvolutionRelation::Generated);
        assert_eq!(ledger.evolve_by(edge, EvolutionRelation::Generated), vec![bevel]);
        assert_eq!(ledger.evolve(edge).len(), 2);
    }

    #[test]
    fn update_splits_mints_only_the_missing_ids() {
        let mut ids = SequentialIds::new(7);
        let mut ledger = EvolutionLedger::new();
        let face = Uuid::from_u128(1);
        let existing = Uuid::from_u128(100);
        ledger.insert_evolve(face, existing);

        let outs = ledger.update_splits(face, EvolutionRelation::Modified, 3, &mut ids);
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0], existing);
        assert_eq!(ids.issued(), 2);

        // Same request again: no new ids, same order.
        let again = ledger.update_splits(face, EvolutionRelation::Modified, 3, &mut ids);
        assert_eq!(again, outs);
        assert_eq!(ids.issued(), 2);

        // Fewer pieces: a prefix of the same ids.
        let fewer = ledger.update_splits(face, EvolutionRelation::Modified, 2, &mut ids);
        assert_eq!(fewer, outs[..2].to_vec());
    }

    #[test]
    fn serializes_as_a_plain_row_list() {
        let mut ledger = EvolutionLedger::new();
        ledger.insert_evolve(Uuid::from_u128(1), Uuid::from_u128(2));
        let json = serde_json::to_string(&ledger).unwrap();
        assert!(json.starts_with('['));
        let back: EvolutionLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
        assert_eq!(back.devolve(Uuid::from_u128(2)), vec![Uuid::from_u128(1)]);
    }
}
