use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical lineage of a shape that no relation identified: the ids of its
/// immediate parents, plus its position among unidentified siblings that
/// share exactly those parents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DerivedKey {
    pub parents: BTreeSet<Uuid>,
    pub ordinal: usize,
}

/// Persisted form of one [`DerivedIds`] entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub parents: Vec<Uuid>,
    pub ordinal: usize,
    pub id: Uuid,
}

/// Per-feature map from [`DerivedKey`] to the id it was given, so the same
/// lineage gets the same id on every recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DerivedRecord>", into = "Vec<DerivedRecord>")]
pub struct DerivedIds {
    map: BTreeMap<DerivedKey, Uuid>,
}

impl DerivedIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DerivedKey) -> Option<Uuid> {
        self.map.get(key).copied()
    }

    pub fn insert(&mut self, key: DerivedKey, id: Uuid) {
        self.map.insert(key, id);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DerivedKey, &Uuid)> {
        self.map.iter()
    }
}

impl From<Vec<DerivedRecord>> for DerivedIds {
    fn from(records: Vec<DerivedRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| {
                (
                    DerivedKey {
                        parents: r.parents.into_iter().collect(),
                        ordinal: r.ordinal,
                    },
                    r.id,
                )
            })
            .collect();
        Self { map }
    }
}

impl From<DerivedIds> for Vec<DerivedRecord> {
    fn from(ids: DerivedIds) -> Self {
        ids.map
            .into_iter()
            .map(|(key, id)| DerivedRecord {
                parents: key.parents.into_iter().collect(),
                ordinal: key.ordinal,
                id,
            })
            .collect()
    }
}
