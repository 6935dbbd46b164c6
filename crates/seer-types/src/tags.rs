use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fixed id for a named sub-shape of a primitive feature.
///
/// Primitives have no earlier generation to match against, so their faces
/// (and solid/shell) get ids from these records, created once when the
/// feature is constructed and reused on every recompute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureTagRecord {
    pub id: Uuid,
    pub tag: String,
}

impl FeatureTagRecord {
    pub fn new(id: Uuid, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }
}

/// Find the id fixed for `tag`, if any.
pub fn tag_id(records: &[FeatureTagRecord], tag: &str) -> Option<Uuid> {
    records.iter().find(|r| r.tag == tag).map(|r| r.id)
}
