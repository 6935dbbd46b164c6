//! Persistent shape identity.
//!
//! Every sub-shape a feature produces gets a stable id that survives
//! regeneration. The pieces:
//!
//! - [`ShapeIdentityTable`]: the ids of one feature's current output
//! - [`Identification`]: the ordered matching passes that fill a fresh table
//! - [`EvolutionLedger`]: per-feature record of which old id became which new ids
//! - [`IntersectionMapper`]: ids for topology only a Boolean creates
//! - [`ShapeHistory`]: project-wide evolve/devolve graph, used to re-resolve [`Pick`]s

pub mod derived;
pub mod diagnostics;
pub mod error;
pub mod history;
pub mod ids;
pub mod ledger;
pub mod mapper;
pub mod matching;
pub mod pick;
pub mod table;

pub use derived::{DerivedIds, DerivedKey};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::IdentityError;
pub use history::{HistoryNode, HistoryRecord, ShapeHistory};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use ledger::{EvolutionLedger, EvolutionRecord, EvolutionRelation};
pub use mapper::{IntersectionEdgeRecord, IntersectionMapper, SplitFaceRecord};
pub use matching::{Identification, IdentityOutcome, PriorIdentity};
pub use pick::{resolve_pick, Pick, PickResolution};
pub use table::{ShapeIdentityTable, ShapeRecord};
