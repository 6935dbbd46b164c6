use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

/// What went wrong, by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiagnosticKind {
    /// A duplicate or lingering nil id after all matching passes. Repaired by
    /// minting a fresh id, but it means a matching pass has a defect.
    StructuralInvariantViolation,
    /// A pick could not be re-resolved; the consuming feature skipped it.
    UnresolvedPick,
    /// A Boolean produced more than one edge for the same face pair.
    AmbiguousIntersection,
    /// The geometry kernel failed during a feature's update.
    GeometryKernelFailure,
    /// A connection was refused because it would create a cycle.
    CycleRejected,
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The feature being updated when it happened, if any.
    pub feature_id: Option<Uuid>,
    pub message: String,
}

/// Structured sink for problems found during a recompute.
///
/// Everything reported is also logged, at `error` for invariant violations
/// and kernel failures and at `warn` otherwise.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        feature_id: Option<Uuid>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match kind {
            DiagnosticKind::StructuralInvariantViolation
            | DiagnosticKind::GeometryKernelFailure => {
                error!(?kind, ?feature_id, "{message}");
            }
            DiagnosticKind::UnresolvedPick
            | DiagnosticKind::AmbiguousIntersection
            | DiagnosticKind::CycleRejected => {
                warn!(?kind, ?feature_id, "{message}");
            }
        }
        self.entries.push(Diagnostic {
            kind,
            feature_id,
            message,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Move every entry of `other` into this sink.
    pub fn absorb(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }
}
