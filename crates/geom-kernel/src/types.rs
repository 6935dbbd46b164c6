use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Re-export shared types from seer-types
pub use seer_types::ShapeKind;

/// Opaque handle to a sub-shape in the geometry kernel.
/// Valid only for the current kernel session. NEVER persisted: a kernel
/// regenerates handles on every recompute, which is why shapes need ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeHandle(pub u64);

/// Boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BooleanKind {
    Union,
    Subtract,
    Intersect,
}

/// An edge created by a Boolean where the surfaces of two input faces meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEdge {
    /// The new edge in the result.
    pub edge: ShapeHandle,
    /// The two input faces (one per operand) whose intersection produced it.
    pub faces: [ShapeHandle; 2],
}

/// Result of one kernel operation: the new shape tree plus the history
/// relations the kernel recorded while building it.
#[derive(Debug, Clone)]
pub struct OpOutput {
    /// Root of the produced shape tree.
    pub root: ShapeHandle,
    modified: HashMap<ShapeHandle, Vec<ShapeHandle>>,
    generated: HashMap<ShapeHandle, Vec<ShapeHandle>>,
    /// Boolean section edges. Empty for every other operation.
    pub sections: Vec<SectionEdge>,
    /// Labelled sub-shapes of primitives ("top", "solid", ...).
    pub named: Vec<(String, ShapeHandle)>,
}

impl OpOutput {
    pub fn new(root: ShapeHandle) -> Self {
        Self {
            root,
            modified: HashMap::new(),
            generated: HashMap::new(),
            sections: Vec::new(),
            named: Vec::new(),
        }
    }

    /// Shapes of the result that replace `input`.
    ///
    /// The list is in the kernel's creation order. Split bookkeeping assigns
    /// ids positionally, so implementations must keep this order stable for
    /// identical input topology.
    pub fn modified(&self, input: ShapeHandle) -> &[ShapeHandle] {
        self.modified.get(&input).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Shapes of the result that did not exist before and were caused by
    /// `input` (e.g. the face a chamfer creates from an edge). Same ordering
    /// contract as [`OpOutput::modified`].
    pub fn generated(&self, input: ShapeHandle) -> &[ShapeHandle] {
        self.generated.get(&input).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_modified(&mut self, input: ShapeHandle, output: ShapeHandle) {
        let outputs = self.modified.entry(input).or_default();
        if !outputs.contains(&output) {
            outputs.push(output);
        }
    }

    pub fn record_generated(&mut self, input: ShapeHandle, output: ShapeHandle) {
        let outputs = self.generated.entry(input).or_default();
        if !outputs.contains(&output) {
            outputs.push(output);
        }
    }

    /// Look up a labelled sub-shape.
    pub fn named(&self, tag: &str) -> Option<ShapeHandle> {
        self.named
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, handle)| *handle)
    }
}

/// Errors from kernel operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KernelError {
    #[error("boolean operation failed: {reason}")]
    BooleanFailed { reason: String },

    #[error("chamfer failed: {reason}")]
    ChamferFailed { reason: String },

    #[error("offset failed: {reason}")]
    OffsetFailed { reason: String },

    #[error("instance failed: {reason}")]
    InstanceFailed { reason: String },

    #[error("shape not found: {handle:?}")]
    ShapeNotFound { handle: ShapeHandle },

    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("kernel error: {message}")]
    Other { message: String },
}
