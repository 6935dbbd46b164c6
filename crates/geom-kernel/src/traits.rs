use crate::types::*;

/// Core geometry kernel trait. Provides the shape construction operations
/// features are built from. The kernel is a black box: it does the B-rep
/// math and reports modified/generated relations in the returned [`OpOutput`].
pub trait Kernel {
    /// Axis-aligned box primitive. Labels `solid`, `shell` and its six faces.
    fn make_box(&mut self, length: f64, width: f64, height: f64)
        -> Result<OpOutput, KernelError>;

    /// Offset every face of a shape by `distance`.
    fn offset(&mut self, shape: ShapeHandle, distance: f64) -> Result<OpOutput, KernelError>;

    /// Chamfer (bevel) the given edges of a solid or compound.
    fn chamfer(
        &mut self,
        shape: ShapeHandle,
        edges: &[ShapeHandle],
        distance: f64,
    ) -> Result<OpOutput, KernelError>;

    /// Boolean between a target and a tool solid.
    fn boolean(
        &mut self,
        target: ShapeHandle,
        tool: ShapeHandle,
        kind: BooleanKind,
    ) -> Result<OpOutput, KernelError>;

    /// Linear pattern: `count` located copies of `shape`, the first one being
    /// the shape itself. Labels the resulting `compound`.
    fn instance(
        &mut self,
        shape: ShapeHandle,
        count: usize,
        spacing: [f64; 3],
    ) -> Result<OpOutput, KernelError>;
}

/// Topology introspection trait. Provides read-only queries on kernel shapes.
pub trait KernelIntrospect {
    /// Kind of a shape, or None for an unknown handle.
    fn kind(&self, shape: ShapeHandle) -> Option<ShapeKind>;

    /// Direct children, in the kernel's stable order.
    fn children(&self, shape: ShapeHandle) -> Vec<ShapeHandle>;

    /// The boundary loop of a face.
    fn outer_wire(&self, face: ShapeHandle) -> Option<ShapeHandle>;

    /// Exact duplicate: same handle.
    fn is_equal(&self, a: ShapeHandle, b: ShapeHandle) -> bool {
        a == b
    }

    /// Same underlying data, possibly a different orientation.
    fn is_same(&self, a: ShapeHandle, b: ShapeHandle) -> bool;

    /// Same construction lineage, possibly a different location.
    fn is_partner(&self, a: ShapeHandle, b: ShapeHandle) -> bool;

    /// Every distinct sub-shape of `kind` under `root`, depth-first,
    /// counting orientation variants once.
    fn sub_shapes(&self, root: ShapeHandle, kind: ShapeKind) -> Vec<ShapeHandle> {
        let mut found: Vec<ShapeHandle> = Vec::new();
        let mut stack = vec![root];
        while let Some(shape) = stack.pop() {
            if self.kind(shape) == Some(kind) {
                if !found.iter().any(|f| self.is_same(*f, shape)) {
                    found.push(shape);
                }
                continue;
            }
            let mut children = self.children(shape);
            children.reverse();
            stack.extend(children);
        }
        found
    }
}

/// Combined trait for callers that need both mutable Kernel access
/// and read-only KernelIntrospect access on the same object.
///
/// This avoids the borrow-checker issue of needing &mut and & on the same value.
pub trait KernelBundle: Kernel + KernelIntrospect {
    fn as_introspect(&self) -> &dyn KernelIntrospect;
}

// Blanket implementation for any type that implements both traits
impl<T: Kernel + KernelIntrospect> KernelBundle for T {
    fn as_introspect(&self) -> &dyn KernelIntrospect {
        self
    }
}
