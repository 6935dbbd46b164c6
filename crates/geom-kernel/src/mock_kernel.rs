//! MockKernel: deterministic test double implementing Kernel + KernelIntrospect.
//!
//! Produces synthetic topology with predictable entity counts and history
//! relations. There is no geometry: parameters are validated, never used for
//! math. What matters for identity bookkeeping is modelled faithfully:
//!
//! - every operation allocates fresh handles for whatever it rebuilds, the way
//!   a real kernel regenerates topology on recompute;
//! - untouched sub-shapes are shared by handle with the input;
//! - an edge bounding two faces appears once as itself and once as a reversed
//!   alias (same data, different handle);
//! - pattern copies are located copies (different data, same lineage).

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::traits::{Kernel, KernelIntrospect};
use crate::types::*;

/// Box edges as vertex index pairs: 4 bottom, 4 top, 4 vertical.
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Box faces as (label, edge indices).
const BOX_FACES: [(&str, [usize; 4]); 6] = [
    ("bottom", [0, 1, 2, 3]),
    ("top", [4, 5, 6, 7]),
    ("front", [0, 9, 4, 8]),
    ("back", [2, 11, 6, 10]),
    ("left", [3, 8, 7, 11]),
    ("right", [1, 10, 5, 9]),
];

/// A synthetic shape node.
#[derive(Debug, Clone)]
struct MockShape {
    kind: ShapeKind,
    children: Vec<ShapeHandle>,
    /// Underlying data, shared by orientation variants.
    data: u64,
    /// Construction lineage, shared by located copies.
    lineage: u64,
}

/// How a deep copy relates to its original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyLineage {
    /// Located copy: partner of the original.
    Keep,
    /// Rebuilt geometry: unrelated to the original.
    Fresh,
}

/// Deterministic test double for the geometry kernel.
/// Implements both Kernel and KernelIntrospect.
pub struct MockKernel {
    next_handle: u64,
    next_data: u64,
    shapes: HashMap<ShapeHandle, MockShape>,
    contacts: usize,
    doubled_section: bool,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_data: 1,
            shapes: HashMap::new(),
            contacts: 1,
            doubled_section: false,
        }
    }

    /// How many tool faces meet the target contact face in later Booleans.
    /// Each one contributes a section edge; clamped to the tool's face count.
    pub fn set_boolean_contacts(&mut self, contacts: usize) {
        self.contacts = contacts.max(1);
    }

    /// Later Booleans emit a second section edge along the first contact
    /// face pair, as a kernel does when two faces meet along a broken curve.
    pub fn set_doubled_section(&mut self, doubled: bool) {
        self.doubled_section = doubled;
    }

    /// Number of shape handles ever allocated.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    fn alloc_handle(&mut self) -> ShapeHandle {
        let h = ShapeHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    fn alloc_data(&mut self) -> u64 {
        let d = self.next_data;
        self.next_data += 1;
        d
    }

    fn get(&self, handle: ShapeHandle) -> Result<&MockShape, KernelError> {
        self.shapes
            .get(&handle)
            .ok_or(KernelError::ShapeNotFound { handle })
    }

    /// Insert a brand-new shape with its own data and lineage.
    fn insert(&mut self, kind: ShapeKind, children: Vec<ShapeHandle>) -> ShapeHandle {
        let data = self.alloc_data();
        let handle = self.alloc_handle();
        self.shapes.insert(
            handle,
            MockShape {
                kind,
                children,
                data,
                lineage: data,
            },
        );
        handle
    }

    /// A second handle onto the same data, as a face sees a shared edge
    /// running the other way.
    fn reversed(&mut self, handle: ShapeHandle) -> Result<ShapeHandle, KernelError> {
        let shape = self.get(handle)?.clone();
        let alias = self.alloc_handle();
        self.shapes.insert(alias, shape);
        Ok(alias)
    }

    /// Every handle in the tree under `root` (aliases included), preorder.
    fn collect_handles(&self, root: ShapeHandle) -> Result<Vec<ShapeHandle>, KernelError> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if !seen.insert(handle) {
                continue;
            }
            let shape = self.get(handle)?;
            order.push(handle);
            stack.extend(shape.children.iter().rev().copied());
        }
        Ok(order)
    }

    /// Deep copy preserving sharing: two handles on the same data in the
    /// original become two handles on the same (new) data in the copy.
    fn copy_tree(
        &mut self,
        handle: ShapeHandle,
        lineage: CopyLineage,
        data_map: &mut HashMap<u64, u64>,
        handle_map: &mut HashMap<ShapeHandle, ShapeHandle>,
    ) -> Result<ShapeHandle, KernelError> {
        if let Some(&copied) = handle_map.get(&handle) {
            return Ok(copied);
        }
        let original = self.get(handle)?.clone();
        let mut children = Vec::with_capacity(original.children.len());
        for child in &original.children {
            children.push(self.copy_tree(*child, lineage, data_map, handle_map)?);
        }
        let data = match data_map.get(&original.data) {
            Some(&d) => d,
            None => {
                let d = self.alloc_data();
                data_map.insert(original.data, d);
                d
            }
        };
        let copied = self.alloc_handle();
        self.shapes.insert(
            copied,
            MockShape {
                kind: original.kind,
                children,
                data,
                lineage: match lineage {
                    CopyLineage::Keep => original.lineage,
                    CopyLineage::Fresh => data,
                },
            },
        );
        handle_map.insert(handle, copied);
        Ok(copied)
    }

    /// The single shell of a solid. The synthetic Boolean only understands
    /// one-shell solids.
    fn single_shell(&self, solid: ShapeHandle) -> Result<ShapeHandle, String> {
        let shape = self.get(solid).map_err(|e| e.to_string())?;
        if shape.kind != ShapeKind::Solid {
            return Err(format!("expected a solid, found a {}", shape.kind));
        }
        match shape.children.as_slice() {
            [shell] => Ok(*shell),
            other => Err(format!("expected one shell, found {}", other.len())),
        }
    }

    /// New solids and compounds above rebuilt shells; untouched subtrees
    /// keep their handles.
    fn rebuild_containers(
        &mut self,
        handle: ShapeHandle,
        rebuilt: &mut HashMap<ShapeHandle, ShapeHandle>,
        out: &mut OpOutput,
    ) -> ShapeHandle {
        if let Some(&new) = rebuilt.get(&handle) {
            return new;
        }
        let Some(shape) = self.shapes.get(&handle).cloned() else {
            return handle;
        };
        if !matches!(shape.kind, ShapeKind::Solid | ShapeKind::Compound) {
            return handle;
        }
        let children: Vec<ShapeHandle> = shape
            .children
            .iter()
            .map(|c| self.rebuild_containers(*c, rebuilt, out))
            .collect();
        if children == shape.children {
            return handle;
        }
        let new = self.insert(shape.kind, children);
        out.record_modified(handle, new);
        rebuilt.insert(handle, new);
        new
    }

    fn wire_edges(&self, face: ShapeHandle) -> Vec<ShapeHandle> {
        self.outer_wire(face)
            .map(|w| self.children(w))
            .unwrap_or_default()
    }
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelIntrospect for MockKernel {
    fn kind(&self, shape: ShapeHandle) -> Option<ShapeKind> {
        self.shapes.get(&shape).map(|s| s.kind)
    }

    fn children(&self, shape: ShapeHandle) -> Vec<ShapeHandle> {
        self.shapes
            .get(&shape)
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    fn outer_wire(&self, face: ShapeHandle) -> Option<ShapeHandle> {
        let shape = self.shapes.get(&face)?;
        if shape.kind != ShapeKind::Face {
            return None;
        }
        shape.children.first().copied()
    }

    fn is_same(&self, a: ShapeHandle, b: ShapeHandle) -> bool {
        match (self.shapes.get(&a), self.shapes.get(&b)) {
            (Some(sa), Some(sb)) => sa.data == sb.data,
            _ => false,
        }
    }

    fn is_partner(&self, a: ShapeHandle, b: ShapeHandle) -> bool {
        match (self.shapes.get(&a), self.shapes.get(&b)) {
            (Some(sa), Some(sb)) => sa.kind == sb.kind && sa.lineage == sb.lineage,
            _ => false,
        }
    }
}

impl Kernel for MockKernel {
    fn make_box(
        &mut self,
        length: f64,
        width: f64,
        height: f64,
    ) -> Result<OpOutput, KernelError> {
        if !(length > 0.0 && width > 0.0 && height > 0.0) {
            return Err(KernelError::InvalidParameter {
                reason: format!("box dimensions must be positive: {length} x {width} x {height}"),
            });
        }

        let verts: Vec<ShapeHandle> = (0..8)
            .map(|_| self.insert(ShapeKind::Vertex, Vec::new()))
            .collect();
        let edges: Vec<ShapeHandle> = BOX_EDGES
            .iter()
            .map(|&(s, e)| self.insert(ShapeKind::Edge, vec![verts[s], verts[e]]))
            .collect();

        // The first face to use an edge gets the edge itself, the second a reversed alias.
        let mut placed: HashSet<usize> = HashSet::new();
        let mut faces = Vec::with_capacity(BOX_FACES.len());
        let mut named = Vec::new();
        for (label, edge_indices) in BOX_FACES {
            let mut wire_edges = Vec::with_capacity(4);
            for index in edge_indices {
                if placed.insert(index) {
                    wire_edges.push(edges[index]);
                } else {
                    wire_edges.push(self.reversed(edges[index])?);
                }
            }
            let wire = self.insert(ShapeKind::Wire, wire_edges);
            let face = self.insert(ShapeKind::Face, vec![wire]);
            faces.push(face);
            named.push((label.to_string(), face));
        }

        let shell = self.insert(ShapeKind::Shell, faces);
        let solid = self.insert(ShapeKind::Solid, vec![shell]);

        let mut out = OpOutput::new(solid);
        out.named.push(("solid".to_string(), solid));
        out.named.push(("shell".to_string(), shell));
        out.named.extend(named);
        debug!(?solid, "mock box created");
        Ok(out)
    }

    fn offset(&mut self, shape: ShapeHandle, distance: f64) -> Result<OpOutput, KernelError> {
        if !distance.is_finite() || distance.abs() < 1e-12 {
            return Err(KernelError::OffsetFailed {
                reason: format!("degenerate offset distance {distance}"),
            });
        }
        self.get(shape)?;

        let mut data_map = HashMap::new();
        let mut handle_map = HashMap::new();
        let root = self.copy_tree(shape, CopyLineage::Fresh, &mut data_map, &mut handle_map)?;

        let mut out = OpOutput::new(root);
        for old in self.collect_handles(shape)? {
            if let Some(&new) = handle_map.get(&old) {
                out.record_modified(old, new);
            }
        }
        debug!(?root, "mock offset created");
        Ok(out)
    }

    fn chamfer(
        &mut self,
        shape: ShapeHandle,
        edges: &[ShapeHandle],
        distance: f64,
    ) -> Result<OpOutput, KernelError> {
        if edges.is_empty() {
            return Err(KernelError::ChamferFailed {
                reason: "no edges to chamfer".into(),
            });
        }
        if !(distance > 0.0) {
            return Err(KernelError::ChamferFailed {
                reason: format!("chamfer distance must be positive, got {distance}"),
            });
        }
        let root_kind = self.get(shape)?.kind;
        if !matches!(root_kind, ShapeKind::Solid | ShapeKind::Compound) {
            return Err(KernelError::ChamferFailed {
                reason: format!("cannot chamfer a {root_kind}"),
            });
        }
        let all = self.collect_handles(shape)?;

        // Chamfered edges, identified by underlying data, in argument order.
        let mut chamfer_data: Vec<u64> = Vec::new();
        for &edge in edges {
            let found = self.get(edge)?;
            if found.kind != ShapeKind::Edge {
                return Err(KernelError::InvalidParameter {
                    reason: format!("{edge:?} is a {}, not an edge", found.kind),
                });
            }
            let data = found.data;
            if !all.iter().any(|h| self.shapes[h].data == data) {
                return Err(KernelError::ShapeNotFound { handle: edge });
            }
            if !chamfer_data.contains(&data) {
                chamfer_data.push(data);
            }
        }

        let mut out = OpOutput::new(shape);
        let mut rebuilt: HashMap<ShapeHandle, ShapeHandle> = HashMap::new();
        let shells: Vec<ShapeHandle> = all
            .iter()
            .copied()
            .filter(|h| self.shapes[h].kind == ShapeKind::Shell)
            .collect();

        // Each shell gets its touched faces trimmed and one bevel face per
        // chamfered edge it contains.
        for old_shell in shells {
            let mut out_faces = Vec::new();
            let mut replacements: Vec<(u64, ShapeHandle)> = Vec::new();
            for face in self.children(old_shell) {
                let wire_edges = self.wire_edges(face);
                let touched = wire_edges
                    .iter()
                    .any(|e| chamfer_data.contains(&self.shapes[e].data));
                if !touched {
                    out_faces.push(face);
                    continue;
                }
                let mut new_edges = Vec::with_capacity(wire_edges.len());
                for edge in wire_edges {
                    let original = self.shapes[&edge].clone();
                    if chamfer_data.contains(&original.data) {
                        let trimmed = self.insert(ShapeKind::Edge, original.children);
                        replacements.push((original.data, trimmed));
                        new_edges.push(trimmed);
                    } else {
                        new_edges.push(edge);
                    }
                }
                let wire = self.insert(ShapeKind::Wire, new_edges);
                let new_face = self.insert(ShapeKind::Face, vec![wire]);
                out.record_modified(face, new_face);
                out_faces.push(new_face);
            }
            if replacements.is_empty() {
                continue;
            }

            for data in &chamfer_data {
                let mut bevel_edges = Vec::new();
                for (_, trimmed) in replacements.iter().filter(|(d, _)| d == data) {
                    bevel_edges.push(self.reversed(*trimmed)?);
                }
                if bevel_edges.is_empty() {
                    continue;
                }
                let wire = self.insert(ShapeKind::Wire, bevel_edges);
                let bevel = self.insert(ShapeKind::Face, vec![wire]);
                out_faces.push(bevel);
                for handle in all.iter().filter(|h| self.shapes[*h].data == *data) {
                    out.record_generated(*handle, bevel);
                }
            }

            let new_shell = self.insert(ShapeKind::Shell, out_faces);
            out.record_modified(old_shell, new_shell);
            rebuilt.insert(old_shell, new_shell);
        }

        let root = self.rebuild_containers(shape, &mut rebuilt, &mut out);
        out.root = root;
        debug!(?root, edges = chamfer_data.len(), "mock chamfer created");
        Ok(out)
    }

    fn boolean(
        &mut self,
        target: ShapeHandle,
        tool: ShapeHandle,
        kind: BooleanKind,
    ) -> Result<OpOutput, KernelError> {
        let failed = |reason: String| KernelError::BooleanFailed { reason };
        let target_shell = self.single_shell(target).map_err(failed)?;
        let tool_shell = self.single_shell(tool).map_err(failed)?;
        if self.is_same(target, tool) {
            return Err(failed("target and tool are the same shape".into()));
        }

        let target_faces = self.children(target_shell);
        let tool_faces = self.children(tool_shell);
        let (Some(&target_face), Some(&tool_face)) = (target_faces.first(), tool_faces.first())
        else {
            return Err(failed("operand without faces".into()));
        };
        let target_edges = self.wire_edges(target_face);
        if target_edges.len() < 2 {
            return Err(failed("contact face cannot be split".into()));
        }
        let contacts = self.contacts.min(tool_faces.len());

        // One section edge per tool face meeting the target contact face.
        // The first splits the target face in two; the rest bound the
        // second piece and their own trimmed tool face.
        let mut sections = Vec::with_capacity(contacts);
        for _ in 0..contacts {
            let v1 = self.insert(ShapeKind::Vertex, Vec::new());
            let v2 = self.insert(ShapeKind::Vertex, Vec::new());
            sections.push(self.insert(ShapeKind::Edge, vec![v1, v2]));
        }
        let section = sections[0];

        let half = target_edges.len() / 2;
        let mut first_edges = target_edges[..half].to_vec();
        first_edges.push(section);
        let doubled = if self.doubled_section {
            let v1 = self.insert(ShapeKind::Vertex, Vec::new());
            let v2 = self.insert(ShapeKind::Vertex, Vec::new());
            let edge = self.insert(ShapeKind::Edge, vec![v1, v2]);
            first_edges.push(edge);
            Some(edge)
        } else {
            None
        };
        let first_wire = self.insert(ShapeKind::Wire, first_edges);
        let first = self.insert(ShapeKind::Face, vec![first_wire]);

        let mut second_edges = target_edges[half..].to_vec();
        second_edges.push(self.reversed(section)?);
        for &extra in &sections[1..] {
            second_edges.push(self.reversed(extra)?);
        }
        let second_wire = self.insert(ShapeKind::Wire, second_edges);
        let second = self.insert(ShapeKind::Face, vec![second_wire]);

        let mut trimmed_tools = Vec::with_capacity(contacts);
        for (index, &edge) in sections.iter().enumerate() {
            let mut tool_edges = self.wire_edges(tool_faces[index]);
            tool_edges.push(self.reversed(edge)?);
            let tool_wire = self.insert(ShapeKind::Wire, tool_edges);
            trimmed_tools.push(self.insert(ShapeKind::Face, vec![tool_wire]));
        }

        let mut faces = Vec::new();
        let mut target_pieces = vec![first];
        match kind {
            BooleanKind::Union => {
                target_pieces.push(second);
                faces.extend([first, second]);
                faces.extend(target_faces.iter().skip(1).copied());
                faces.extend(trimmed_tools.iter().copied());
                faces.extend(tool_faces.iter().skip(contacts).copied());
            }
            BooleanKind::Subtract => {
                target_pieces.push(second);
                faces.extend([first, second]);
                faces.extend(target_faces.iter().skip(1).copied());
                faces.extend(trimmed_tools.iter().copied());
            }
            BooleanKind::Intersect => {
                faces.push(first);
                faces.extend(trimmed_tools.iter().copied());
                faces.extend(tool_faces.iter().skip(contacts).copied());
            }
        }

        let shell = self.insert(ShapeKind::Shell, faces);
        let root = self.insert(ShapeKind::Solid, vec![shell]);

        let mut out = OpOutput::new(root);
        out.record_modified(target, root);
        out.record_modified(target_shell, shell);
        for piece in target_pieces {
            out.record_modified(target_face, piece);
        }
        for (index, &edge) in sections.iter().enumerate() {
            out.record_modified(tool_faces[index], trimmed_tools[index]);
            out.sections.push(SectionEdge {
                edge,
                faces: [target_face, tool_faces[index]],
            });
        }
        if let Some(edge) = doubled {
            out.sections.push(SectionEdge {
                edge,
                faces: [target_face, tool_face],
            });
        }
        debug!(?root, ?kind, "mock boolean created");
        Ok(out)
    }

    fn instance(
        &mut self,
        shape: ShapeHandle,
        count: usize,
        spacing: [f64; 3],
    ) -> Result<OpOutput, KernelError> {
        if count == 0 {
            return Err(KernelError::InstanceFailed {
                reason: "instance count must be at least 1".into(),
            });
        }
        if spacing.iter().any(|s| !s.is_finite()) {
            return Err(KernelError::InvalidParameter {
                reason: format!("non-finite spacing {spacing:?}"),
            });
        }
        self.get(shape)?;

        let mut copies = vec![shape];
        for _ in 1..count {
            let mut data_map = HashMap::new();
            let mut handle_map = HashMap::new();
            copies.push(self.copy_tree(
                shape,
                CopyLineage::Keep,
                &mut data_map,
                &mut handle_map,
            )?);
        }
        let compound = self.insert(ShapeKind::Compound, copies);

        let mut out = OpOutput::new(compound);
        out.named.push(("compound".to_string(), compound));
        debug!(?compound, count, "mock instance created");
        Ok(out)
    }
}
