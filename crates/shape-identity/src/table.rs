use std::collections::HashMap;

use geom_kernel::{KernelIntrospect, ShapeHandle, ShapeKind};
use uuid::Uuid;

/// One distinct shape of a feature's output and the id it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeRecord {
    /// None until a matching pass assigns it.
    pub id: Option<Uuid>,
    /// First handle the shape was seen under.
    pub shape: ShapeHandle,
    pub kind: ShapeKind,
    /// Position in the table, which is preorder position in the tree.
    pub offset: usize,
}

/// Every distinct sub-shape of one feature's output, indexed by handle and
/// by id.
///
/// Built fresh from the output tree on every recompute. Orientation variants
/// (handles the kernel reports as `is_same`) collapse onto one record, so a
/// reversed edge and its forward twin carry one id. Records are in preorder,
/// children in kernel order; ordinal-based passes depend on that.
#[derive(Debug, Clone, Default)]
pub struct ShapeIdentityTable {
    records: Vec<ShapeRecord>,
    aliases: HashMap<ShapeHandle, usize>,
    handles: Vec<Vec<ShapeHandle>>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    outer_wires: HashMap<usize, usize>,
    by_id: HashMap<Uuid, usize>,
}

impl ShapeIdentityTable {
    /// Walk the tree under `root` and register every distinct shape.
    /// All ids start out nil.
    pub fn from_tree(root: ShapeHandle, kernel: &dyn KernelIntrospect) -> Self {
        let mut table = Self::default();
        if kernel.kind(root).is_some() {
            table.visit(root, None, kernel);
            for offset in 0..table.records.len() {
                let record = table.records[offset];
                if record.kind != ShapeKind::Face {
                    continue;
                }
                if let Some(wire) = kernel
                    .outer_wire(record.shape)
                    .and_then(|w| table.index_of(w))
                {
                    table.outer_wires.insert(offset, wire);
                }
            }
        }
        table
    }

    fn visit(&mut self, handle: ShapeHandle, parent: Option<usize>, kernel: &dyn KernelIntrospect) {
        let Some(kind) = kernel.kind(handle) else {
            return;
        };
        if let Some(existing) = self.find(handle, kernel) {
            self.aliases.insert(handle, existing);
            if !self.handles[existing].contains(&handle) {
                self.handles[existing].push(handle);
            }
            if let Some(p) = parent {
                self.link(p, existing);
            }
            return;
        }

        let offset = self.records.len();
        self.records.push(ShapeRecord {
            id: None,
            shape: handle,
            kind,
            offset,
        });
        self.aliases.insert(handle, offset);
        self.handles.push(vec![handle]);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        if let Some(p) = parent {
            self.link(p, offset);
        }
        for child in kernel.children(handle) {
            self.visit(child, Some(offset), kernel);
        }
    }

    fn link(&mut self, parent: usize, child: usize) {
        if !self.children[parent].contains(&child) {
            self.children[parent].push(child);
        }
        if !self.parents[child].contains(&parent) {
            self.parents[child].push(parent);
        }
    }

    /// Record offset for an exact handle seen while building the table.
    pub fn index_of(&self, handle: ShapeHandle) -> Option<usize> {
        self.aliases.get(&handle).copied()
    }

    /// Record offset for `handle`. Tries the handles seen while building,
    /// then exact kernel equality against them, then same data.
    pub fn find(&self, handle: ShapeHandle, kernel: &dyn KernelIntrospect) -> Option<usize> {
        if let Some(offset) = self.index_of(handle) {
            return Some(offset);
        }
        let kind = kernel.kind(handle)?;
        let same_kind = || self.records.iter().filter(move |r| r.kind == kind);
        same_kind()
            .find(|r| {
                self.handles(r.offset)
                    .iter()
                    .any(|h| kernel.is_equal(*h, handle))
            })
            .or_else(|| same_kind().find(|r| kernel.is_same(r.shape, handle)))
            .map(|r| r.offset)
    }

    pub fn get_id(&self, handle: ShapeHandle) -> Option<Uuid> {
        self.index_of(handle).and_then(|o| self.records[o].id)
    }

    pub fn get_shape(&self, id: Uuid) -> Option<ShapeHandle> {
        self.offset_of_id(id).map(|o| self.records[o].shape)
    }

    pub fn get_all_ids(&self) -> Vec<Uuid> {
        self.records.iter().filter_map(|r| r.id).collect()
    }

    pub fn get_all_shapes(&self) -> Vec<ShapeHandle> {
        self.records.iter().map(|r| r.shape).collect()
    }

    pub fn has_id(&self, id: Uuid) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn has_shape(&self, handle: ShapeHandle) -> bool {
        self.aliases.contains_key(&handle)
    }

    pub fn offset_of_id(&self, id: Uuid) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn records(&self) -> &[ShapeRecord] {
        &self.records
    }

    pub fn record(&self, offset: usize) -> Option<&ShapeRecord> {
        self.records.get(offset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every handle that resolved to this record, first one first.
    pub fn handles(&self, offset: usize) -> &[ShapeHandle] {
        self.handles.get(offset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents(&self, offset: usize) -> &[usize] {
        self.parents.get(offset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, offset: usize) -> &[usize] {
        self.children.get(offset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Offset of a face record's outer wire.
    pub fn outer_wire(&self, face: usize) -> Option<usize> {
        self.outer_wires.get(&face).copied()
    }

    pub fn root_id(&self) -> Option<Uuid> {
        self.records.first().and_then(|r| r.id)
    }

    pub fn root(&self) -> Option<ShapeHandle> {
        self.records.first().map(|r| r.shape)
    }

    /// Offsets of records of `kind` that still have no id, in table order.
    pub fn unidentified(&self, kind: ShapeKind) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.kind == kind && r.id.is_none())
            .map(|r| r.offset)
            .collect()
    }

    /// Offsets of every record of `kind`, in table order.
    pub fn of_kind(&self, kind: ShapeKind) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.offset)
            .collect()
    }

    /// Assign `id` to a nil record, unless another record already holds it.
    /// Returns whether the assignment happened.
    pub fn claim(&mut self, offset: usize, id: Uuid) -> bool {
        match self.records.get(offset) {
            Some(record) if record.id.is_none() && !self.by_id.contains_key(&id) => {
                self.update_id(offset, id);
                true
            }
            _ => false,
        }
    }

    /// Overwrite a record's id with no uniqueness check.
    pub fn update_id(&mut self, offset: usize, id: Uuid) {
        let Some(record) = self.records.get_mut(offset) else {
            return;
        };
        if let Some(old) = record.id.replace(id) {
            if self.by_id.get(&old) == Some(&offset) {
                self.by_id.remove(&old);
            }
        }
        self.by_id.entry(id).or_insert(offset);
    }
}
