use serde::{Deserialize, Serialize};

/// The kind of a boundary-representation sub-shape.
///
/// Variants are declared from the top of the shape tree down, so the derived
/// `Ord` sorts containers before their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShapeKind {
    Compound,
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
}

impl ShapeKind {
    /// Every kind, top-down.
    pub const ALL: [ShapeKind; 7] = [
        ShapeKind::Compound,
        ShapeKind::Solid,
        ShapeKind::Shell,
        ShapeKind::Face,
        ShapeKind::Wire,
        ShapeKind::Edge,
        ShapeKind::Vertex,
    ];

    /// Kinds that may receive an id derived from their parents' ids.
    pub const DERIVABLE: [ShapeKind; 4] = [
        ShapeKind::Shell,
        ShapeKind::Wire,
        ShapeKind::Edge,
        ShapeKind::Vertex,
    ];

    /// Lower-case name used in logs and describe output.
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Compound => "compound",
            ShapeKind::Solid => "solid",
            ShapeKind::Shell => "shell",
            ShapeKind::Face => "face",
            ShapeKind::Wire => "wire",
            ShapeKind::Edge => "edge",
            ShapeKind::Vertex => "vertex",
        }
    }
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
