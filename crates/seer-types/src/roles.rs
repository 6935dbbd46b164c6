use serde::{Deserialize, Serialize};

/// Role an upstream feature plays for the feature consuming it.
/// Tagged on the edges of the feature dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputRole {
    /// The body being modified (chamfer target, boolean target, offset source).
    Target,
    /// A body consumed to modify the target (boolean tool).
    Tool,
}

impl std::fmt::Display for InputRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputRole::Target => f.write_str("target"),
            InputRole::Tool => f.write_str("tool"),
        }
    }
}
