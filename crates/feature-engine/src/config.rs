//! Configuration for the modeling engine.

use shape_identity::{IdGenerator, RandomIds, SequentialIds};

/// How fresh ids are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    /// Random v4 ids. For real sessions.
    Random,
    /// Reproducible ids from a seed. For tests and golden files.
    Sequential { seed: u64 },
}

/// Configuration controlling recompute and identity behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub id_mode: IdMode,
    /// Treat identity repairs (nil or duplicate ids after matching) as a
    /// failure of the feature instead of a logged diagnostic.
    pub strict_identity: bool,
    /// Hop bound for history walks during pick resolution. None is unbounded.
    pub max_history_depth: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_mode: IdMode::Random,
            strict_identity: false,
            max_history_depth: None,
        }
    }
}

impl EngineConfig {
    /// Reproducible ids.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            id_mode: IdMode::Sequential { seed },
            ..Self::default()
        }
    }

    /// Reproducible ids, and identity repairs fail the feature.
    pub fn strict(seed: u64) -> Self {
        Self {
            strict_identity: true,
            ..Self::deterministic(seed)
        }
    }

    pub fn id_generator(&self) -> Box<dyn IdGenerator> {
        match self.id_mode {
            IdMode::Random => Box::new(RandomIds),
            IdMode::Sequential { seed } => Box::new(SequentialIds::new(seed)),
        }
    }
}
