use uuid::Uuid;

/// Errors during project file loading.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("failed to parse file: {0}")]
    ParseError(String),

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    #[error("file version {file_version} is newer than supported version {supported_version}")]
    FutureVersion {
        file_version: u32,
        supported_version: u32,
    },

    #[error("migration failed from version {from} to {to}: {reason}")]
    MigrationFailed { from: u32, to: u32, reason: String },

    #[error("feature {id} appears more than once")]
    DuplicateFeature { id: Uuid },

    #[error("invalid connection {parent} -> {child}: {reason}")]
    InvalidConnection {
        parent: Uuid,
        child: Uuid,
        reason: String,
    },
}

/// Errors during project file saving.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SaveError {
    #[error("failed to serialize project: {0}")]
    Serialize(String),
}
