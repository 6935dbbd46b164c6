pub mod errors;
pub mod load;
pub mod metadata;
pub mod migrate;
pub mod save;

pub use errors::{LoadError, SaveError};
pub use load::load_project;
pub use metadata::ProjectMetadata;
pub use save::{
    save_project, ConnectionEntry, FeatureEntry, ProjectFile, FORMAT_NAME, FORMAT_VERSION,
};
