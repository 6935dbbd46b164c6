use crate::errors::LoadError;
use crate::save::ProjectFile;

/// Bring `file` up to `to_version`.
///
/// Migrations are applied one version at a time. Version 1 is the only
/// version so far, so any older file has no migration path.
pub fn migrate(file: ProjectFile, to_version: u32) -> Result<ProjectFile, LoadError> {
    let from_version = file.version;
    if from_version != to_version {
        return Err(LoadError::MigrationFailed {
            from: from_version,
            to: to_version,
            reason: format!("no migration path from v{from_version} to v{to_version}"),
        });
    }
    Ok(file)
}
