use crate::config::RepositoryMapping;
use log::trace;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

/// A custom error for describing why a repository path cannot be placed on disk.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path is not inside the repository root, or would escape the destination.
    #[error("{0} is outside of the repository root \"{1}\"")]
    OutsideRoot(String, String),
    /// The parent directory of the file cannot be created.
    #[error("cannot create directory {}: {}", .0.display(), .1)]
    CreateDirectory(PathBuf, #[source] std::io::Error),
    /// The branch would be deployed outside of the base directory.
    #[error("branch {0:?} maps to {1:?}, which is not a directory under the base directory")]
    InvalidDestination(String, String),
}

/// The directory where a branch of a repository is mirrored.
///
/// Branch names come from the notification, so the mapped directory has to be
/// a plain relative path: absolute paths and `..` are refused.
pub fn destination_root(
    base_dir: &Path,
    mapping: &RepositoryMapping,
    branch: &str,
) -> Result<PathBuf, PathError> {
    let directory = mapping.directory_for(branch);
    let relative = Path::new(directory);

    let is_plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let has_name = relative
        .components()
        .any(|c| matches!(c, Component::Normal(_)));
    if !is_plain || !has_name {
        return Err(PathError::InvalidDestination(
            String::from(branch),
            String::from(directory),
        ));
    }

    Ok(base_dir.join(relative))
}

/// The path of a file relative to the repository root, if it is inside of it.
///
/// Only plain path components are accepted, so the result can always be
/// joined onto a destination without leaving it.
pub fn relative_to_root(path: &str, repository_root: &str) -> Option<PathBuf> {
    let root = Path::new(repository_root.trim_matches('/'));
    let relative = Path::new(path.trim_start_matches('/'))
        .strip_prefix(root)
        .ok()?;

    let is_contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let has_name = relative
        .components()
        .any(|c| matches!(c, Component::Normal(_)));

    (is_contained && has_name).then(|| relative.to_path_buf())
}

/// Whether the path should be deployed at all.
pub fn is_in_root(path: &str, repository_root: &str) -> bool {
    relative_to_root(path, repository_root).is_some()
}

/// Map a repository path to its place under the destination.
pub fn map_path(
    path: &str,
    repository_root: &str,
    destination_root: &Path,
) -> Result<PathBuf, PathError> {
    let relative = relative_to_root(path, repository_root).ok_or_else(|| {
        PathError::OutsideRoot(String::from(path), String::from(repository_root))
    })?;

    Ok(destination_root.join(relative))
}

/// Map a repository path to its place under the destination, and make sure
/// its parent directory exists.
pub fn on_disk_path(
    path: &str,
    repository_root: &str,
    destination_root: &Path,
) -> Result<PathBuf, PathError> {
    let file = map_path(path, repository_root, destination_root)?;

    if let Some(parent) = file.parent() {
        if !parent.is_dir() {
            trace!("Creating directory {}.", parent.display());
            fs::create_dir_all(parent)
                .map_err(|err| PathError::CreateDirectory(parent.to_path_buf(), err))?;
        }
    }

    Ok(file)
}
