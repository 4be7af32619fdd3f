//! Lexical confinement of caller-supplied paths to the storage root.
//!
//! This is the first of two checks. It rejects anything that could name a location outside
//! the root before the filesystem is touched; [`crate::ContentStore::get_by_path`] then
//! canonicalises the result and rejects symlinks that resolve outside the root.

use crate::constants::STAGING_DIR_NAME;
use crate::{FilesError, FilesResult};
use std::path::{Component, Path, PathBuf};

/// Returns `requested` as a path relative to `root`.
///
/// `root` must already be canonical. An absolute `requested` is accepted only when it lies
/// under `root`. `.` components are dropped; `..`, root and prefix components are rejected,
/// as is any path into the staging directory.
pub(crate) fn confine(root: &Path, requested: &Path) -> FilesResult<PathBuf> {
    if requested.as_os_str().is_empty() {
        return Err(FilesError::InvalidPath("path is empty".into()));
    }

    if requested.to_string_lossy().contains('\0') {
        return Err(FilesError::InvalidPath("path contains a NUL byte".into()));
    }

    let relative = if requested.is_absolute() {
        requested.strip_prefix(root).map_err(|_| {
            FilesError::InvalidPath(format!(
                "absolute path {} is outside the storage root",
                requested.display()
            ))
        })?
    } else {
        requested
    };

    let mut confined = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => confined.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(FilesError::InvalidPath(format!(
                    "parent directory references are not allowed: {}",
                    requested.display()
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(FilesError::InvalidPath(format!(
                    "path must be relative to the storage root: {}",
                    requested.display()
                )))
            }
        }
    }

    if confined.as_os_str().is_empty() {
        return Err(FilesError::InvalidPath(
            "path does not name a file under the storage root".into(),
        ));
    }

    if confined.starts_with(STAGING_DIR_NAME) {
        return Err(FilesError::InvalidPath(
            "staging files cannot be read".into(),
        ));
    }

    Ok(confined)
}
