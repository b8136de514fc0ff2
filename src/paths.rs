//! Path resolution and the workspace containment guard
//!
//! Maps a relative workspace path to absolute locations under the configured
//! workspace and remote roots. Relative paths originate from user input, the
//! persisted link mapping, or remote data, so every join is preceded by
//! [`validate_relative`]: a stored path must, when joined to the workspace
//! root, stay inside the workspace root. The same guard backs the archive
//! extractor's zip-slip check.

use crate::error::{Result, WorksyncError};
use std::path::{Component, Path, PathBuf};

/// Validate that a relative path cannot escape the directory it is joined to
///
/// Rejects absolute paths, root/drive prefixes, and any `..` component.
/// `.` components are tolerated (they cannot traverse upward).
///
/// # Errors
///
/// Returns [`WorksyncError::Config`] naming the offending path.
pub fn validate_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(WorksyncError::config("relative path is empty"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(WorksyncError::config(format!(
                    "relative path {:?} contains a parent-directory component",
                    path
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(WorksyncError::config(format!(
                    "relative path {:?} is absolute",
                    path
                )));
            }
        }
    }
    Ok(())
}

/// Resolves task-relative paths against the configured roots
///
/// Pure over the roots it was built with; the roots are read once from
/// settings at the start of an operation and treated as invariant for its
/// duration.
#[derive(Debug, Clone)]
pub struct PathResolver {
    workspace_root: PathBuf,
    remote_root: Option<PathBuf>,
}

impl PathResolver {
    /// Build a resolver from the configured roots
    pub fn new(workspace_root: PathBuf, remote_root: Option<PathBuf>) -> Self {
        Self {
            workspace_root,
            remote_root,
        }
    }

    /// The configured workspace root
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Absolute workspace location for a relative path, after validation
    pub fn workspace_path(&self, relative: &Path) -> Result<PathBuf> {
        validate_relative(relative)?;
        Ok(self.workspace_root.join(relative))
    }

    /// Absolute remote-source location for a relative path, after validation
    ///
    /// # Errors
    ///
    /// Returns [`WorksyncError::Config`] if no remote root is configured.
    pub fn remote_path(&self, relative: &Path) -> Result<PathBuf> {
        let root = self
            .remote_root
            .as_ref()
            .ok_or_else(|| WorksyncError::config("remote path is not set"))?;
        validate_relative(relative)?;
        Ok(root.join(relative))
    }
}
