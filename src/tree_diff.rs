//! Directory-tree comparison
//!
//! Compares a source tree against a destination tree and produces the
//! ordered list of entries the destination is missing or holds with
//! different content. The comparison is one-directional: the source is
//! authoritative, and entries present only in the destination are never
//! reported.
//!
//! ## Ordering
//!
//! Results are depth-first with directories before the files they contain,
//! so a consumer can create each directory before populating it. Sibling
//! entries are sorted by file name for deterministic output.
//!
//! ## Excludes
//!
//! Entries whose name matches an exclude pattern are skipped entirely and
//! never descended into. The default options exclude the `.worksync` marker
//! directory the engine itself maintains.

use crate::error::{Result, WorksyncError};
use crate::types::{ChangeKind, EntryKind, SyncDiffEntry};
use crate::utils::hash_file_content;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::trace;
use walkdir::WalkDir;

/// Name of the marker directory the engine keeps inside synced folders
pub const MARKER_DIR: &str = ".worksync";

/// Options controlling a tree comparison
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Compare file bytes, not just presence. When false, a file that exists
    /// in both trees is never reported regardless of content.
    pub compare_content: bool,
    /// Glob patterns matched against entry names; matching entries are
    /// skipped recursively
    pub exclude: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            compare_content: true,
            exclude: vec![MARKER_DIR.to_string()],
        }
    }
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            WorksyncError::internal(format!("invalid exclude pattern {pattern:?}: {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| WorksyncError::internal(format!("invalid exclude set: {e}")))
}

/// Compare two directory trees
///
/// Walks `source` depth-first and reports, in order, every entry that is
/// absent from `dest` or (when `compare_content` is set) byte-different in
/// `dest`. `dest` need not exist; it is created by the caller, not here.
///
/// # Errors
///
/// Returns [`WorksyncError::NotFound`] if `source` is not a directory, and
/// I/O or walk errors encountered while reading either tree.
pub fn diff_trees(source: &Path, dest: &Path, options: &DiffOptions) -> Result<Vec<SyncDiffEntry>> {
    if !source.is_dir() {
        return Err(WorksyncError::not_found(format!(
            "source directory {:?}",
            source
        )));
    }

    let excludes = build_exclude_set(&options.exclude)?;
    let mut entries = Vec::new();

    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // Never prune the root even if its name matches a pattern
            e.depth() == 0 || !excludes.is_match(e.file_name())
        });

    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| {
                WorksyncError::internal(format!(
                    "walked path {:?} escaped source root",
                    entry.path()
                ))
            })?
            .to_path_buf();
        let target = dest.join(&relative);

        if entry.file_type().is_dir() {
            if !target.is_dir() {
                entries.push(SyncDiffEntry {
                    relative_path: relative,
                    entry_kind: EntryKind::Directory,
                    change_kind: ChangeKind::Missing,
                });
            }
            continue;
        }

        if !target.is_file() {
            entries.push(SyncDiffEntry {
                relative_path: relative,
                entry_kind: EntryKind::File,
                change_kind: ChangeKind::Missing,
            });
        } else if options.compare_content && !files_identical(entry.path(), &target)? {
            entries.push(SyncDiffEntry {
                relative_path: relative,
                entry_kind: EntryKind::File,
                change_kind: ChangeKind::Distinct,
            });
        }
    }

    trace!(
        source = ?source,
        dest = ?dest,
        count = entries.len(),
        "tree diff complete"
    );
    Ok(entries)
}

/// Byte-level equality check, cheap size comparison first
fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(hash_file_content(a)? == hash_file_content(b)?)
}
