//! Core data types used throughout the worksync library
//!
//! This module contains the data structures shared across components:
//!
//! - **Remote records**: [`Snapshot`], [`SnapshotKind`], [`SnapshotAuthor`] -
//!   tagged records validated at the remote API boundary
//! - **Diff output**: [`SyncDiffEntry`], [`EntryKind`], [`ChangeKind`] -
//!   transient results of one tree comparison
//! - **Operation results**: [`OperationOutcome`] - the classified result every
//!   orchestrator operation hands back to its caller
//! - **Caller abstractions**: [`ProgressSink`], [`ConfirmGate`] - the only two
//!   things the engine needs from a user interface
//!
//! Remote-facing records use camelCase field names on the wire and reject
//! unknown fields, so a payload with an unrecognized shape fails loudly at the
//! boundary instead of flowing through the engine half-parsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::WorksyncError;

/// The content type of a snapshot
///
/// A task carries at most two content trees: the editable `source` tree and
/// the rendered `exports` tree. Each snapshot captures exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Editable working files (scenes, project files)
    Source,
    /// Rendered or published outputs
    Exports,
}

impl SnapshotKind {
    /// The wire and directory name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Source => "source",
            SnapshotKind::Exports => "exports",
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotKind {
    type Err = WorksyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(SnapshotKind::Source),
            "exports" => Ok(SnapshotKind::Exports),
            other => Err(WorksyncError::internal(format!(
                "unknown snapshot kind: {other:?}"
            ))),
        }
    }
}

/// An immutable, remote-owned snapshot record
///
/// Snapshots are created and identified by the remote service; this crate
/// fetches them, creates references to new ones, and never mutates one in
/// place. The wire shape is camelCase JSON; unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Snapshot {
    /// Opaque identifier assigned by the remote service
    pub commit_id: String,
    /// Which content tree this snapshot captures
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    /// Human-readable commit message
    pub message: String,
    /// Display name of the author, if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Opaque author identifier, if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Creation timestamp assigned by the remote service
    pub created_at: DateTime<Utc>,
}

/// Author fields attached to a snapshot submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotAuthor {
    /// Display name
    pub username: String,
    /// Opaque identifier
    pub user_id: String,
}

/// Media files attached to a snapshot submission
///
/// Produced by an external transcoding step; the orchestrator deletes them
/// after submission on every exit path.
#[derive(Debug, Clone, Default)]
pub struct MediaFiles {
    /// Small thumbnail image path
    pub thumbnail: Option<PathBuf>,
    /// Preview video/image path
    pub preview: Option<PathBuf>,
}

impl MediaFiles {
    /// All attached paths, for cleanup
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.thumbnail.iter().chain(self.preview.iter())
    }
}

/// Whether a diff entry refers to a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Why a diff entry was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present in the source tree but absent in the destination
    Missing,
    /// Present in both trees with different content
    Distinct,
}

/// One difference produced by a tree comparison
///
/// Transient: produced by one differ invocation and consumed immediately by
/// the copy loop. Ordering is depth-first with directories before the files
/// they contain, so a consumer can create a directory before populating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiffEntry {
    /// Path relative to both tree roots
    pub relative_path: PathBuf,
    /// File or directory
    pub entry_kind: EntryKind,
    /// Missing locally or content differs
    pub change_kind: ChangeKind,
}

/// Classified result of an orchestrator operation
///
/// Orchestrator operations never raise past their own boundary; every failure
/// is caught, classified, and returned in this record. `cancelled` marks a
/// declined confirmation (a normal negative outcome); `partial` marks a
/// remote mutation that succeeded while local materialization failed - the
/// remote record *did* change and the caller must surface that distinctly.
#[derive(Debug, Clone, Default)]
pub struct OperationOutcome {
    /// Whether the operation completed fully
    pub success: bool,
    /// The user declined a confirmation prompt
    pub cancelled: bool,
    /// Remote state changed but the local mirror may now be stale
    pub partial: bool,
    /// Error message when not successful
    pub error: Option<String>,
    /// The created snapshot, for operations that produce one
    pub snapshot: Option<Snapshot>,
}

impl OperationOutcome {
    /// A fully successful outcome
    pub fn ok() -> Self {
        OperationOutcome {
            success: true,
            ..Default::default()
        }
    }

    /// A successful outcome carrying a created snapshot
    pub fn ok_with_snapshot(snapshot: Snapshot) -> Self {
        OperationOutcome {
            success: true,
            snapshot: Some(snapshot),
            ..Default::default()
        }
    }

    /// Classify an error into an outcome record
    pub fn from_error(err: &WorksyncError) -> Self {
        OperationOutcome {
            success: false,
            cancelled: err.is_cancelled(),
            partial: err.is_partial(),
            error: Some(err.to_string()),
            snapshot: None,
        }
    }
}

/// Progress callback for long-running operations
///
/// A stream of string-labelled events ("syncing main.blend", "Extracting
/// source...") emitted during transfers. Purely informational; never used for
/// control flow.
pub type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Confirmation gate for destructive operations
///
/// Rollback and unlink discard local state, so they must be confirmed before
/// the Transfer phase begins. Implementations ask the user however the
/// surrounding surface does it (dialog, terminal prompt); tests use
/// [`AutoConfirm`] or [`DenyAll`].
pub trait ConfirmGate: Send + Sync {
    /// Ask the user to confirm a destructive step; `false` cancels the
    /// operation before any state changes
    fn confirm(&self, prompt: &str) -> bool;
}

/// A gate that confirms everything; for non-interactive callers and tests
#[derive(Debug)]
pub struct AutoConfirm;

impl ConfirmGate for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// A gate that declines everything; for tests of the cancelled path
#[derive(Debug)]
pub struct DenyAll;

impl ConfirmGate for DenyAll {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}
