//! # Worksync - Workspace mirror for remote versioned task assets
//!
//! Worksync maintains a local "workspace" mirror of remote, versioned task
//! content: it pulls remote directory trees into the workspace, tracks which
//! local folders are linked to which remote task, captures content snapshots
//! (packing local folders into zip archives and uploading them), and rolls a
//! local folder back to any prior remote snapshot.
//!
//! ## Overview
//!
//! The engine is built from small, independently testable components:
//!
//! - **PathResolver** ([`paths`]): maps a task's relative path to absolute
//!   workspace and remote locations, with a traversal guard on every join
//! - **TreeDiffer** ([`tree_diff`]): compares two directory trees by content
//!   and yields the ordered differences (directories before their files)
//! - **ArchiveCodec** ([`archive`]): packs a subtree into a zip stream and
//!   unpacks one into a target directory, with zip-slip protection
//! - **SnapshotTransport** ([`transport`]): the remote snapshot API behind
//!   the [`SnapshotApi`] trait, implemented over HTTP/JSON + multipart
//! - **LinkRegistry** ([`settings`]): the persisted task-to-path mapping,
//!   the only durable state this crate owns beyond the filesystem itself
//! - **SyncOrchestrator** ([`orchestrator`]): the state machine coordinating
//!   Link, Sync, Snapshot, Rollback and Unlink, with progress reporting and
//!   cleanup-on-failure
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use worksync::{
//!     HttpSnapshotTransport, JsonSettingsStore, SnapshotKind, SnapshotSubmission,
//!     SyncOrchestratorBuilder,
//! };
//!
//! # fn main() -> worksync::Result<()> {
//! let api = Arc::new(HttpSnapshotTransport::new("http://localhost:3200")?);
//! let store = Arc::new(JsonSettingsStore::new("settings.json"));
//! let orchestrator = SyncOrchestratorBuilder::new().build(api, store);
//!
//! // Link a remote task into the workspace
//! let outcome = orchestrator.link_to_workspace("T1", Path::new("proj/T1"));
//! assert!(outcome.success);
//!
//! // Capture and upload a snapshot of its source tree
//! let submission = SnapshotSubmission::new(SnapshotKind::Source, "tweaked lighting");
//! let outcome = orchestrator.snapshot("T1", submission);
//! if let Some(snapshot) = outcome.snapshot {
//!     println!("created {}", snapshot.commit_id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure model
//!
//! Orchestrator operations never raise: they return an
//! [`OperationOutcome`] that classifies the result. A declined confirmation
//! is `cancelled` (a normal negative outcome); a remote mutation that
//! succeeded while local re-materialization failed is `partial`, which
//! callers must surface distinctly because the remote record did change.
//! Remote API failures preserve the raw HTTP status and body.
//!
//! Snapshots are immutable and remote-owned: this crate fetches them and
//! creates references to new ones, never mutates one in place. Conflict
//! resolution between machines, retries, and delta transfer within a file
//! are out of scope.

// Public API modules
pub mod archive;
pub mod error;
pub mod orchestrator;
pub mod paths;
pub mod settings;
pub mod transport;
pub mod tree_diff;
pub mod types;

// Internal helpers
mod utils;

// Re-export main types for convenience
pub use error::{Result, WorksyncError};
pub use orchestrator::{SnapshotSubmission, SyncOrchestrator, SyncOrchestratorBuilder};
pub use paths::{validate_relative, PathResolver};
pub use settings::{JsonSettingsStore, LinkRegistry, Settings, SettingsStore};
pub use transport::{CreateSnapshotRequest, HttpSnapshotTransport, SnapshotApi};
pub use tree_diff::{diff_trees, DiffOptions, MARKER_DIR};
pub use types::*;

pub use utils::format_bytes;
