//! The synchronization state machine
//!
//! This module provides [`SyncOrchestrator`], the top-level coordinator for
//! the Link, Sync-from-remote, Snapshot and Rollback operations. Each
//! operation is a short-lived state machine over Validate → Transfer →
//! Finalize, built from the leaf components:
//!
//! - [`crate::paths::PathResolver`] for workspace/remote locations
//! - [`crate::tree_diff`] and [`crate::archive`] for the transfer itself
//! - [`crate::transport::SnapshotApi`] for remote calls
//! - [`crate::settings::LinkRegistry`] updated on success
//!
//! The orchestrator is the single seam where failures are caught and
//! classified: every public operation returns an [`OperationOutcome`] rather
//! than raising past its own boundary. Nothing is retried automatically, and
//! every temporary file produced along the way is deleted on every exit path
//! through scope-bound [`tempfile::NamedTempFile`] handles.
//!
//! ## Concurrency
//!
//! One logical operation runs per invocation, with blocking filesystem and
//! network steps issued sequentially. Operations on *different* tasks are
//! independent and may run concurrently. Two operations on the *same* task
//! are not guarded here - a Snapshot and an Unlink on one task can
//! interleave - so callers serialize them (typically by disabling the
//! relevant UI action while one is pending). No locks are taken on the
//! workspace directory.

use crate::archive::{pack_dir_to_file, unpack_file_into};
use crate::error::{Result, WorksyncError};
use crate::paths::PathResolver;
use crate::settings::{LinkRegistry, Settings, SettingsStore};
use crate::transport::{CreateSnapshotRequest, SnapshotApi};
use crate::tree_diff::{diff_trees, DiffOptions};
use crate::types::{
    AutoConfirm, ConfirmGate, EntryKind, MediaFiles, OperationOutcome, ProgressSink, Snapshot,
    SnapshotAuthor, SnapshotKind,
};
use crate::utils::format_bytes;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, instrument, warn};

/// Caller-supplied fields for a snapshot submission
#[derive(Debug, Clone)]
pub struct SnapshotSubmission {
    /// Which content tree to capture
    pub kind: SnapshotKind,
    /// Commit message
    pub message: String,
    /// Author fields, if known
    pub author: Option<SnapshotAuthor>,
    /// Pre-produced media files; deleted after submission on every path
    pub media: MediaFiles,
    /// Skip packing the linked directory entirely
    pub bypass_zip: bool,
    /// Ask the server to skip media post-processing
    pub bypass_processing: bool,
}

impl SnapshotSubmission {
    /// A submission with just a kind and message
    pub fn new(kind: SnapshotKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            author: None,
            media: MediaFiles::default(),
            bypass_zip: false,
            bypass_processing: false,
        }
    }
}

/// Builder for [`SyncOrchestrator`]
pub struct SyncOrchestratorBuilder {
    progress: Option<ProgressSink>,
    confirm: Arc<dyn ConfirmGate>,
}

impl Default for SyncOrchestratorBuilder {
    fn default() -> Self {
        Self {
            progress: None,
            confirm: Arc::new(AutoConfirm),
        }
    }
}

impl SyncOrchestratorBuilder {
    /// Start a builder with no progress sink and an auto-confirming gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive string-labelled progress events during transfers
    pub fn progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Gate destructive operations behind a confirmation prompt
    pub fn confirm_gate(mut self, gate: Arc<dyn ConfirmGate>) -> Self {
        self.confirm = gate;
        self
    }

    /// Build the orchestrator over a remote API and a settings store
    pub fn build(
        self,
        api: Arc<dyn SnapshotApi>,
        store: Arc<dyn SettingsStore>,
    ) -> SyncOrchestrator {
        SyncOrchestrator {
            api,
            registry: LinkRegistry::new(store.clone()),
            store,
            progress: self.progress,
            confirm: self.confirm,
        }
    }
}

/// Coordinator for workspace synchronization and snapshot operations
///
/// See the [module documentation](self) for the operation model and the
/// same-task concurrency caveat.
pub struct SyncOrchestrator {
    api: Arc<dyn SnapshotApi>,
    store: Arc<dyn SettingsStore>,
    registry: LinkRegistry,
    progress: Option<ProgressSink>,
    confirm: Arc<dyn ConfirmGate>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// The link registry this orchestrator maintains
    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    fn emit(&self, label: &str) {
        if let Some(sink) = &self.progress {
            sink(label);
        }
    }

    fn settings(&self) -> Result<Settings> {
        self.store.load()
    }

    /// Resolver with a required workspace root; remote root carried if set
    fn resolver(&self) -> Result<PathResolver> {
        let settings = self.settings()?;
        let workspace = settings
            .workspace_path
            .ok_or_else(|| WorksyncError::config("workspace path is not set"))?;
        Ok(PathResolver::new(workspace, settings.remote_path))
    }

    fn classify(result: Result<Option<Snapshot>>) -> OperationOutcome {
        match result {
            Ok(Some(snapshot)) => OperationOutcome::ok_with_snapshot(snapshot),
            Ok(None) => OperationOutcome::ok(),
            Err(err) => {
                if err.is_cancelled() {
                    info!("operation cancelled by user");
                } else if err.is_partial() {
                    warn!(error = %err, "operation partially failed");
                } else {
                    error!(error = %err, "operation failed");
                }
                OperationOutcome::from_error(&err)
            }
        }
    }

    /// Pull remote content for a relative path into the workspace
    ///
    /// Validate requires both the workspace and remote roots. Transfer diffs
    /// the remote tree against the workspace tree (content comparison, the
    /// `.worksync` marker excluded) and copies every reported entry in order,
    /// overwriting changed files. Emits one `"syncing <name>"` event per
    /// processed entry. No registry change is made.
    #[instrument(skip(self))]
    pub fn sync_from_remote(&self, relative_path: &Path) -> OperationOutcome {
        Self::classify(self.run_sync_from_remote(relative_path).map(|_| None))
    }

    fn run_sync_from_remote(&self, relative_path: &Path) -> Result<usize> {
        let resolver = self.resolver()?;
        let source = resolver.remote_path(relative_path)?;
        let dest = resolver.workspace_path(relative_path)?;
        fs::create_dir_all(&dest)?;

        let entries = diff_trees(&source, &dest, &DiffOptions::default())?;
        info!(count = entries.len(), "syncing entries from remote");

        for entry in &entries {
            let name = entry
                .relative_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.emit(&format!("syncing {name}"));

            let target = dest.join(&entry.relative_path);
            match entry.entry_kind {
                EntryKind::Directory => {
                    fs::create_dir_all(&target)?;
                }
                EntryKind::File => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(source.join(&entry.relative_path), &target)?;
                }
            }
        }
        Ok(entries.len())
    }

    /// Link a task to a workspace folder, materializing its latest snapshots
    ///
    /// A task with no snapshots yet is validly linkable: the destination
    /// directory is created empty and the link registered. Otherwise the most
    /// recent snapshot of each kind (index order, newest first) is fetched
    /// and extracted into `<relative_path>/<kind>/`; a snapshot without
    /// packaged contents is skipped, not fatal. The destination directory is
    /// created before any transfer, so a registered link always points at an
    /// existing directory. The link is registered only after every selected
    /// snapshot succeeded - failure aborts without registering, leaving any
    /// partially-extracted directories on disk.
    #[instrument(skip(self))]
    pub fn link_to_workspace(&self, task_id: &str, relative_path: &Path) -> OperationOutcome {
        Self::classify(
            self.run_link_to_workspace(task_id, relative_path)
                .map(|_| None),
        )
    }

    fn run_link_to_workspace(&self, task_id: &str, relative_path: &Path) -> Result<()> {
        let settings = self.settings()?;
        let workspace = settings
            .workspace_path
            .ok_or_else(|| WorksyncError::config("workspace path is not set"))?;
        let resolver = PathResolver::new(workspace, None);
        let dest = resolver.workspace_path(relative_path)?;

        let snapshots = self.api.list_snapshots(task_id)?;
        // The destination always exists before the link is registered, even
        // when no selected snapshot carries packaged contents
        fs::create_dir_all(&dest)?;
        if snapshots.is_empty() {
            debug!("task has no snapshots yet; linking empty directory");
            self.registry.set(task_id, relative_path)?;
            return Ok(());
        }

        for kind in [SnapshotKind::Source, SnapshotKind::Exports] {
            // Index order is server-defined, newest first
            let Some(snapshot) = snapshots.iter().find(|s| s.kind == kind) else {
                continue;
            };
            self.emit(&format!("Downloading {kind} zip..."));
            let Some(bytes) = self.api.fetch_contents(task_id, &snapshot.commit_id)? else {
                debug!(%kind, commit_id = %snapshot.commit_id, "no packaged contents; skipping");
                continue;
            };
            let mut tmp = NamedTempFile::new()?;
            tmp.write_all(&bytes)?;
            self.emit(&format!("Extracting {kind}..."));
            unpack_file_into(tmp.path(), &dest.join(kind.as_str()))?;
            // tmp dropped here, deleting the downloaded archive
        }

        self.registry.set(task_id, relative_path)?;
        info!(task_id, path = ?relative_path, "task linked to workspace");
        Ok(())
    }

    /// Capture and upload a snapshot of a task's linked content
    ///
    /// Unless `bypass_zip` is set, the linked `<path>/<kind>` directory is
    /// packed into a temporary zip and attached to the submission; no link
    /// or no such directory simply means no archive is attached. The
    /// temporary archive and every caller-provided media file are deleted on
    /// every exit path, success or failure. The outcome carries the created
    /// snapshot on success.
    #[instrument(skip(self, submission), fields(kind = %submission.kind))]
    pub fn snapshot(&self, task_id: &str, submission: SnapshotSubmission) -> OperationOutcome {
        Self::classify(self.run_snapshot(task_id, submission).map(Some))
    }

    fn run_snapshot(&self, task_id: &str, submission: SnapshotSubmission) -> Result<Snapshot> {
        let result = self.pack_and_submit(task_id, &submission);

        // Media inputs are one-shot artifacts of the transcoding step;
        // delete them whether the submission got anywhere or not, including
        // failures before packing even started.
        for media_path in submission.media.paths() {
            if media_path.exists() {
                if let Err(e) = fs::remove_file(media_path) {
                    warn!(path = ?media_path, error = %e, "failed to delete media file");
                }
            }
        }

        let snapshot = result?;
        info!(commit_id = %snapshot.commit_id, "snapshot created");
        Ok(snapshot)
    }

    fn pack_and_submit(&self, task_id: &str, submission: &SnapshotSubmission) -> Result<Snapshot> {
        let mut archive_tmp: Option<NamedTempFile> = None;

        if !submission.bypass_zip {
            if let Some(content_dir) = self.linked_content_dir(task_id, submission.kind)? {
                self.emit(&format!("Packing {} zip...", submission.kind));
                let tmp = tempfile::Builder::new()
                    .prefix("worksync-")
                    .suffix(".zip")
                    .tempfile()?;
                let summary = pack_dir_to_file(&content_dir, tmp.path())?;
                info!(
                    files = summary.files,
                    bytes = summary.bytes,
                    "packed snapshot contents"
                );
                self.emit(&format!(
                    "Packed {} files ({})",
                    summary.files,
                    format_bytes(summary.bytes)
                ));
                archive_tmp = Some(tmp);
            }
        }

        let request = CreateSnapshotRequest {
            task_id: task_id.to_string(),
            kind: submission.kind,
            message: submission.message.clone(),
            author: submission.author.clone(),
            media: submission.media.clone(),
            contents_archive: archive_tmp.as_ref().map(|t| t.path().to_path_buf()),
            bypass_zip: submission.bypass_zip,
            bypass_processing: submission.bypass_processing,
        };

        self.emit("Uploading snapshot...");
        // archive_tmp is dropped when this returns, deleting the packed zip
        // on success and failure alike
        self.api.create_snapshot(&request)
    }

    /// The `workspace/<link>/<kind>` directory for a task, if it exists
    fn linked_content_dir(&self, task_id: &str, kind: SnapshotKind) -> Result<Option<PathBuf>> {
        let Some(relative) = self.registry.get(task_id)? else {
            debug!(task_id, "task is not linked; nothing to pack");
            return Ok(None);
        };
        let settings = self.settings()?;
        let Some(workspace) = settings.workspace_path else {
            debug!("workspace path not set; nothing to pack");
            return Ok(None);
        };
        let resolver = PathResolver::new(workspace, None);
        let dir = resolver.workspace_path(&relative)?.join(kind.as_str());
        if dir.is_dir() {
            Ok(Some(dir))
        } else {
            debug!(dir = ?dir, "linked content directory absent; nothing to pack");
            Ok(None)
        }
    }

    /// Roll a task back to a prior snapshot, remotely then locally
    ///
    /// Destructive: the user must confirm before anything happens; declining
    /// yields a cancelled outcome with zero network traffic. The snapshot's
    /// kind is looked up in the index (lookup failure defaults to `source`,
    /// logged). After the server-side rollback succeeds, the linked
    /// `<path>/<kind>` directory is deleted, recreated and re-materialized
    /// from the snapshot's packaged contents. Any failure in that local phase
    /// is reported as a *partial* outcome - the remote record did change and
    /// the local mirror may now be stale.
    #[instrument(skip(self))]
    pub fn rollback_snapshot(&self, task_id: &str, commit_id: &str) -> OperationOutcome {
        Self::classify(self.run_rollback(task_id, commit_id).map(Some))
    }

    fn run_rollback(&self, task_id: &str, commit_id: &str) -> Result<Snapshot> {
        let prompt = format!(
            "Roll back task {task_id} to snapshot {commit_id}? This discards current content."
        );
        if !self.confirm.confirm(&prompt) {
            return Err(WorksyncError::Cancelled);
        }

        let kind = match self.api.list_snapshots(task_id) {
            Ok(snapshots) => snapshots
                .iter()
                .find(|s| s.commit_id == commit_id)
                .map(|s| s.kind)
                .unwrap_or_else(|| {
                    warn!(commit_id, "snapshot not in index; defaulting to source");
                    SnapshotKind::Source
                }),
            Err(e) => {
                warn!(error = %e, "snapshot index lookup failed; defaulting to source");
                SnapshotKind::Source
            }
        };

        let snapshot = self.api.request_rollback(task_id, commit_id)?;
        info!(commit_id, %kind, "remote rollback succeeded");

        // From here on the remote pointer has moved; local failures are
        // partial, not full, so the caller knows the remote record changed.
        self.rematerialize(task_id, commit_id, kind).map_err(|e| {
            WorksyncError::partial(format!(
                "remote rollback succeeded but local refresh failed: {e}"
            ))
        })?;

        Ok(snapshot)
    }

    fn rematerialize(&self, task_id: &str, commit_id: &str, kind: SnapshotKind) -> Result<()> {
        let Some(relative) = self.registry.get(task_id)? else {
            debug!(task_id, "task not linked; no local refresh needed");
            return Ok(());
        };
        let settings = self.settings()?;
        let Some(workspace) = settings.workspace_path else {
            debug!("workspace path not set; no local refresh needed");
            return Ok(());
        };
        let resolver = PathResolver::new(workspace, None);
        let target = resolver.workspace_path(&relative)?.join(kind.as_str());

        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::create_dir_all(&target)?;

        self.emit(&format!("Downloading {kind} zip..."));
        match self.api.fetch_contents(task_id, commit_id)? {
            Some(bytes) => {
                let mut tmp = NamedTempFile::new()?;
                tmp.write_all(&bytes)?;
                self.emit(&format!("Extracting {kind}..."));
                unpack_file_into(tmp.path(), &target)?;
            }
            None => {
                // A snapshot with no packaged contents materializes as an
                // empty tree, matching the link-time skip.
                debug!(commit_id, "rolled-back snapshot has no packaged contents");
            }
        }
        Ok(())
    }

    /// Remove a task's workspace folder and its link
    ///
    /// Requires confirmation only when the target directory actually exists.
    /// The registry entry is removed unconditionally afterwards, even if
    /// nothing existed on disk - a link must not point at nothing.
    #[instrument(skip(self))]
    pub fn unlink_from_workspace(&self, task_id: &str, relative_path: &Path) -> OperationOutcome {
        Self::classify(
            self.run_unlink(task_id, relative_path)
                .map(|_| None),
        )
    }

    fn run_unlink(&self, task_id: &str, relative_path: &Path) -> Result<()> {
        let resolver = self.resolver()?;
        let target = resolver.workspace_path(relative_path)?;

        if target.exists() {
            let prompt = format!(
                "Delete {target:?} and unlink task {task_id}? This removes the local copy."
            );
            if !self.confirm.confirm(&prompt) {
                return Err(WorksyncError::Cancelled);
            }
            fs::remove_dir_all(&target)?;
        }

        self.registry.remove(task_id)?;
        info!(task_id, "task unlinked from workspace");
        Ok(())
    }

    /// Delete a snapshot record on the remote service
    ///
    /// Destructive and confirmed like rollback; an already-deleted snapshot
    /// counts as success.
    #[instrument(skip(self))]
    pub fn delete_snapshot(&self, task_id: &str, commit_id: &str) -> OperationOutcome {
        Self::classify(self.run_delete_snapshot(task_id, commit_id).map(|_| None))
    }

    fn run_delete_snapshot(&self, task_id: &str, commit_id: &str) -> Result<()> {
        let prompt = format!("Delete snapshot {commit_id} of task {task_id} permanently?");
        if !self.confirm.confirm(&prompt) {
            return Err(WorksyncError::Cancelled);
        }
        self.api.delete_snapshot(task_id, commit_id)?;
        info!(commit_id, "snapshot deleted");
        Ok(())
    }
}
