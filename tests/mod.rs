//! Integration tests for worksync
//!
//! These tests drive the orchestrator end-to-end against real temporary
//! directories and an in-memory fake of the remote snapshot API. The fake
//! records every call so tests can assert not just on filesystem outcomes
//! but on which remote operations were (and were not) issued.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use worksync::{
    archive, AutoConfirm, ConfirmGate, CreateSnapshotRequest, DenyAll, JsonSettingsStore,
    MediaFiles, Result, SettingsStore, Snapshot, SnapshotApi, SnapshotKind, SnapshotSubmission,
    SyncOrchestrator, SyncOrchestratorBuilder, WorksyncError,
};

/// A snapshot record as the remote index would return it
fn remote_snapshot(commit_id: &str, kind: SnapshotKind) -> Snapshot {
    Snapshot {
        commit_id: commit_id.to_string(),
        kind,
        message: format!("snapshot {commit_id}"),
        username: Some("ada".to_string()),
        user_id: Some("u7".to_string()),
        created_at: Utc::now(),
    }
}

/// Zip bytes for a set of (relative path, content) pairs
fn zip_fixture(files: &[(&str, &[u8])]) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    // Pack into a sibling temp dir so the archive is not its own entry
    let out_dir = TempDir::new().unwrap();
    let out = out_dir.path().join("fixture.zip");
    archive::pack_dir_to_file(dir.path(), &out).unwrap();
    fs::read(out).unwrap()
}

/// What the fake observed about one create_snapshot call
#[derive(Debug, Clone)]
struct CreateRecord {
    task_id: String,
    kind: SnapshotKind,
    message: String,
    bypass_zip: bool,
    /// The archive path attached to the request, if any
    archive_path: Option<PathBuf>,
    /// The archive bytes as they existed at submission time
    archive_bytes: Option<Vec<u8>>,
}

/// In-memory fake of the remote snapshot API
#[derive(Default)]
struct FakeApi {
    snapshots: Mutex<Vec<Snapshot>>,
    /// commit_id -> packaged contents; absent means 404
    contents: Mutex<BTreeMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    creates: Mutex<Vec<CreateRecord>>,
    fail_list: Mutex<bool>,
    fail_fetch: Mutex<bool>,
    fail_create: Mutex<bool>,
}

impl FakeApi {
    fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let api = FakeApi::default();
        *api.snapshots.lock() = snapshots;
        api
    }

    fn put_contents(&self, commit_id: &str, bytes: Vec<u8>) {
        self.contents.lock().insert(commit_id.to_string(), bytes);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl SnapshotApi for FakeApi {
    fn list_snapshots(&self, task_id: &str) -> Result<Vec<Snapshot>> {
        self.calls.lock().push(format!("list {task_id}"));
        if *self.fail_list.lock() {
            return Err(WorksyncError::remote(500, "index unavailable"));
        }
        Ok(self.snapshots.lock().clone())
    }

    fn fetch_contents(&self, task_id: &str, commit_id: &str) -> Result<Option<Vec<u8>>> {
        self.calls.lock().push(format!("fetch {task_id} {commit_id}"));
        if *self.fail_fetch.lock() {
            return Err(WorksyncError::remote(500, "storage offline"));
        }
        Ok(self.contents.lock().get(commit_id).cloned())
    }

    fn create_snapshot(&self, request: &CreateSnapshotRequest) -> Result<Snapshot> {
        self.calls.lock().push(format!("create {}", request.task_id));
        let archive_bytes = request
            .contents_archive
            .as_ref()
            .map(|path| fs::read(path).expect("archive must exist at submission time"));
        self.creates.lock().push(CreateRecord {
            task_id: request.task_id.clone(),
            kind: request.kind,
            message: request.message.clone(),
            bypass_zip: request.bypass_zip,
            archive_path: request.contents_archive.clone(),
            archive_bytes,
        });
        if *self.fail_create.lock() {
            return Err(WorksyncError::remote(500, "upload rejected"));
        }
        Ok(remote_snapshot("created-1", request.kind))
    }

    fn delete_snapshot(&self, task_id: &str, commit_id: &str) -> Result<()> {
        self.calls.lock().push(format!("delete {task_id} {commit_id}"));
        Ok(())
    }

    fn request_rollback(&self, task_id: &str, commit_id: &str) -> Result<Snapshot> {
        self.calls.lock().push(format!("rollback {task_id} {commit_id}"));
        let kind = self
            .snapshots
            .lock()
            .iter()
            .find(|s| s.commit_id == commit_id)
            .map(|s| s.kind)
            .unwrap_or(SnapshotKind::Source);
        Ok(remote_snapshot(commit_id, kind))
    }
}

/// Temp workspace + settings + fake API, wired into an orchestrator
struct Harness {
    workspace: TempDir,
    remote: TempDir,
    _settings_dir: TempDir,
    store: Arc<JsonSettingsStore>,
    api: Arc<FakeApi>,
    progress: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(api: FakeApi) -> Self {
        let workspace = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let settings_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonSettingsStore::new(
            settings_dir.path().join("settings.json"),
        ));

        let mut settings = worksync::Settings::default();
        settings.workspace_path = Some(workspace.path().to_path_buf());
        settings.remote_path = Some(remote.path().to_path_buf());
        store.save(&settings).unwrap();

        Harness {
            workspace,
            remote,
            _settings_dir: settings_dir,
            store,
            api: Arc::new(api),
            progress: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn orchestrator(&self) -> SyncOrchestrator {
        self.orchestrator_with(Arc::new(AutoConfirm))
    }

    fn orchestrator_with(&self, gate: Arc<dyn ConfirmGate>) -> SyncOrchestrator {
        let progress = self.progress.clone();
        SyncOrchestratorBuilder::new()
            .progress_sink(Arc::new(move |label: &str| {
                progress.lock().push(label.to_string());
            }))
            .confirm_gate(gate)
            .build(self.api.clone(), self.store.clone())
    }

    fn ws(&self) -> &Path {
        self.workspace.path()
    }

    fn write_ws(&self, rel: &str, content: &[u8]) {
        let path = self.ws().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn write_remote(&self, rel: &str, content: &[u8]) {
        let path = self.remote.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn clear_remote_root(&self) {
        let mut settings = self.store.load().unwrap();
        settings.remote_path = None;
        self.store.save(&settings).unwrap();
    }
}

mod link_ops {
    use super::*;

    #[test]
    fn zero_snapshots_creates_empty_dir_and_registers() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();

        let outcome = orchestrator.link_to_workspace("T1", Path::new("proj/T1"));
        assert!(outcome.success);
        assert!(harness.ws().join("proj/T1").is_dir());
        assert_eq!(
            orchestrator.registry().get("T1").unwrap(),
            Some(PathBuf::from("proj/T1"))
        );
    }

    #[test]
    fn fetches_latest_of_each_kind_in_index_order() {
        // Index is newest-first: c2 must win over c1 for "source"
        let api = FakeApi::with_snapshots(vec![
            remote_snapshot("c2", SnapshotKind::Source),
            remote_snapshot("c1", SnapshotKind::Source),
            remote_snapshot("e1", SnapshotKind::Exports),
        ]);
        api.put_contents("c2", zip_fixture(&[("scene.blend", b"v2")]));
        api.put_contents("e1", zip_fixture(&[("render.png", b"img")]));

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.link_to_workspace("T1", Path::new("proj/T1"));

        assert!(outcome.success);
        assert_eq!(
            fs::read(harness.ws().join("proj/T1/source/scene.blend")).unwrap(),
            b"v2"
        );
        assert_eq!(
            fs::read(harness.ws().join("proj/T1/exports/render.png")).unwrap(),
            b"img"
        );

        let calls = harness.api.calls();
        assert!(calls.contains(&"fetch T1 c2".to_string()));
        assert!(!calls.contains(&"fetch T1 c1".to_string()));
    }

    #[test]
    fn missing_exports_contents_is_non_fatal() {
        let api = FakeApi::with_snapshots(vec![
            remote_snapshot("c1", SnapshotKind::Source),
            remote_snapshot("e1", SnapshotKind::Exports),
        ]);
        // Only the source snapshot has packaged contents; exports 404s
        api.put_contents("c1", zip_fixture(&[("scene.blend", b"v1")]));

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.link_to_workspace("T1", Path::new("proj/T1"));

        assert!(outcome.success);
        assert!(harness.ws().join("proj/T1/source/scene.blend").is_file());
        assert!(!harness.ws().join("proj/T1/exports").exists());
        assert_eq!(
            orchestrator.registry().get("T1").unwrap(),
            Some(PathBuf::from("proj/T1"))
        );
    }

    #[test]
    fn all_kinds_without_contents_still_creates_directory() {
        // Non-empty index, but no snapshot carries packaged contents: the
        // link must still point at a real directory
        let api = FakeApi::with_snapshots(vec![
            remote_snapshot("c1", SnapshotKind::Source),
            remote_snapshot("e1", SnapshotKind::Exports),
        ]);

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.link_to_workspace("T1", Path::new("proj/T1"));

        assert!(outcome.success);
        assert!(harness.ws().join("proj/T1").is_dir());
        assert_eq!(
            orchestrator.registry().get("T1").unwrap(),
            Some(PathBuf::from("proj/T1"))
        );
    }

    #[test]
    fn transfer_failure_aborts_without_registering() {
        let api = FakeApi::with_snapshots(vec![remote_snapshot("c1", SnapshotKind::Source)]);
        *api.fail_fetch.lock() = true;

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.link_to_workspace("T1", Path::new("proj/T1"));

        assert!(!outcome.success);
        assert!(!outcome.cancelled);
        assert_eq!(orchestrator.registry().get("T1").unwrap(), None);
    }

    #[test]
    fn traversal_relative_path_is_rejected() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();

        let outcome = orchestrator.link_to_workspace("T1", Path::new("../outside"));
        assert!(!outcome.success);
        // Rejected before any remote call
        assert!(harness.api.calls().is_empty());
    }
}

mod sync_ops {
    use super::*;

    #[test]
    fn copies_missing_and_changed_entries() {
        let harness = Harness::new(FakeApi::default());
        harness.write_remote("proj/T1/a/one.txt", b"one");
        harness.write_remote("proj/T1/two.txt", b"two v2");
        harness.write_ws("proj/T1/two.txt", b"two v1");

        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.sync_from_remote(Path::new("proj/T1"));

        assert!(outcome.success);
        assert_eq!(fs::read(harness.ws().join("proj/T1/a/one.txt")).unwrap(), b"one");
        assert_eq!(fs::read(harness.ws().join("proj/T1/two.txt")).unwrap(), b"two v2");

        // One progress event per processed entry, carrying its name
        let progress = harness.progress.lock();
        assert!(progress.iter().any(|p| p == "syncing one.txt"));
        assert!(progress.iter().any(|p| p == "syncing two.txt"));
    }

    #[test]
    fn unconfigured_remote_root_fails_fast() {
        let harness = Harness::new(FakeApi::default());
        harness.clear_remote_root();

        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.sync_from_remote(Path::new("proj/T1"));

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("remote path"));
    }

    #[test]
    fn marker_directory_is_not_synced() {
        let harness = Harness::new(FakeApi::default());
        harness.write_remote("proj/T1/.worksync/state.json", b"{}");
        harness.write_remote("proj/T1/kept.txt", b"k");

        let orchestrator = harness.orchestrator();
        let outcome = orchestrator.sync_from_remote(Path::new("proj/T1"));

        assert!(outcome.success);
        assert!(harness.ws().join("proj/T1/kept.txt").is_file());
        assert!(!harness.ws().join("proj/T1/.worksync").exists());
    }
}

mod snapshot_ops {
    use super::*;

    #[test]
    fn packs_linked_source_dir_and_cleans_up() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/source/scene.blend", b"blend bytes");

        let outcome = orchestrator.snapshot(
            "T1",
            SnapshotSubmission::new(SnapshotKind::Source, "lighting pass"),
        );
        assert!(outcome.success);
        assert_eq!(outcome.snapshot.unwrap().commit_id, "created-1");

        let creates = harness.api.creates.lock();
        let record = &creates[0];
        assert_eq!(record.task_id, "T1");
        assert_eq!(record.kind, SnapshotKind::Source);
        assert_eq!(record.message, "lighting pass");
        assert!(!record.bypass_zip);

        // The attached archive held exactly the packed tree...
        let bytes = record.archive_bytes.clone().unwrap();
        let unpack_dir = TempDir::new().unwrap();
        let count =
            archive::unpack_into(std::io::Cursor::new(bytes), unpack_dir.path()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            fs::read(unpack_dir.path().join("scene.blend")).unwrap(),
            b"blend bytes"
        );

        // ...and the temporary zip is gone after the operation
        assert!(!record.archive_path.clone().unwrap().exists());

        // Pack progress reports the human-readable payload size
        let progress = harness.progress.lock();
        assert!(progress.iter().any(|p| p == "Packed 1 files (11 B)"));
    }

    #[test]
    fn temp_archive_deleted_even_when_upload_fails() {
        let api = FakeApi::default();
        *api.fail_create.lock() = true;

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/source/scene.blend", b"blend bytes");

        let outcome = orchestrator.snapshot(
            "T1",
            SnapshotSubmission::new(SnapshotKind::Source, "doomed"),
        );
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("upload rejected"));

        let creates = harness.api.creates.lock();
        assert!(!creates[0].archive_path.clone().unwrap().exists());
    }

    #[test]
    fn bypass_zip_never_packs() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/source/scene.blend", b"present but unpacked");

        let mut submission = SnapshotSubmission::new(SnapshotKind::Source, "m");
        submission.bypass_zip = true;
        let outcome = orchestrator.snapshot("T1", submission);

        assert!(outcome.success);
        let creates = harness.api.creates.lock();
        assert!(creates[0].archive_path.is_none());
        assert!(creates[0].bypass_zip);
    }

    #[test]
    fn unlinked_task_never_packs() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();

        let outcome = orchestrator.snapshot(
            "T-unlinked",
            SnapshotSubmission::new(SnapshotKind::Source, "m"),
        );
        assert!(outcome.success);
        assert!(harness.api.creates.lock()[0].archive_path.is_none());
    }

    #[test]
    fn media_deleted_when_validation_fails_before_packing() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();
        // A stored link that escapes the workspace fails validation before
        // any packing or upload happens
        orchestrator
            .registry()
            .set("T1", Path::new("../outside"))
            .unwrap();

        let media_dir = TempDir::new().unwrap();
        let thumbnail = media_dir.path().join("thumb.png");
        fs::write(&thumbnail, b"png").unwrap();

        let mut submission = SnapshotSubmission::new(SnapshotKind::Source, "m");
        submission.media = MediaFiles {
            thumbnail: Some(thumbnail.clone()),
            preview: None,
        };
        let outcome = orchestrator.snapshot("T1", submission);

        assert!(!outcome.success);
        // Failed before reaching the remote at all
        assert!(harness.api.creates.lock().is_empty());
        // The media input must still be cleaned up
        assert!(!thumbnail.exists());
    }

    #[test]
    fn media_files_deleted_on_success_and_failure() {
        for fail in [false, true] {
            let api = FakeApi::default();
            *api.fail_create.lock() = fail;
            let harness = Harness::new(api);
            let orchestrator = harness.orchestrator();

            let media_dir = TempDir::new().unwrap();
            let thumbnail = media_dir.path().join("thumb.png");
            let preview = media_dir.path().join("preview.mp4");
            fs::write(&thumbnail, b"png").unwrap();
            fs::write(&preview, b"mp4").unwrap();

            let mut submission = SnapshotSubmission::new(SnapshotKind::Exports, "m");
            submission.media = MediaFiles {
                thumbnail: Some(thumbnail.clone()),
                preview: Some(preview.clone()),
            };
            let outcome = orchestrator.snapshot("T1", submission);

            assert_eq!(outcome.success, !fail);
            assert!(!thumbnail.exists(), "thumbnail must be deleted (fail={fail})");
            assert!(!preview.exists(), "preview must be deleted (fail={fail})");
        }
    }
}

mod rollback_ops {
    use super::*;

    #[test]
    fn declined_confirmation_makes_no_network_calls() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator_with(Arc::new(DenyAll));

        let outcome = orchestrator.rollback_snapshot("T1", "c1");
        assert!(!outcome.success);
        assert!(outcome.cancelled);
        assert!(harness.api.calls().is_empty());
    }

    #[test]
    fn rematerializes_linked_directory() {
        let api = FakeApi::with_snapshots(vec![remote_snapshot("e1", SnapshotKind::Exports)]);
        api.put_contents("e1", zip_fixture(&[("render.png", b"old render")]));

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/exports/stale.png", b"stale");

        let outcome = orchestrator.rollback_snapshot("T1", "e1");
        assert!(outcome.success);

        let exports = harness.ws().join("proj/T1/exports");
        assert!(!exports.join("stale.png").exists());
        assert_eq!(fs::read(exports.join("render.png")).unwrap(), b"old render");

        let calls = harness.api.calls();
        assert!(calls.contains(&"rollback T1 e1".to_string()));
    }

    #[test]
    fn local_failure_after_remote_success_is_partial() {
        let api = FakeApi::with_snapshots(vec![remote_snapshot("c1", SnapshotKind::Source)]);
        *api.fail_fetch.lock() = true;

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();

        let outcome = orchestrator.rollback_snapshot("T1", "c1");
        assert!(!outcome.success);
        assert!(outcome.partial);
        assert!(!outcome.cancelled);
        // The remote call did go out before the local phase failed
        assert!(harness.api.calls().contains(&"rollback T1 c1".to_string()));
    }

    #[test]
    fn index_lookup_failure_defaults_to_source() {
        let api = FakeApi::default();
        *api.fail_list.lock() = true;
        api.put_contents("c9", zip_fixture(&[("scene.blend", b"rolled back")]));

        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();

        let outcome = orchestrator.rollback_snapshot("T1", "c9");
        assert!(outcome.success);
        assert_eq!(
            fs::read(harness.ws().join("proj/T1/source/scene.blend")).unwrap(),
            b"rolled back"
        );
    }

    #[test]
    fn snapshot_without_contents_leaves_empty_tree() {
        let api = FakeApi::with_snapshots(vec![remote_snapshot("c1", SnapshotKind::Source)]);
        // No contents registered: fetch returns None
        let harness = Harness::new(api);
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/source/old.txt", b"old");

        let outcome = orchestrator.rollback_snapshot("T1", "c1");
        assert!(outcome.success);
        let source = harness.ws().join("proj/T1/source");
        assert!(source.is_dir());
        assert_eq!(fs::read_dir(&source).unwrap().count(), 0);
    }
}

mod unlink_ops {
    use super::*;

    #[test]
    fn removes_directory_and_link() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/source/scene.blend", b"x");

        let outcome = orchestrator.unlink_from_workspace("T1", Path::new("proj/T1"));
        assert!(outcome.success);
        assert!(!harness.ws().join("proj/T1").exists());
        assert_eq!(orchestrator.registry().get("T1").unwrap(), None);
    }

    #[test]
    fn declined_confirmation_leaves_everything() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator_with(Arc::new(DenyAll));
        orchestrator.registry().set("T1", Path::new("proj/T1")).unwrap();
        harness.write_ws("proj/T1/source/scene.blend", b"x");

        let outcome = orchestrator.unlink_from_workspace("T1", Path::new("proj/T1"));
        assert!(outcome.cancelled);
        assert!(harness.ws().join("proj/T1/source/scene.blend").is_file());
        assert_eq!(
            orchestrator.registry().get("T1").unwrap(),
            Some(PathBuf::from("proj/T1"))
        );
    }

    #[test]
    fn absent_directory_needs_no_confirmation() {
        let harness = Harness::new(FakeApi::default());
        // DenyAll would cancel if a prompt were shown; no directory, no prompt
        let orchestrator = harness.orchestrator_with(Arc::new(DenyAll));
        orchestrator.registry().set("T1", Path::new("proj/gone")).unwrap();

        let outcome = orchestrator.unlink_from_workspace("T1", Path::new("proj/gone"));
        assert!(outcome.success);
        assert_eq!(orchestrator.registry().get("T1").unwrap(), None);
    }
}

mod delete_ops {
    use super::*;

    #[test]
    fn confirmed_delete_reaches_the_remote() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator();

        let outcome = orchestrator.delete_snapshot("T1", "c1");
        assert!(outcome.success);
        assert_eq!(harness.api.calls(), vec!["delete T1 c1".to_string()]);
    }

    #[test]
    fn declined_delete_makes_no_calls() {
        let harness = Harness::new(FakeApi::default());
        let orchestrator = harness.orchestrator_with(Arc::new(DenyAll));

        let outcome = orchestrator.delete_snapshot("T1", "c1");
        assert!(outcome.cancelled);
        assert!(harness.api.calls().is_empty());
    }
}
