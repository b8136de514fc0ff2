//! Remote snapshot API transport
//!
//! Talks HTTP/JSON + multipart to the remote task/snapshot service. The
//! orchestrator depends on the [`SnapshotApi`] trait, not on HTTP, so tests
//! drive the engine with an in-memory fake while production wires in
//! [`HttpSnapshotTransport`].
//!
//! Every operation here is independent - there is no shared transaction -
//! and nothing is retried automatically: a non-success status or transport
//! failure surfaces as [`WorksyncError::Remote`] carrying the HTTP status
//! and raw body for caller inspection. Retry policy belongs to the
//! orchestrator, which chooses not to retry and reports failure instead.

use crate::error::{Result, WorksyncError};
use crate::types::{MediaFiles, Snapshot, SnapshotAuthor, SnapshotKind};
use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument};

/// A new snapshot submission
///
/// `media` and `contents_archive` are optional attachments; the paths are
/// read at submission time and deleted afterwards by the orchestrator.
#[derive(Debug, Clone)]
pub struct CreateSnapshotRequest {
    /// Task the snapshot belongs to
    pub task_id: String,
    /// Which content tree is captured
    pub kind: SnapshotKind,
    /// Commit message
    pub message: String,
    /// Author fields, if known
    pub author: Option<SnapshotAuthor>,
    /// Thumbnail/preview files to attach
    pub media: MediaFiles,
    /// Packed contents zip to attach
    pub contents_archive: Option<PathBuf>,
    /// Tell the server no contents zip was produced on purpose
    pub bypass_zip: bool,
    /// Tell the server to skip media post-processing
    pub bypass_processing: bool,
}

/// The remote snapshot API as the engine sees it
pub trait SnapshotApi: Send + Sync {
    /// Snapshot index for a task, in the order the server defines
    fn list_snapshots(&self, task_id: &str) -> Result<Vec<Snapshot>>;

    /// A snapshot's packaged contents. `None` when the snapshot has no
    /// packaged contents (a 404 is a normal empty-result case, not an error).
    fn fetch_contents(&self, task_id: &str, commit_id: &str) -> Result<Option<Vec<u8>>>;

    /// Submit a new snapshot record with its optional attachments
    fn create_snapshot(&self, request: &CreateSnapshotRequest) -> Result<Snapshot>;

    /// Delete a snapshot; an already-deleted snapshot is success
    fn delete_snapshot(&self, task_id: &str, commit_id: &str) -> Result<()>;

    /// Move the task's authoritative pointer back to a prior snapshot.
    /// Server-side only; local re-materialization is the orchestrator's job.
    fn request_rollback(&self, task_id: &str, commit_id: &str) -> Result<Snapshot>;
}

/// HTTP implementation of [`SnapshotApi`]
pub struct HttpSnapshotTransport {
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for HttpSnapshotTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSnapshotTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Map a connection-level failure to a Remote error with status 0
fn transport_error(err: reqwest::Error) -> WorksyncError {
    let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
    WorksyncError::remote(status, err.to_string())
}

/// Turn a non-success response into a Remote error preserving the raw body
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(WorksyncError::remote(status.as_u16(), body))
}

impl HttpSnapshotTransport {
    /// Create a transport against a base URL (trailing slash tolerated)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fetch the raw task record (`GET /get-task/{taskId}`)
    ///
    /// A thin passthrough for display purposes; the payload shape belongs to
    /// the server, so it is returned as-is.
    pub fn get_task(&self, task_id: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.endpoint(&format!("get-task/{task_id}")))
            .send()
            .map_err(transport_error)?;
        check_status(response)?.json().map_err(transport_error)
    }

    /// Create a new task asset record (`POST /createAsset`)
    pub fn create_asset(&self, name: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.endpoint("createAsset"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .map_err(transport_error)?;
        check_status(response)?.json().map_err(transport_error)
    }
}

impl SnapshotApi for HttpSnapshotTransport {
    #[instrument(skip(self))]
    fn list_snapshots(&self, task_id: &str) -> Result<Vec<Snapshot>> {
        let response = self
            .client
            .get(self.endpoint(&format!("snapshots/{task_id}")))
            .send()
            .map_err(transport_error)?;
        let snapshots: Vec<Snapshot> = check_status(response)?.json().map_err(transport_error)?;
        debug!(count = snapshots.len(), "listed snapshots");
        Ok(snapshots)
    }

    #[instrument(skip(self))]
    fn fetch_contents(&self, task_id: &str, commit_id: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.endpoint(&format!("assets/{task_id}/{commit_id}/contents.zip")))
            .send()
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("snapshot has no packaged contents");
            return Ok(None);
        }
        let bytes = check_status(response)?.bytes().map_err(transport_error)?;
        Ok(Some(bytes.to_vec()))
    }

    #[instrument(skip(self, request), fields(task_id = %request.task_id, kind = %request.kind))]
    fn create_snapshot(&self, request: &CreateSnapshotRequest) -> Result<Snapshot> {
        let mut form = Form::new()
            .text("taskId", request.task_id.clone())
            .text("type", request.kind.as_str())
            .text("message", request.message.clone())
            .text("bypassZip", if request.bypass_zip { "true" } else { "false" })
            .text(
                "bypassProcessing",
                if request.bypass_processing { "true" } else { "false" },
            );
        if let Some(author) = &request.author {
            form = form
                .text("username", author.username.clone())
                .text("userId", author.user_id.clone());
        }
        if let Some(thumbnail) = &request.media.thumbnail {
            form = form.file("thumbnail", thumbnail)?;
        }
        if let Some(preview) = &request.media.preview {
            form = form.file("preview", preview)?;
        }
        if let Some(archive) = &request.contents_archive {
            form = form.file("contentsZip", archive)?;
        }

        let response = self
            .client
            .post(self.endpoint("snapshot"))
            .multipart(form)
            .send()
            .map_err(transport_error)?;
        check_status(response)?.json().map_err(transport_error)
    }

    #[instrument(skip(self))]
    fn delete_snapshot(&self, task_id: &str, commit_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("snapshots/{task_id}/{commit_id}")))
            .send()
            .map_err(transport_error)?;
        // Idempotent: deleting an already-deleted snapshot is success
        if response.status() == StatusCode::NOT_FOUND {
            debug!("snapshot already deleted");
            return Ok(());
        }
        check_status(response)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn request_rollback(&self, task_id: &str, commit_id: &str) -> Result<Snapshot> {
        let response = self
            .client
            .post(self.endpoint(&format!("snapshots/{task_id}/{commit_id}/rollback")))
            .send()
            .map_err(transport_error)?;
        check_status(response)?.json().map_err(transport_error)
    }
}
