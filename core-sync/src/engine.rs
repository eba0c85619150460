//! # Sync Engine
//!
//! Moves the three user documents between the data directory and a folder
//! in the remote store.
//!
//! ## Operations
//!
//! - [`SyncEngine::download_all`]: remote bytes replace local bytes
//! - [`SyncEngine::upload_all`]: local bytes replace (or create) remote files
//! - [`SyncEngine::upload_changed`]: upload only files whose checksum moved
//! - [`SyncEngine::sync_now`]: per-file reconciliation, merging records when
//!   both sides changed since the last sync
//!
//! Every remote call runs under [`core_runtime::guard`] with the request
//! timeout. A per-file failure is collected in [`SyncResult::errors`] and
//! the remaining files are still attempted. Cancellation aborts the whole
//! job with [`SyncError::Cancelled`].
//!
//! Metadata for a file is written only after its transfer completed, so an
//! interrupted transfer leaves the previous metadata in place.

use crate::error::{Result, SyncError};
use crate::merge::merge_document;
use crate::metadata::{checksum, LocalMetadataStore};
use crate::records::SYNCED_FILES;
use bridge_traits::{Clock, FileSystemAccess, NewRemoteFile, RemoteFileStore, RemoteStoreFactory};
use bytes::Bytes;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::{guard, CancellationToken};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A file that could not be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub file_name: String,
    pub message: String,
    pub permission_denied: bool,
}

impl FileError {
    fn new(file_name: &str, err: &SyncError) -> Self {
        Self {
            file_name: file_name.to_string(),
            message: err.to_string(),
            permission_denied: err.is_permission_denied(),
        }
    }
}

/// Per-file outcome of a sync job. Each file appears in at most one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub downloaded: Vec<String>,
    pub uploaded: Vec<String>,
    /// Local and remote content already matched
    pub in_sync: Vec<String>,
    /// Both sides changed; the merged document was written and uploaded
    pub conflicted: Vec<String>,
    /// Neither a remote (downloads) nor a local (uploads) copy exists
    pub not_found: Vec<String>,
    pub errors: Vec<FileError>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn permission_error(&self) -> Option<&FileError> {
        self.errors.iter().find(|e| e.permission_denied)
    }
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Download,
    Upload,
    UploadChanged,
    Full,
}

impl JobKind {
    fn direction(self) -> &'static str {
        match self {
            JobKind::Download => "download",
            JobKind::Upload | JobKind::UploadChanged => "upload",
            JobKind::Full => "full",
        }
    }
}

/// What every per-file step of one job shares.
struct Job<'a> {
    id: &'a str,
    remote: &'a Arc<dyn RemoteFileStore>,
    folder: &'a str,
    cancel: &'a CancellationToken,
}

enum FileOutcome {
    Downloaded,
    Uploaded,
    InSync,
    Conflicted,
    NotFound,
}

pub struct SyncEngine {
    fs: Arc<dyn FileSystemAccess>,
    data_dir: PathBuf,
    remote_folder: String,
    factory: Arc<dyn RemoteStoreFactory>,
    metadata: LocalMetadataStore,
    events: EventBus,
    request_timeout: Duration,
    remote: RwLock<Option<Arc<dyn RemoteFileStore>>>,
    folder_id: RwLock<Option<String>>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        data_dir: impl Into<PathBuf>,
        remote_folder: impl Into<String>,
        factory: Arc<dyn RemoteStoreFactory>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> Self {
        let data_dir = data_dir.into();
        let metadata = LocalMetadataStore::new(fs.clone(), data_dir.clone(), clock);
        Self {
            fs,
            data_dir,
            remote_folder: remote_folder.into(),
            factory,
            metadata,
            events,
            request_timeout,
            remote: RwLock::new(None),
            folder_id: RwLock::new(None),
        }
    }

    pub fn metadata(&self) -> &LocalMetadataStore {
        &self.metadata
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Bind the engine to a remote store authorized with `access_token`.
    pub async fn attach(&self, access_token: &str) {
        let store = self.factory.connect(access_token);
        *self.remote.write().await = Some(store);
        debug!("Remote store attached");
    }

    pub async fn detach(&self) {
        *self.remote.write().await = None;
        *self.folder_id.write().await = None;
        debug!("Remote store detached");
    }

    pub async fn is_attached(&self) -> bool {
        self.remote.read().await.is_some()
    }

    /// Whether `file_name` changed locally since it was last synchronized.
    pub async fn has_local_changes(&self, file_name: &str) -> Result<bool> {
        self.metadata.has_changed(file_name).await
    }

    /// Replace every local document with its remote copy.
    #[instrument(skip(self, cancel))]
    pub async fn download_all(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.run_job(JobKind::Download, cancel).await
    }

    /// Push every existing local document to the remote folder.
    #[instrument(skip(self, cancel))]
    pub async fn upload_all(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.run_job(JobKind::Upload, cancel).await
    }

    /// Push only the local documents that changed since the last sync.
    #[instrument(skip(self, cancel))]
    pub async fn upload_changed(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.run_job(JobKind::UploadChanged, cancel).await
    }

    /// Reconcile each document with its remote copy.
    #[instrument(skip(self, cancel))]
    pub async fn sync_now(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.run_job(JobKind::Full, cancel).await
    }

    async fn run_job(&self, kind: JobKind, cancel: &CancellationToken) -> Result<SyncResult> {
        let job_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(job_id = %job_id, direction = kind.direction(), "Starting sync job");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Started {
                job_id: job_id.clone(),
                direction: kind.direction().to_string(),
            }))
            .ok();

        let remote = match self.current_remote().await {
            Ok(remote) => remote,
            Err(e) => return Err(self.abort(&job_id, e)),
        };
        let folder = match self.folder(&remote, cancel).await {
            Ok(folder) => folder,
            Err(e) => return Err(self.abort(&job_id, e)),
        };
        let job = Job {
            id: &job_id,
            remote: &remote,
            folder: &folder,
            cancel,
        };

        let mut result = SyncResult::default();
        for name in SYNCED_FILES {
            let outcome = match kind {
                JobKind::Download => self.download_file(&job, name).await,
                JobKind::Upload => self.upload_file(&job, name).await,
                JobKind::UploadChanged => match self.metadata.has_changed(name).await {
                    Ok(true) => self.upload_file(&job, name).await,
                    Ok(false) => Ok(FileOutcome::InSync),
                    Err(e) => Err(e),
                },
                JobKind::Full => self.reconcile_file(&job, name).await,
            };
            match outcome {
                Ok(outcome) => {
                    let bucket = match outcome {
                        FileOutcome::Downloaded => &mut result.downloaded,
                        FileOutcome::Uploaded => &mut result.uploaded,
                        FileOutcome::InSync => &mut result.in_sync,
                        FileOutcome::Conflicted => &mut result.conflicted,
                        FileOutcome::NotFound => &mut result.not_found,
                    };
                    bucket.push(name.to_string());
                }
                Err(SyncError::Cancelled) => return Err(self.abort(&job_id, SyncError::Cancelled)),
                Err(e) => {
                    warn!(job_id = %job_id, file = name, error = %e, "File sync failed");
                    result.errors.push(FileError::new(name, &e));
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            job_id = %job_id,
            downloaded = result.downloaded.len(),
            uploaded = result.uploaded.len(),
            conflicted = result.conflicted.len(),
            errors = result.errors.len(),
            duration_ms,
            "Sync job completed"
        );
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                job_id,
                downloaded: result.downloaded.len() as u32,
                uploaded: result.uploaded.len() as u32,
                conflicted: result.conflicted.len() as u32,
                errors: result.errors.len() as u32,
                duration_ms,
            }))
            .ok();
        Ok(result)
    }

    fn abort(&self, job_id: &str, err: SyncError) -> SyncError {
        let event = match &err {
            SyncError::Cancelled => {
                info!(job_id, "Sync job cancelled");
                SyncEvent::Cancelled {
                    job_id: job_id.to_string(),
                }
            }
            other => {
                warn!(job_id, error = %other, "Sync job failed");
                SyncEvent::Failed {
                    job_id: job_id.to_string(),
                    message: other.to_string(),
                    recoverable: !matches!(other, SyncError::PermissionDenied(_)),
                }
            }
        };
        self.events.emit(CoreEvent::Sync(event)).ok();
        err
    }

    async fn current_remote(&self) -> Result<Arc<dyn RemoteFileStore>> {
        self.remote.read().await.clone().ok_or(SyncError::NotAttached)
    }

    async fn folder(&self, remote: &Arc<dyn RemoteFileStore>, cancel: &CancellationToken) -> Result<String> {
        if let Some(id) = self.folder_id.read().await.clone() {
            return Ok(id);
        }
        let id = self
            .remote_call(cancel, remote.get_or_create_folder(&self.remote_folder))
            .await?;
        *self.folder_id.write().await = Some(id.clone());
        Ok(id)
    }

    async fn remote_call<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = bridge_traits::error::Result<T>>,
    ) -> Result<T> {
        Ok(guard(cancel, Some(self.request_timeout), fut).await??)
    }

    async fn download_file(&self, job: &Job<'_>, name: &str) -> Result<FileOutcome> {
        let Some(id) = self.find_remote(job, name).await? else {
            debug!(file = name, "No remote copy");
            return Ok(FileOutcome::NotFound);
        };
        self.download_by_id(job, name, &id).await
    }

    async fn download_by_id(&self, job: &Job<'_>, name: &str, id: &str) -> Result<FileOutcome> {
        let content = self.remote_call(job.cancel, job.remote.get(id)).await?;
        self.store_local(name, id, content).await?;
        self.transferred(job, name, "download");
        Ok(FileOutcome::Downloaded)
    }

    async fn upload_file(&self, job: &Job<'_>, name: &str) -> Result<FileOutcome> {
        let Some(content) = self.read_local(name).await? else {
            return Ok(FileOutcome::NotFound);
        };
        let existing = self.find_remote(job, name).await?;
        let id = self.push(job, name, existing, content).await?;
        self.metadata.update(name, Some(&id)).await?;
        self.transferred(job, name, "upload");
        Ok(FileOutcome::Uploaded)
    }

    async fn reconcile_file(&self, job: &Job<'_>, name: &str) -> Result<FileOutcome> {
        let local = self.read_local(name).await?;
        let remote_id = self.find_remote(job, name).await?;

        let (local, id) = match (local, remote_id) {
            (None, None) => return Ok(FileOutcome::NotFound),
            (None, Some(id)) => return self.download_by_id(job, name, &id).await,
            (Some(local), None) => {
                let id = self.push(job, name, None, local).await?;
                self.metadata.update(name, Some(&id)).await?;
                self.transferred(job, name, "upload");
                return Ok(FileOutcome::Uploaded);
            }
            (Some(local), Some(id)) => (local, id),
        };

        let remote_content = self.remote_call(job.cancel, job.remote.get(&id)).await?;
        let remote_sum = checksum(&remote_content);
        if checksum(&local) == remote_sum {
            self.metadata.update(name, Some(&id)).await?;
            return Ok(FileOutcome::InSync);
        }

        let last = self.metadata.get(name).await?;
        let local_changed = last
            .as_ref()
            .map_or(true, |m| m.checksum != checksum(&local));
        let remote_changed = last.as_ref().map_or(true, |m| m.checksum != remote_sum);

        if !local_changed {
            self.store_local(name, &id, remote_content).await?;
            self.transferred(job, name, "download");
            return Ok(FileOutcome::Downloaded);
        }
        if !remote_changed {
            self.push(job, name, Some(id.clone()), local).await?;
            self.metadata.update(name, Some(&id)).await?;
            self.transferred(job, name, "upload");
            return Ok(FileOutcome::Uploaded);
        }

        let (merged, stats) = merge_document(name, &local, &remote_content)?;
        info!(
            file = name,
            added = stats.added,
            updated = stats.updated,
            skipped = stats.skipped,
            "Merged concurrent changes"
        );
        self.push(job, name, Some(id.clone()), merged.clone()).await?;
        self.store_local(name, &id, merged).await?;
        self.transferred(job, name, "upload");
        Ok(FileOutcome::Conflicted)
    }

    async fn find_remote(&self, job: &Job<'_>, name: &str) -> Result<Option<String>> {
        self.remote_call(job.cancel, job.remote.list_by_name_in_folder(name, job.folder))
            .await
    }

    /// Update `existing` in place, or create a new file in the job's folder.
    async fn push(
        &self,
        job: &Job<'_>,
        name: &str,
        existing: Option<String>,
        content: Bytes,
    ) -> Result<String> {
        match existing {
            Some(id) => {
                self.remote_call(job.cancel, job.remote.update_content(&id, content))
                    .await?;
                Ok(id)
            }
            None => {
                let metadata = NewRemoteFile::json(name, job.folder);
                self.remote_call(job.cancel, job.remote.create(metadata, content))
                    .await
            }
        }
    }

    async fn read_local(&self, name: &str) -> Result<Option<Bytes>> {
        let path = self.data_dir.join(name);
        if !self.fs.exists(&path).await.map_err(SyncError::local)? {
            return Ok(None);
        }
        Ok(Some(self.fs.read_file(&path).await.map_err(SyncError::local)?))
    }

    async fn store_local(&self, name: &str, remote_id: &str, content: Bytes) -> Result<()> {
        self.fs
            .create_dir_all(&self.data_dir)
            .await
            .map_err(SyncError::local)?;
        self.fs
            .write_atomic(&self.data_dir.join(name), content)
            .await
            .map_err(SyncError::local)?;
        self.metadata.update(name, Some(remote_id)).await?;
        Ok(())
    }

    fn transferred(&self, job: &Job<'_>, name: &str, direction: &str) {
        debug!(job_id = job.id, file = name, direction, "File transferred");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::FileTransferred {
                job_id: job.id.to_string(),
                file_name: name.to_string(),
                direction: direction.to_string(),
            }))
            .ok();
    }
}
