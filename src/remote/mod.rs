//! Best-effort replication of mirrors into an object store
//!
//! A sync replaces everything under the hostname prefix: every existing object is deleted,
//! then the fresh workspace is uploaded. Nothing here is transactional, and nothing here is
//! allowed to fail the request that produced the archive.

mod s3;

pub use s3::S3ObjectStore;

use crate::config::RemoteStoreConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Maximum number of keys per batch delete request
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Sync ceiling used when none is configured
pub const DEFAULT_SYNC_DEADLINE: Duration = Duration::from_secs(120);

/// Errors that can occur during remote sync
#[derive(Debug, Error)]
pub enum RemoteSyncError {
    /// The prefix or bucket does not exist
    #[error("not found: {0}")]
    NotFound(String),

    #[error("list failed for prefix {prefix}: {message}")]
    List { prefix: String, message: String },

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("upload failed for {key}: {message}")]
    Upload { key: String, message: String },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("client configuration error: {0}")]
    Client(String),
}

/// Result type for remote sync operations
pub type RemoteResult<T> = Result<T, RemoteSyncError>;

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,

    /// Token for the next page; `None` when the listing is exhausted
    pub next_token: Option<String>,
}

/// Minimal object-store capability used by remote sync
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists one page of keys under `prefix`
    async fn list_page(&self, prefix: &str, token: Option<String>) -> RemoteResult<ObjectPage>;

    /// Deletes `keys` in one request
    async fn delete_batch(&self, keys: &[String]) -> RemoteResult<()>;

    /// Uploads the file at `path` under `key`
    async fn put_file(&self, key: &str, path: &Path) -> RemoteResult<()>;
}

/// What a sync did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub deleted: usize,
    pub delete_requests: usize,
    pub uploaded: usize,
    pub failed_uploads: Vec<String>,
}

/// Remote sync component; disabled when no store is configured
#[derive(Clone)]
pub struct RemoteSync {
    store: Option<Arc<dyn ObjectStore>>,
    deadline: Duration,
}

impl Default for RemoteSync {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for RemoteSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSync")
            .field("configured", &self.is_configured())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl RemoteSync {
    /// Creates a sync component backed by `store`
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store: Some(store),
            deadline: DEFAULT_SYNC_DEADLINE,
        }
    }

    /// Creates a sync component that skips every sync
    pub fn disabled() -> Self {
        Self {
            store: None,
            deadline: DEFAULT_SYNC_DEADLINE,
        }
    }

    /// Sets the ceiling for one best-effort sync
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Builds the S3 client once if every credential is present, otherwise disables sync
    pub fn from_config(config: &RemoteStoreConfig) -> Self {
        match config.settings() {
            Some(settings) => Self::new(Arc::new(S3ObjectStore::new(&settings)))
                .with_deadline(settings.sync_timeout),
            None => {
                info!("Remote storage credentials not configured, remote sync disabled");
                Self::disabled()
            }
        }
    }

    /// Returns true if a store is configured
    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Replaces the remote snapshot for `hostname` with the contents of `workspace`
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Sync is disabled; nothing was done
    /// * `Ok(Some(report))` - Delete phase completed and every file was attempted
    /// * `Err(RemoteSyncError)` - Listing, deleting, or walking failed
    pub async fn sync(
        &self,
        workspace: &Path,
        hostname: &str,
    ) -> RemoteResult<Option<SyncReport>> {
        let Some(store) = self.store.as_deref() else {
            debug!(host = hostname, "Remote store not configured, skipping sync");
            return Ok(None);
        };

        let mut report = SyncReport::default();
        delete_prefix(store, hostname, &mut report).await?;
        upload_tree(store, workspace, hostname, &mut report).await?;
        Ok(Some(report))
    }

    /// Runs [`RemoteSync::sync`] under the deadline and logs the outcome instead of returning it
    ///
    /// Returns once the sync finishes or the deadline fires, whichever comes first; an
    /// unfinished sync is dropped.
    pub async fn sync_best_effort(&self, workspace: &Path, hostname: &str) {
        if !self.is_configured() {
            return;
        }

        info!(host = hostname, "Attempting to upload mirror to remote storage");
        let deadline = tokio::time::timeout(self.deadline, self.sync(workspace, hostname));
        let Ok(outcome) = deadline.await else {
            error!(
                host = hostname,
                deadline = ?self.deadline,
                "Remote sync timed out (download still served)"
            );
            return;
        };

        match outcome {
            Ok(Some(report)) if report.failed_uploads.is_empty() => info!(
                host = hostname,
                deleted = report.deleted,
                uploaded = report.uploaded,
                "Remote sync completed"
            ),
            Ok(Some(report)) => warn!(
                host = hostname,
                uploaded = report.uploaded,
                failed = report.failed_uploads.len(),
                "Remote sync completed with failed uploads"
            ),
            Ok(None) => {}
            Err(e) => error!(
                host = hostname,
                error = %e,
                "Remote storage error (download still served)"
            ),
        }
    }
}

/// Returns the listing prefix for a hostname namespace
pub fn namespace_prefix(hostname: &str) -> String {
    if hostname.ends_with('/') {
        hostname.to_string()
    } else {
        format!("{}/", hostname)
    }
}

/// Builds the object key for a file relative to the workspace root
pub fn object_key(hostname: &str, relative: &Path) -> String {
    let mut key = hostname.trim_end_matches('/').to_string();
    for component in relative.components() {
        key.push('/');
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    key
}

async fn delete_prefix(
    store: &dyn ObjectStore,
    hostname: &str,
    report: &mut SyncReport,
) -> RemoteResult<()> {
    let prefix = namespace_prefix(hostname);
    let mut token = None;

    loop {
        let page = match store.list_page(&prefix, token.take()).await {
            Ok(page) => page,
            Err(RemoteSyncError::NotFound(_)) => {
                debug!(prefix = %prefix, "Prefix not found, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for batch in page.keys.chunks(DELETE_BATCH_SIZE) {
            match store.delete_batch(batch).await {
                Ok(()) => {}
                Err(RemoteSyncError::NotFound(what)) => {
                    debug!(prefix = %prefix, "Some keys already gone: {}", what);
                }
                Err(e) => return Err(e),
            }
            report.delete_requests += 1;
            report.deleted += batch.len();
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(prefix = %prefix, deleted = report.deleted, "Delete phase finished");
    Ok(())
}

async fn upload_tree(
    store: &dyn ObjectStore,
    workspace: &Path,
    hostname: &str,
    report: &mut SyncReport,
) -> RemoteResult<()> {
    for entry in WalkDir::new(workspace).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| RemoteSyncError::Walk {
            path: workspace.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(workspace)
            .unwrap_or_else(|_| entry.path());
        let key = object_key(hostname, relative);

        match store.put_file(&key, entry.path()).await {
            Ok(()) => report.uploaded += 1,
            Err(e) => {
                error!(path = %entry.path().display(), error = %e, "Error uploading file");
                report.failed_uploads.push(key);
            }
        }
    }
    Ok(())
}
