//! Mirror directory management
//!
//! The storage root holds one workspace directory per hostname plus transient `*.zip`
//! archives. This module owns both:
//! - Resetting a host's workspace to an empty directory before each run
//! - Naming archive artifacts
//! - Sweeping archives left behind by an earlier process
//! - Serializing runs that target the same host

mod lock;

pub use lock::{HostLocks, HostRunGuard};

use crate::MirrorError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extension of archive artifacts
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Owns the on-disk mirrors root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager for the given mirrors root (not created until first use)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the mirrors root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the workspace directory for `hostname`
    pub fn workspace_path(&self, hostname: &str) -> PathBuf {
        self.root.join(hostname)
    }

    /// Deletes and recreates the workspace for `hostname`
    ///
    /// The root directory is created if absent. Any previous workspace contents are removed
    /// unconditionally; each run starts from an empty directory.
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path to the fresh, empty workspace
    /// * `Err(MirrorError::Workspace)` - Any filesystem failure
    pub async fn reset_workspace(&self, hostname: &str) -> Result<PathBuf, MirrorError> {
        validate_hostname(hostname).map_err(|source| MirrorError::Workspace {
            path: self.root.clone(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| MirrorError::Workspace {
                path: self.root.clone(),
                source,
            })?;

        let workspace = self.workspace_path(hostname);
        remove_existing(&workspace)
            .await
            .map_err(|source| MirrorError::Workspace {
                path: workspace.clone(),
                source,
            })?;

        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|source| MirrorError::Workspace {
                path: workspace.clone(),
                source,
            })?;

        debug!(host = hostname, path = %workspace.display(), "Workspace reset");
        Ok(workspace)
    }

    /// Returns the archive path and file name for a run started at `timestamp_ms`
    pub fn archive_path(&self, hostname: &str, timestamp_ms: i64) -> (PathBuf, String) {
        let file_name = format!("{}-{}.{}", hostname, timestamp_ms, ARCHIVE_EXTENSION);
        (self.root.join(&file_name), file_name)
    }

    /// Deletes archive files left in the root by a previous process
    ///
    /// # Returns
    ///
    /// The number of archives removed; a missing root counts as zero.
    pub async fn sweep_stale_archives(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_archive = path
                .extension()
                .is_some_and(|ext| ext == ARCHIVE_EXTENSION);
            if !is_archive || !entry.file_type().await?.is_file() {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale archive"),
            }
        }

        if removed > 0 {
            info!("Removed {} stale archive(s) from {}", removed, self.root.display());
        }
        Ok(removed)
    }
}

/// Removes whatever exists at `path`, tolerating absence
async fn remove_existing(path: &Path) -> io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

/// Rejects hostnames that would escape the mirrors root
fn validate_hostname(hostname: &str) -> io::Result<()> {
    let invalid = hostname.is_empty()
        || hostname == "."
        || hostname == ".."
        || hostname.contains(['/', '\\']);

    if invalid {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("hostname '{}' cannot be used as a directory name", hostname),
        ));
    }
    Ok(())
}
