//! Mirror pipeline orchestration
//!
//! One run walks a fixed sequence of stages:
//! validate, normalize, reset the workspace, crawl, archive, then hand the workspace to remote
//! sync in the background. Any failure before the archive is complete ends the run; remote sync
//! failures are only logged.

use crate::archive::{self, ArchiveSummary, CancelFlag};
use crate::config::{Config, MirrorConfig};
use crate::crawler::{CrawlOptions, Crawler, WgetCrawler};
use crate::remote::RemoteSync;
use crate::url::NormalizedTarget;
use crate::workspace::{HostLocks, HostRunGuard, WorkspaceManager};
use crate::{MirrorError, Result};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Body of a mirror request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MirrorRequest {
    #[serde(default)]
    pub url: Option<String>,

    /// Link-hop depth; the configured default when absent
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Politeness delay in seconds; the configured default when absent
    #[serde(default)]
    pub wait_time: Option<f64>,
}

impl MirrorRequest {
    /// Creates a request for `url` using default depth and delay
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_wait_time(mut self, wait_time: f64) -> Self {
        self.wait_time = Some(wait_time);
        self
    }
}

/// Stages a run passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorStage {
    Validating,
    Normalizing,
    ResettingWorkspace,
    Crawling,
    Archiving,
    SyncingRemote,
    Responding,
    CleaningUp,
}

impl fmt::Display for MirrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Normalizing => "normalizing",
            Self::ResettingWorkspace => "resetting_workspace",
            Self::Crawling => "crawling",
            Self::Archiving => "archiving",
            Self::SyncingRemote => "syncing_remote",
            Self::Responding => "responding",
            Self::CleaningUp => "cleaning_up",
        };
        f.write_str(name)
    }
}

/// A finished archive waiting to be delivered
///
/// The file is deleted when the artifact is dropped, so every delivery path cleans up. The
/// artifact exists from the moment archiving starts; dropping it mid-archive cancels the job.
#[derive(Debug)]
pub struct ArchiveArtifact {
    path: PathBuf,
    file_name: String,
    hostname: String,
    summary: ArchiveSummary,
    cancel: CancelFlag,
}

impl ArchiveArtifact {
    /// Path of the archive on local storage
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `{hostname}-{unix_timestamp_ms}.zip`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn summary(&self) -> ArchiveSummary {
        self.summary
    }

    /// Reads the whole archive into memory and deletes the file
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Copies the archive to `destination` and deletes the original
    ///
    /// # Returns
    ///
    /// The number of bytes written to `destination`.
    pub async fn persist_to(self, destination: &Path) -> io::Result<u64> {
        tokio::fs::copy(&self.path, destination).await
    }
}

impl Drop for ArchiveArtifact {
    fn drop(&mut self) {
        self.cancel.cancel();
        debug!(stage = %MirrorStage::CleaningUp, path = %self.path.display(), "Removing archive");
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove archive"),
        }
    }
}

/// Sequences normalization, workspace reset, crawl, archive, and remote sync
#[derive(Clone)]
pub struct MirrorPipeline {
    workspaces: WorkspaceManager,
    crawler: Arc<dyn Crawler>,
    remote: RemoteSync,
    locks: HostLocks,
    defaults: MirrorConfig,
}

impl fmt::Debug for MirrorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorPipeline")
            .field("storage_root", &self.workspaces.root())
            .field("crawler", &self.crawler.name())
            .field("remote", &self.remote)
            .finish()
    }
}

impl MirrorPipeline {
    /// Creates a pipeline from its components
    ///
    /// `defaults` supplies the storage root, user agent, and the values used when a request
    /// omits `max_depth` or `wait_time`.
    pub fn new(crawler: Arc<dyn Crawler>, remote: RemoteSync, defaults: MirrorConfig) -> Self {
        Self {
            workspaces: WorkspaceManager::new(&defaults.storage_dir),
            crawler,
            remote,
            locks: HostLocks::new(),
            defaults,
        }
    }

    /// Builds the production pipeline: wget crawler and S3 sync if configured
    pub fn from_config(config: &Config) -> Self {
        let crawler = Arc::new(WgetCrawler::from_config(&config.crawler));
        let remote = RemoteSync::from_config(&config.remote_store);
        Self::new(crawler, remote, config.mirror.clone())
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Per-host locks; a host is held from workspace reset until its remote sync finishes
    pub fn host_locks(&self) -> &HostLocks {
        &self.locks
    }

    pub fn remote(&self) -> &RemoteSync {
        &self.remote
    }

    /// Runs one mirror request to completion
    ///
    /// Remote sync is started in the background once the archive exists and never affects
    /// the result.
    ///
    /// # Returns
    ///
    /// * `Ok(ArchiveArtifact)` - The archive is on disk and ready to deliver
    /// * `Err(MirrorError)` - The stage that failed; nothing after it ran
    pub async fn run(&self, request: MirrorRequest) -> Result<ArchiveArtifact> {
        let started = Instant::now();
        let mut stage = MirrorStage::Validating;

        let result = self.execute(request, &mut stage).await;

        match &result {
            Ok(artifact) => info!(
                host = artifact.hostname(),
                file = artifact.file_name(),
                files = artifact.summary().files,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Mirror succeeded"
            ),
            Err(e) if e.is_client_error() => warn!(
                stage = %stage,
                kind = %e.kind(),
                error = %e,
                "Mirror request rejected"
            ),
            Err(e) => error!(
                stage = %stage,
                kind = %e.kind(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Mirror failed"
            ),
        }

        result
    }

    async fn execute(
        &self,
        request: MirrorRequest,
        stage: &mut MirrorStage,
    ) -> Result<ArchiveArtifact> {
        *stage = MirrorStage::Validating;
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| MirrorError::InvalidRequest("URL is required".to_string()))?;
        let options = self.crawl_options(&request)?;

        *stage = MirrorStage::Normalizing;
        let target = NormalizedTarget::parse(url)?;
        info!(
            host = %target.hostname,
            url = %target.canonical_url,
            max_depth = options.max_depth,
            wait_time = options.wait_time,
            "Starting mirror"
        );

        let guard = self.locks.acquire(&target.hostname).await;

        *stage = MirrorStage::ResettingWorkspace;
        let workspace = self.workspaces.reset_workspace(&target.hostname).await?;

        *stage = MirrorStage::Crawling;
        let output = self
            .crawler
            .crawl(&target.canonical_url, &workspace, &options)
            .await?;
        if !output.log.is_empty() {
            debug!(host = %target.hostname, "{} output:\n{}", self.crawler.name(), output.log);
        }

        *stage = MirrorStage::Archiving;
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let (path, file_name) = self.workspaces.archive_path(&target.hostname, timestamp_ms);
        let mut artifact = ArchiveArtifact {
            path,
            file_name,
            hostname: target.hostname,
            summary: ArchiveSummary::default(),
            cancel: CancelFlag::new(),
        };
        artifact.summary = archive::archive_workspace(
            workspace.clone(),
            artifact.path.clone(),
            artifact.cancel.clone(),
        )
        .await?;

        *stage = MirrorStage::SyncingRemote;
        self.spawn_sync(workspace, guard);

        *stage = MirrorStage::Responding;
        Ok(artifact)
    }

    /// Fills request defaults and checks the delay
    fn crawl_options(&self, request: &MirrorRequest) -> Result<CrawlOptions> {
        let wait_time = request.wait_time.unwrap_or(self.defaults.default_wait_time);
        if !wait_time.is_finite() || wait_time < 0.0 {
            return Err(MirrorError::InvalidRequest(
                "wait_time must be a non-negative number".to_string(),
            ));
        }

        Ok(CrawlOptions {
            max_depth: request.max_depth.unwrap_or(self.defaults.default_max_depth),
            wait_time,
            user_agent: self.defaults.user_agent.clone(),
        })
    }

    /// Starts remote sync in the background; the host stays locked until it finishes
    fn spawn_sync(&self, workspace: PathBuf, guard: HostRunGuard) {
        if !self.remote.is_configured() {
            return;
        }

        let remote = self.remote.clone();
        tokio::spawn(async move {
            remote.sync_best_effort(&workspace, guard.hostname()).await;
            drop(guard);
        });
    }
}
