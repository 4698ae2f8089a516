//! Zip packaging of a mirrored workspace
//!
//! Entries are stored relative to the workspace, so the archive root is the site root. The
//! output file is flushed and synced before success is reported; on any failure or cancellation
//! the partial file is removed.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate level used for every entry
const COMPRESSION_LEVEL: i32 = 9;

/// Errors that can occur while packaging a workspace
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("{operation} failed for {}: {source}", path.display())]
    Zip {
        operation: &'static str,
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("archive task failed: {0}")]
    Task(String),

    /// Nobody is waiting for the archive any more
    #[error("archive of {} cancelled", path.display())]
    Cancelled { path: PathBuf },
}

impl ArchiveError {
    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(operation: &'static str, path: &Path, source: zip::result::ZipError) -> Self {
        Self::Zip {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Counts of what went into an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Shared flag telling an in-flight archive job to stop and remove its output
///
/// A blocking job keeps running after the future awaiting it is dropped, so the owner of the
/// output sets this flag instead.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Packages `workspace` into a zip file at `output`
///
/// Runs the blocking archive work on the blocking thread pool. Setting `cancel` stops the job
/// between entries, or discards the finished file, and leaves nothing at `output`.
pub async fn archive_workspace(
    workspace: PathBuf,
    output: PathBuf,
    cancel: CancelFlag,
) -> Result<ArchiveSummary, ArchiveError> {
    tokio::task::spawn_blocking(move || build_archive(&workspace, &output, &cancel))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Packages `workspace` into a zip file at `output`, removing `output` on failure
///
/// # Returns
///
/// * `Ok(ArchiveSummary)` - The archive is complete and synced to disk
/// * `Err(ArchiveError)` - Any I/O or compression failure; no file is left at `output`
pub fn create_archive(workspace: &Path, output: &Path) -> Result<ArchiveSummary, ArchiveError> {
    build_archive(workspace, output, &CancelFlag::new())
}

fn build_archive(
    workspace: &Path,
    output: &Path,
    cancel: &CancelFlag,
) -> Result<ArchiveSummary, ArchiveError> {
    // Checked again after the write: a cancel racing the last entry must not leave a file.
    let result = write_archive(workspace, output, cancel).and_then(|summary| {
        if cancel.is_cancelled() {
            Err(ArchiveError::Cancelled {
                path: output.to_path_buf(),
            })
        } else {
            Ok(summary)
        }
    });

    match result {
        Ok(summary) => {
            info!(
                "Zip archive created: {} ({} files, {} bytes before compression)",
                output.display(),
                summary.files,
                summary.bytes
            );
            Ok(summary)
        }
        Err(e) => {
            remove_partial(output);
            Err(e)
        }
    }
}

fn write_archive(
    workspace: &Path,
    output: &Path,
    cancel: &CancelFlag,
) -> Result<ArchiveSummary, ArchiveError> {
    let file = File::create(output).map_err(|e| ArchiveError::io("create", output, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut summary = ArchiveSummary::default();

    for entry in WalkDir::new(workspace).min_depth(1).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled {
                path: output.to_path_buf(),
            });
        }
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: workspace.to_path_buf(),
            source,
        })?;
        let name = entry_name(workspace, entry.path())?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| ArchiveError::zip("add_directory", entry.path(), e))?;
            summary.directories += 1;
        } else if file_type.is_file() {
            zip.start_file(name, options)
                .map_err(|e| ArchiveError::zip("start_file", entry.path(), e))?;
            let mut source =
                File::open(entry.path()).map_err(|e| ArchiveError::io("open", entry.path(), e))?;
            summary.bytes += io::copy(&mut source, &mut zip)
                .map_err(|e| ArchiveError::io("compress", entry.path(), e))?;
            summary.files += 1;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular entry");
        }
    }

    let writer = zip
        .finish()
        .map_err(|e| ArchiveError::zip("finish", output, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| ArchiveError::io("flush", output, e.into_error()))?;
    file.sync_all()
        .map_err(|e| ArchiveError::io("sync", output, e))?;

    Ok(summary)
}

/// Builds a forward-slash entry name relative to the workspace root
fn entry_name(workspace: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative = path.strip_prefix(workspace).map_err(|_| {
        ArchiveError::io(
            "strip_prefix",
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "entry outside workspace"),
        )
    })?;

    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(name)
}

fn remove_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => debug!(path = %output.display(), "Removed partial archive"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "Failed to remove partial archive"),
    }
}
