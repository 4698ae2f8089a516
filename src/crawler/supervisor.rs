//! Subprocess supervision for the external crawl tool
//!
//! The tool is raced against a fixed deadline. Losing the race kills the child and waits for
//! it to be reaped, so no orphan keeps writing into a workspace that is about to be archived
//! or reset.

use crate::config::CrawlerConfig;
use crate::crawler::{CrawlOptions, CrawlOutput, Crawler};
use crate::MirrorError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Maximum number of diagnostic characters echoed back in an error message
const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

/// Flags that make wget produce a self-contained offline mirror
const MIRROR_FLAGS: &[&str] = &[
    "--mirror",
    "--convert-links",
    "--adjust-extension",
    "--page-requisites",
    "--no-parent",
    "--no-host-directories",
    "--no-verbose",
];

/// Crawler backed by `wget` (or a compatible program)
#[derive(Debug, Clone)]
pub struct WgetCrawler {
    program: String,
    program_args: Vec<String>,
    timeout: Duration,
}

impl WgetCrawler {
    /// Creates a crawler running `program` with a hard `timeout`
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            program_args: Vec::new(),
            timeout,
        }
    }

    /// Creates a crawler from the `[crawler]` configuration table
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(&config.program, Duration::from_secs(config.timeout_secs))
            .with_program_args(config.program_args.clone())
    }

    /// Arguments inserted before the generated crawl flags
    pub fn with_program_args(mut self, args: Vec<String>) -> Self {
        self.program_args = args;
        self
    }

    /// Builds the crawl flags for one run, target URL last
    pub fn build_args(
        &self,
        target: &Url,
        workspace: &Path,
        options: &CrawlOptions,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = MIRROR_FLAGS.iter().map(OsString::from).collect();
        args.push(format!("--wait={}", options.wait_time).into());
        args.push(format!("--level={}", options.max_depth).into());

        let mut prefix = OsString::from("--directory-prefix=");
        prefix.push(workspace.as_os_str());
        args.push(prefix);

        args.push(format!("--user-agent={}", options.user_agent).into());
        args.push(target.as_str().into());
        args
    }

    fn spawn(&self, program: &Path, args: Vec<OsString>) -> std::io::Result<Child> {
        Command::new(program)
            .args(&self.program_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    fn execution_error(&self, status: ExitStatus, diagnostics: String) -> MirrorError {
        let tail = diagnostic_tail(&diagnostics);
        let message = if tail.is_empty() {
            format!("{} exited with {}", self.program, status)
        } else {
            format!("{} exited with {}\n{}", self.program, status, tail)
        };
        MirrorError::CrawlExecution {
            message,
            diagnostics,
        }
    }
}

#[async_trait]
impl Crawler for WgetCrawler {
    fn name(&self) -> &str {
        &self.program
    }

    async fn crawl(
        &self,
        target: &Url,
        workspace: &Path,
        options: &CrawlOptions,
    ) -> Result<CrawlOutput, MirrorError> {
        let program = locate_program(&self.program).ok_or_else(|| {
            warn!("{} command not found. Please install {}.", self.program, self.program);
            MirrorError::ToolUnavailable {
                program: self.program.clone(),
            }
        })?;

        let args = self.build_args(target, workspace, options);
        info!(
            url = %target,
            depth = options.max_depth,
            wait = options.wait_time,
            "Running mirror with {}",
            program.display()
        );
        debug!(?args, "Crawl arguments");

        let mut child = self
            .spawn(&program, args)
            .map_err(|e| MirrorError::CrawlExecution {
                message: format!("failed to start {}: {}", self.program, e),
                diagnostics: String::new(),
            })?;

        let stdout = child.stdout.take().map(collect_output);
        let stderr = child.stderr.take().map(collect_output);

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                abort_readers([stdout, stderr]);
                return Err(MirrorError::CrawlExecution {
                    message: format!("failed to wait for {}: {}", self.program, e),
                    diagnostics: String::new(),
                });
            }
            Err(_) => {
                warn!(url = %target, timeout = ?self.timeout, "{} command timed out", self.program);
                terminate(&mut child).await;
                abort_readers([stdout, stderr]);
                return Err(MirrorError::CrawlTimeout {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        let stdout = join_output(stdout).await;
        let stderr = join_output(stderr).await;

        if !status.success() {
            warn!(url = %target, %status, "Crawl failed: {}", diagnostic_tail(&stderr));
            return Err(self.execution_error(status, stderr));
        }

        // wget --no-verbose logs to stderr; keep both streams.
        let log = [stdout, stderr]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        debug!(url = %target, "Crawl log:\n{}", log);

        Ok(CrawlOutput { log })
    }
}

/// Resolves `program` to an executable path
///
/// Names containing a path separator are checked directly; bare names are searched on `PATH`.
pub fn locate_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Kills the child and waits for it to exit
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill crawl process");
    }
}

fn collect_output<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read crawl output");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn join_output(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn abort_readers(handles: [Option<JoinHandle<String>>; 2]) {
    for handle in handles.into_iter().flatten() {
        handle.abort();
    }
}

/// Returns the last `DIAGNOSTIC_TAIL_CHARS` characters of trimmed output
fn diagnostic_tail(output: &str) -> &str {
    let trimmed = output.trim();
    let count = trimmed.chars().count();
    if count <= DIAGNOSTIC_TAIL_CHARS {
        return trimmed;
    }
    let skip = count - DIAGNOSTIC_TAIL_CHARS;
    match trimmed.char_indices().nth(skip) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}
