//! Crawler module for producing an offline copy of a site
//!
//! The pipeline only sees the [`Crawler`] capability. The production implementation,
//! [`WgetCrawler`], supervises an external recursive-download tool:
//! - Verifying the tool is installed before running it
//! - Passing depth, politeness delay, and user agent
//! - Enforcing a hard wall-clock ceiling and killing the tool when it fires

mod supervisor;

pub use supervisor::{locate_program, WgetCrawler};

use crate::MirrorError;
use async_trait::async_trait;
use std::path::Path;
use url::Url;

/// Caller-tunable crawl parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOptions {
    /// Maximum number of link hops from the target URL
    pub max_depth: u32,

    /// Politeness delay between fetches (seconds)
    pub wait_time: f64,

    /// User agent presented to the site
    pub user_agent: String,
}

/// Output of a successful crawl
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    /// Whatever the crawler logged; for observability only
    pub log: String,
}

/// Fetches a bounded, offline-navigable copy of a site into a workspace
///
/// Implementations write every page and asset directly under `workspace`, with links
/// rewritten so the tree can be browsed without network access.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &str;

    /// Mirrors `target` into `workspace`
    ///
    /// # Errors
    ///
    /// * `MirrorError::ToolUnavailable` - The crawler cannot run in this environment
    /// * `MirrorError::CrawlTimeout` - The crawl exceeded its wall-clock ceiling
    /// * `MirrorError::CrawlExecution` - The crawl ran and failed
    async fn crawl(
        &self,
        target: &Url,
        workspace: &Path,
        options: &CrawlOptions,
    ) -> Result<CrawlOutput, MirrorError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// What [`FakeCrawler`] does when called
    #[derive(Debug, Clone, Copy)]
    pub enum Behavior {
        /// Writes `index.html` and `assets/site.css`
        WriteSite,
        /// Writes tens of megabytes of poorly compressible pages
        WriteLarge,
        /// Leaves a partial page behind and reports a timeout
        Timeout,
        Missing,
    }

    /// In-process crawler that records its calls
    pub struct FakeCrawler {
        behavior: Behavior,
        calls: Mutex<Vec<(Url, CrawlOptions)>>,
    }

    impl FakeCrawler {
        pub fn new(behavior: Behavior) -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                behavior,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> Vec<(Url, CrawlOptions)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Crawler for FakeCrawler {
        fn name(&self) -> &str {
            "fake"
        }

        async fn crawl(
            &self,
            target: &Url,
            workspace: &Path,
            options: &CrawlOptions,
        ) -> Result<CrawlOutput, MirrorError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), options.clone()));

            match self.behavior {
                Behavior::WriteSite => {
                    std::fs::create_dir_all(workspace.join("assets")).unwrap();
                    std::fs::write(workspace.join("index.html"), "<html>home</html>").unwrap();
                    std::fs::write(workspace.join("assets/site.css"), "body{}").unwrap();
                    Ok(CrawlOutput {
                        log: "fetched 2 files".to_string(),
                    })
                }
                Behavior::WriteLarge => {
                    let pages = workspace.join("pages");
                    std::fs::create_dir_all(&pages).unwrap();
                    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
                    for page in 0..64 {
                        let body: Vec<u8> = (0..512 * 1024)
                            .map(|_| {
                                seed = seed
                                    .wrapping_mul(6_364_136_223_846_793_005)
                                    .wrapping_add(1_442_695_040_888_963_407);
                                (seed >> 56) as u8
                            })
                            .collect();
                        std::fs::write(pages.join(format!("page{}.html", page)), body).unwrap();
                    }
                    Ok(CrawlOutput::default())
                }
                Behavior::Timeout => {
                    std::fs::write(workspace.join("partial.html"), "<html>").unwrap();
                    Err(MirrorError::CrawlTimeout {
                        program: "fake".to_string(),
                        timeout: Duration::from_secs(30),
                    })
                }
                Behavior::Missing => Err(MirrorError::ToolUnavailable {
                    program: "fake".to_string(),
                }),
            }
        }
    }
}
