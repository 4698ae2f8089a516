use serde::Deserialize;
use std::time::Duration;

/// Default user agent presented to mirrored sites
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; FastAPI-Mirror)";

/// Main configuration structure for Site-Mirror
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "remote-store", default)]
    pub remote_store: RemoteStoreConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    #[serde(rename = "bind-address", default = "default_bind_address")]
    pub bind_address: String,

    /// Shared secret expected in the `x-api-key` header
    #[serde(rename = "api-key", default)]
    pub api_key: String,

    /// Origins allowed by CORS; `"*"` allows any origin
    #[serde(rename = "allowed-origins", default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Mirror storage and request defaults
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Root directory holding one workspace per hostname plus transient archives
    #[serde(rename = "storage-dir", default = "default_storage_dir")]
    pub storage_dir: String,

    /// Link-hop depth used when a request omits `max_depth`
    #[serde(rename = "default-max-depth", default = "default_max_depth")]
    pub default_max_depth: u32,

    /// Politeness delay in seconds used when a request omits `wait_time`
    #[serde(rename = "default-wait-time", default = "default_wait_time")]
    pub default_wait_time: f64,

    /// User agent presented to the mirrored site
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// External crawl tool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Program invoked to mirror a site
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the generated crawl flags
    #[serde(rename = "program-args", default)]
    pub program_args: Vec<String>,

    /// Hard wall-clock ceiling for one crawl (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// S3-compatible object store credentials
///
/// Remote sync is enabled only when every field except `region` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStoreConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(rename = "access-key", default)]
    pub access_key: Option<String>,

    #[serde(rename = "secret-key", default)]
    pub secret_key: Option<String>,

    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Ceiling for one whole sync (seconds); the host stays locked until it ends
    #[serde(rename = "sync-timeout-secs", default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
}

/// Fully specified remote store settings, present only when sync is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStoreSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub sync_timeout: Duration,
}

impl RemoteStoreConfig {
    /// Returns the complete settings, or `None` if any credential is missing or empty
    pub fn settings(&self) -> Option<RemoteStoreSettings> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Some(RemoteStoreSettings {
            endpoint: present(&self.endpoint)?,
            access_key: present(&self.access_key)?,
            secret_key: present(&self.secret_key)?,
            bucket: present(&self.bucket)?,
            region: self.region.clone(),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
        })
    }

    /// Returns true if remote sync can run
    pub fn is_configured(&self) -> bool {
        self.settings().is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: String::new(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            default_max_depth: default_max_depth(),
            default_wait_time: default_wait_time(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            bucket: None,
            region: default_region(),
            sync_timeout_secs: default_sync_timeout_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_storage_dir() -> String {
    "mirrors".to_string()
}

fn default_max_depth() -> u32 {
    2
}

fn default_wait_time() -> f64 {
    2.0
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_program() -> String {
    "wget".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_sync_timeout_secs() -> u64 {
    120
}
