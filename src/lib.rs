//! Site-Mirror: offline website snapshots on demand
//!
//! This crate mirrors a website with an external recursive-download tool, packages the result
//! as a zip archive, and replicates the mirrored tree into an S3-compatible object store on a
//! best-effort basis.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod pipeline;
pub mod remote;
pub mod server;
pub mod url;
pub mod workspace;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Caller-facing error type for a mirror run
///
/// Every variant maps to one failed pipeline stage. Remote sync failures have no variant; they
/// are logged by [`remote::RemoteSync`] and never reach the caller.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid URL format. Must start with http:// or https://")]
    InvalidUrl(#[from] UrlError),

    #[error("Failed to prepare mirror directory {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{program} command not found. Server configuration error.")]
    ToolUnavailable { program: String },

    #[error("{program} command timed out")]
    CrawlTimeout { program: String, timeout: Duration },

    #[error("Mirror operation failed: {message}")]
    CrawlExecution { message: String, diagnostics: String },

    #[error("Failed to create zip file: {0}")]
    Archive(#[from] archive::ArchiveError),
}

/// Coarse classification of a [`MirrorError`], used for logging terminal states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorErrorKind {
    InvalidRequest,
    InvalidUrl,
    Workspace,
    ToolUnavailable,
    CrawlTimeout,
    CrawlExecution,
    Archive,
}

impl MirrorError {
    /// Returns the kind of this error
    pub fn kind(&self) -> MirrorErrorKind {
        match self {
            Self::InvalidRequest(_) => MirrorErrorKind::InvalidRequest,
            Self::InvalidUrl(_) => MirrorErrorKind::InvalidUrl,
            Self::Workspace { .. } => MirrorErrorKind::Workspace,
            Self::ToolUnavailable { .. } => MirrorErrorKind::ToolUnavailable,
            Self::CrawlTimeout { .. } => MirrorErrorKind::CrawlTimeout,
            Self::CrawlExecution { .. } => MirrorErrorKind::CrawlExecution,
            Self::Archive(_) => MirrorErrorKind::Archive,
        }
    }

    /// Returns true if the error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::InvalidUrl(_))
    }
}

impl fmt::Display for MirrorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidUrl => "invalid_url",
            Self::Workspace => "workspace",
            Self::ToolUnavailable => "tool_unavailable",
            Self::CrawlTimeout => "crawl_timeout",
            Self::CrawlExecution => "crawl_execution",
            Self::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::{ArchiveArtifact, MirrorPipeline, MirrorRequest, MirrorStage};
pub use crate::url::{normalize_url, NormalizedTarget};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(MirrorError::InvalidRequest("URL is required".to_string()).is_client_error());
        assert!(MirrorError::InvalidUrl(UrlError::MissingHost).is_client_error());
        assert!(!MirrorError::ToolUnavailable {
            program: "wget".to_string()
        }
        .is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = MirrorError::ToolUnavailable {
            program: "wget".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "wget command not found. Server configuration error."
        );

        let err = MirrorError::CrawlTimeout {
            program: "wget".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "wget command timed out");
        assert_eq!(err.kind(), MirrorErrorKind::CrawlTimeout);
        assert_eq!(err.kind().to_string(), "crawl_timeout");
    }
}
