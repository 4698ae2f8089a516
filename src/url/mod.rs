//! URL handling module for Site-Mirror
//!
//! This module canonicalizes requested URLs and derives the hostname that keys both the local
//! workspace directory and the remote storage prefix.

mod normalize;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use normalize::normalize_url;

/// A request URL after normalization
///
/// Two requests that normalize to the same `hostname` share a workspace and a remote prefix;
/// the later run replaces the earlier snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTarget {
    /// The normalized URL handed to the crawler
    pub canonical_url: Url,

    /// Host without port, used as directory name and storage prefix
    pub hostname: String,
}

impl NormalizedTarget {
    /// Normalizes `input` and extracts its hostname
    ///
    /// # Examples
    ///
    /// ```
    /// use site_mirror::url::NormalizedTarget;
    ///
    /// let target = NormalizedTarget::parse("https://www.example.framer.website").unwrap();
    /// assert_eq!(target.hostname, "example.framer.website");
    /// assert_eq!(target.canonical_url.as_str(), "https://example.framer.website/");
    /// ```
    pub fn parse(input: &str) -> UrlResult<Self> {
        let canonical_url = normalize_url(input)?;
        let hostname = canonical_url
            .host_str()
            .ok_or(UrlError::MissingHost)?
            .to_string();

        Ok(Self {
            canonical_url,
            hostname,
        })
    }
}
