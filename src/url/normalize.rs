use crate::{UrlError, UrlResult};
use url::Url;

/// Host label stripped during normalization
const WWW_PREFIX: &str = "www.";

/// Normalizes a URL so repeated requests for the same site share a storage key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if it is not absolute
/// 2. Reject any scheme other than `http` and `https`
/// 3. Strip exactly one leading `www.` label from the host
///
/// Everything else (scheme, port, path, query, fragment) is kept as parsed.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use site_mirror::url::normalize_url;
///
/// let url = normalize_url("https://www.example.framer.website/about?x=1").unwrap();
/// assert_eq!(url.as_str(), "https://example.framer.website/about?x=1");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_string();

    if let Some(stripped) = strip_www(&host) {
        url.set_host(Some(stripped))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    }

    Ok(url)
}

/// Returns the host without its leading `www.` label, if it has one
///
/// A bare `www.` host is left alone rather than normalized to an empty host.
fn strip_www(host: &str) -> Option<&str> {
    host.strip_prefix(WWW_PREFIX).filter(|rest| !rest.is_empty())
}
