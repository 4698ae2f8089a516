use crate::config::types::Config;
use crate::config::validation::validate;
use crate::{ConfigError, ConfigResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `server.api-key`
pub const ENV_API_KEY: &str = "SECRET_TOKEN";
/// Environment variables overriding the `remote-store` table
pub const ENV_REMOTE_ENDPOINT: &str = "R2_ENDPOINT";
pub const ENV_REMOTE_ACCESS_KEY: &str = "R2_ACCESS_KEY";
pub const ENV_REMOTE_SECRET_KEY: &str = "R2_SECRET_KEY";
pub const ENV_REMOTE_BUCKET: &str = "R2_BUCKET";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied after parsing and before validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use site_mirror::config::load_config;
///
/// let config = load_config(Path::new("mirror.toml")).unwrap();
/// println!("Crawl timeout: {}s", config.crawler.timeout_secs);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Builds a configuration from defaults and environment variables only
pub fn load_config_from_env() -> ConfigResult<Config> {
    parse_config("", |key| std::env::var(key).ok())
}

/// Parses TOML content, applies overrides from `lookup`, and validates the result
///
/// `lookup` is called with environment variable names; tests pass a closure over a map.
pub fn parse_config<F>(content: &str, lookup: F) -> ConfigResult<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = toml::from_str(content)?;
    apply_overrides(&mut config, lookup);
    validate(&config)?;
    Ok(config)
}

/// Applies environment overrides to a parsed configuration
fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(ENV_API_KEY) {
        config.server.api_key = token;
    }

    let remote = &mut config.remote_store;
    if let Some(endpoint) = lookup(ENV_REMOTE_ENDPOINT) {
        remote.endpoint = Some(endpoint);
    }
    if let Some(access_key) = lookup(ENV_REMOTE_ACCESS_KEY) {
        remote.access_key = Some(access_key);
    }
    if let Some(secret_key) = lookup(ENV_REMOTE_SECRET_KEY) {
        remote.secret_key = Some(secret_key);
    }
    if let Some(bucket) = lookup(ENV_REMOTE_BUCKET) {
        remote.bucket = Some(bucket);
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is logged at startup to identify which configuration a running server uses.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
