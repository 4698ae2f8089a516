use crate::config::types::{Config, CrawlerConfig, MirrorConfig, RemoteStoreConfig, ServerConfig};
use crate::{ConfigError, ConfigResult};
use std::net::SocketAddr;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_mirror_config(&config.mirror)?;
    validate_crawler_config(&config.crawler)?;
    validate_remote_store_config(&config.remote_store)?;
    Ok(())
}

/// Validates server configuration
fn validate_server_config(config: &ServerConfig) -> ConfigResult<()> {
    config.bind_address.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!(
            "bind_address '{}' is not a socket address: {}",
            config.bind_address, e
        ))
    })?;

    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "api_key cannot be empty (set server.api-key or SECRET_TOKEN)".to_string(),
        ));
    }

    Ok(())
}

/// Validates mirror storage configuration
fn validate_mirror_config(config: &MirrorConfig) -> ConfigResult<()> {
    if config.storage_dir.is_empty() {
        return Err(ConfigError::Validation(
            "storage_dir cannot be empty".to_string(),
        ));
    }

    validate_wait_time(config.default_wait_time)?;

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl tool configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    if config.program.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler program cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates remote store configuration
fn validate_remote_store_config(config: &RemoteStoreConfig) -> ConfigResult<()> {
    if config.sync_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "sync_timeout_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_wait_time(wait_time: f64) -> ConfigResult<()> {
    if !wait_time.is_finite() || wait_time < 0.0 {
        return Err(ConfigError::Validation(format!(
            "default_wait_time must be a non-negative number of seconds, got {}",
            wait_time
        )));
    }
    Ok(())
}
