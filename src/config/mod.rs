//! Configuration module for Site-Mirror
//!
//! This module handles loading, parsing, and validating TOML configuration files, and
//! applying the environment overrides used for secrets.
//!
//! # Example
//!
//! ```no_run
//! use site_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mirror.toml")).unwrap();
//! println!("Mirrors stored under: {}", config.mirror.storage_dir);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, MirrorConfig, RemoteStoreConfig, RemoteStoreSettings, ServerConfig,
    DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_from_env, load_config_with_hash, parse_config,
    ENV_API_KEY, ENV_REMOTE_ACCESS_KEY, ENV_REMOTE_BUCKET, ENV_REMOTE_ENDPOINT,
    ENV_REMOTE_SECRET_KEY,
};
