//! Site-Mirror main entry point
//!
//! This is the command-line interface for the Site-Mirror API server.

use anyhow::Context;
use clap::Parser;
use site_mirror::config::{load_config_from_env, load_config_with_hash, Config};
use site_mirror::server::{build_router, serve, AppState};
use site_mirror::{MirrorPipeline, MirrorRequest};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Site-Mirror: offline website snapshots on demand
///
/// Site-Mirror mirrors a website with wget, returns it as a zip archive, and
/// replicates the mirrored files into S3-compatible storage when configured.
#[derive(Parser, Debug)]
#[command(name = "site-mirror")]
#[command(version)]
#[command(about = "Website mirror and archive API", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults and environment only when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the effective settings without serving
    #[arg(long, conflicts_with = "mirror")]
    check_config: bool,

    /// Mirror one URL without starting the server
    #[arg(long, value_name = "URL")]
    mirror: Option<String>,

    /// Where to write the archive in --mirror mode
    #[arg(long, value_name = "PATH", requires = "mirror")]
    output: Option<PathBuf>,

    /// Link-hop depth in --mirror mode
    #[arg(long, requires = "mirror")]
    max_depth: Option<u32>,

    /// Politeness delay in seconds in --mirror mode
    #[arg(long, requires = "mirror")]
    wait_time: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults and environment");
            load_config_from_env().context("invalid configuration")?
        }
    };

    if cli.check_config {
        handle_check_config(&config);
    } else if let Some(url) = cli.mirror.clone() {
        handle_mirror_once(&config, &cli, url).await?;
    } else {
        handle_serve(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_mirror=info,warn"),
            1 => EnvFilter::new("site_mirror=debug,tower_http=debug,info"),
            2 => EnvFilter::new("site_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --check-config: prints the effective configuration with secrets redacted
fn handle_check_config(config: &Config) {
    println!("=== Site-Mirror Configuration ===\n");

    println!("Server:");
    println!("  Bind address: {}", config.server.bind_address);
    println!("  API key: {}", redact(&config.server.api_key));
    println!(
        "  Allowed origins: {}",
        config.server.allowed_origins.join(", ")
    );

    println!("\nMirror:");
    println!("  Storage directory: {}", config.mirror.storage_dir);
    println!("  Default max depth: {}", config.mirror.default_max_depth);
    println!("  Default wait time: {}s", config.mirror.default_wait_time);
    println!("  User agent: {}", config.mirror.user_agent);

    println!("\nCrawler:");
    println!("  Program: {}", config.crawler.program);
    if !config.crawler.program_args.is_empty() {
        println!("  Program args: {}", config.crawler.program_args.join(" "));
    }
    println!("  Timeout: {}s", config.crawler.timeout_secs);

    println!("\nRemote storage:");
    match config.remote_store.settings() {
        Some(settings) => {
            println!("  Endpoint: {}", settings.endpoint);
            println!("  Bucket: {}", settings.bucket);
            println!("  Region: {}", settings.region);
            println!("  Access key: {}", redact(&settings.access_key));
            println!("  Sync timeout: {}s", settings.sync_timeout.as_secs());
        }
        None => println!("  Disabled (credentials incomplete)"),
    }

    println!("\n✓ Configuration is valid");
    if site_mirror::crawler::locate_program(&config.crawler.program).is_none() {
        println!(
            "⚠ {} was not found on PATH; mirror requests will fail",
            config.crawler.program
        );
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".to_string()
    } else {
        format!("<{} chars>", secret.chars().count())
    }
}

/// Handles --mirror: runs one pipeline invocation and writes the archive to disk
async fn handle_mirror_once(config: &Config, cli: &Cli, url: String) -> anyhow::Result<()> {
    let pipeline = MirrorPipeline::from_config(config);

    let mut request = MirrorRequest::new(url);
    request.max_depth = cli.max_depth;
    request.wait_time = cli.wait_time;

    let artifact = pipeline.run(request).await?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(artifact.file_name()));
    let hostname = artifact.hostname().to_string();

    let bytes = artifact
        .persist_to(&output)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("✓ Archive written to: {} ({} bytes)", output.display(), bytes);

    // Remote sync runs in the background and holds the host until it is done.
    if pipeline.remote().is_configured() {
        tracing::info!("Waiting for remote sync to finish");
        drop(pipeline.host_locks().acquire(&hostname).await);
    }

    Ok(())
}

/// Handles the default mode: serves the HTTP API
async fn handle_serve(config: Config) -> anyhow::Result<()> {
    let pipeline = MirrorPipeline::from_config(&config);

    match pipeline.workspaces().sweep_stale_archives().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!("Swept {} stale archive(s)", removed),
        Err(e) => tracing::warn!("Failed to sweep stale archives: {}", e),
    }

    if site_mirror::crawler::locate_program(&config.crawler.program).is_none() {
        tracing::warn!(
            "{} not found on PATH; mirror requests will fail until it is installed",
            config.crawler.program
        );
    }

    let state = AppState::new(pipeline, &config.server.api_key);
    let router = build_router(state, &config.server.allowed_origins);

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    serve(listener, router).await?;

    tracing::info!("Server stopped");
    Ok(())
}
