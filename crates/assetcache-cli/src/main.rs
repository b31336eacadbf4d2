#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use assetcache_core::error::{AssetError, CacheError, CodecError, FetchError, ManifestError};
use assetcache_core::fetch::UpstreamFailure;

use crate::commands::{AppContext, cleanup, diff, fetch, list, version};
use crate::config::{Config, Overrides, Settings};

/// Versioned asset cache and manifest diff tool
#[derive(Parser)]
#[command(name = "assetcache")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # List the assets of a version
    assetcache list 3512

    # Names added or changed since an older version, audio only
    assetcache diff 3520 3512 --prefix audio

    # Download raw bundles into ./out
    assetcache fetch 3520 charui_vader,audio_theme --out out

    # Resolve the current version (needs COMLINK_URL)
    assetcache version
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file
    #[arg(long, env = "ASSETCACHE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Cache root directory
    #[arg(long, env = "ASSETCACHE_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// CDN root URL
    #[arg(long, env = "ASSETCACHE_CDN_URL", global = true)]
    cdn_url: Option<String>,

    /// Metadata service URL used to resolve the current version
    #[arg(long, env = "COMLINK_URL", global = true)]
    metadata_url: Option<String>,

    /// Metadata service access key
    #[arg(long, env = "COMLINK_PUBLIC", global = true)]
    access_key: Option<String>,

    /// Metadata service secret key
    #[arg(long, env = "COMLINK_SECRET", hide_env_values = true, global = true)]
    secret_key: Option<String>,

    /// Directory for daily rotated log files
    #[arg(long, env = "ASSETCACHE_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the asset names of a manifest
    List(list::Args),

    /// List names added or changed between two versions
    Diff(diff::Args),

    /// Download raw asset bundles
    Fetch(fetch::Args),

    /// Resolve the current asset version
    Version(version::Args),

    /// Delete every cached file
    Cleanup(cleanup::Args),
}

impl Cli {
    fn overrides(&mut self) -> Overrides {
        Overrides {
            cache_dir: self.cache_dir.take(),
            cdn_url: self.cdn_url.take(),
            metadata_url: self.metadata_url.take(),
            access_key: self.access_key.take(),
            secret_key: self.secret_key.take(),
            log_dir: self.log_dir.take(),
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let mut cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let settings = Settings::resolve(config, cli.overrides());

    let _log_guard = setup_tracing(cli.verbose, cli.quiet, settings.log_dir.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let quiet = cli.quiet;
    let result = runtime.block_on(async move {
        let ctx = AppContext::build(settings)?;
        let result = match &cli.command {
            Commands::List(args) => list::execute(&ctx, args).await,
            Commands::Diff(args) => diff::execute(&ctx, args).await,
            Commands::Fetch(args) => fetch::execute(&ctx, args, quiet).await,
            Commands::Version(args) => version::execute(&ctx, args).await,
            Commands::Cleanup(args) => cleanup::execute(&ctx, args, quiet).await,
        };
        drop(ctx);
        result
    });

    runtime.shutdown_timeout(Duration::from_secs(5));
    result
}

/// Set up tracing: stderr by verbosity (unless quiet), plus an optional
/// daily rotated log file.
fn setup_tracing(verbose: u8, quiet: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let stderr_layer = (!quiet).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_filter(env_filter())
    });

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "assetcache.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(asset_err) = cause.downcast_ref::<AssetError>() {
            return match asset_err {
                AssetError::Fetch(f)
                | AssetError::VersionResolution(f)
                | AssetError::Manifest(ManifestError::Fetch(f)) => categorize_fetch(f),
                AssetError::Manifest(ManifestError::Codec(c)) => categorize_codec(c),
                AssetError::Cache(_) | AssetError::Manifest(ManifestError::Cache(_)) => {
                    exit_code::CACHE_ERROR
                }
                AssetError::Decode { .. } => exit_code::INVALID_RESPONSE,
                AssetError::InvalidAssetName { .. } | AssetError::NoDecoder => {
                    exit_code::USAGE_ERROR
                }
                AssetError::Diff(_) => exit_code::GENERAL_ERROR,
            };
        }

        if let Some(fetch_err) = cause.downcast_ref::<FetchError>() {
            return categorize_fetch(fetch_err);
        }

        if cause.downcast_ref::<CacheError>().is_some() {
            return exit_code::CACHE_ERROR;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::NotFound
        {
            return exit_code::NOT_FOUND;
        }
    }

    exit_code::GENERAL_ERROR
}

fn categorize_fetch(e: &FetchError) -> u8 {
    match e {
        FetchError::Upstream {
            kind: UpstreamFailure::Status(404),
            ..
        } => exit_code::NOT_FOUND,
        FetchError::Upstream { .. } => exit_code::UPSTREAM_FAILED,
        FetchError::InvalidPayload { .. } | FetchError::MalformedResponse { .. } => {
            exit_code::INVALID_RESPONSE
        }
        FetchError::InvalidUrl(_) => exit_code::USAGE_ERROR,
        FetchError::Io(_) => exit_code::CACHE_ERROR,
        FetchError::Client(_) => exit_code::GENERAL_ERROR,
    }
}

fn categorize_codec(e: &CodecError) -> u8 {
    match e {
        CodecError::Decode(_) | CodecError::EmptyRecord { .. } => exit_code::INVALID_RESPONSE,
        CodecError::CacheCorruption { .. } | CodecError::Serialize(_) => exit_code::CACHE_ERROR,
    }
}
