//! Fetch command - download raw asset bundles.
//!
//! Bundles are cached like every other download and then copied to the
//! output directory as `<name>.bundle` / `<name>.wwpkg`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use assetcache_core::Platform;
use assetcache_core::service::parse_asset_names;
use clap::Args as ClapArgs;
use futures::future::try_join_all;
use tracing::{info, instrument};

use super::AppContext;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Content version (0 = current, needs a metadata URL)
    #[arg(id = "content_version", value_name = "VERSION")]
    pub version: u64,

    /// Asset names, separately or comma separated
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,

    /// Target platform (windows, android, ios or 0-2)
    #[arg(short, long, default_value = "windows")]
    pub platform: Platform,

    /// Ignore cached bundles and download them again
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::fetch", skip_all, fields(version = args.version))]
pub async fn execute(ctx: &AppContext, args: &Args, quiet: bool) -> Result<()> {
    let names = parse_asset_names(&args.names.join(","));
    if names.is_empty() {
        bail!("No asset names given");
    }

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("Failed to create output directory: {}", args.out.display()))?;

    let version = ctx.service.resolve_version(args.version).await?;
    let written = try_join_all(names.iter().map(|name| async move {
        let file = ctx
            .service
            .get_asset_bundle(version, name, args.force, args.platform)
            .await
            .with_context(|| format!("Failed to fetch {name}"))?;
        let dest = args.out.join(&file.file_name);
        tokio::fs::write(&dest, &file.content)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        info!(path = %dest.display(), bytes = file.content.len(), "Wrote bundle");
        Ok::<_, anyhow::Error>(dest)
    }))
    .await?;

    if !quiet {
        for path in written {
            println!("{}", path.display());
        }
    }
    Ok(())
}
