//! List command - print the asset names of a manifest.
//!
//! # Examples
//!
//! ```bash
//! # Names of version 3512 (windows)
//! assetcache list 3512
//!
//! # Current version on android, as JSON
//! assetcache list 0 --platform android --json | jq '.assets[]'
//! ```

use anyhow::Result;
use assetcache_core::Platform;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use super::AppContext;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Content version (0 = current, needs a metadata URL)
    #[arg(id = "content_version", value_name = "VERSION")]
    pub version: u64,

    /// Target platform (windows, android, ios or 0-2)
    #[arg(short, long, default_value = "windows")]
    pub platform: Platform,

    /// Ignore the cached manifest and download it again
    #[arg(short, long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    version: u64,
    platform: Platform,
    assets: &'a [String],
}

#[instrument(level = "info", name = "cmd::list", skip_all, fields(version = args.version))]
pub async fn execute(ctx: &AppContext, args: &Args) -> Result<()> {
    let version = ctx.service.resolve_version(args.version).await?;
    let assets = ctx
        .service
        .get_asset_list(version, args.force, args.platform)
        .await?;

    if args.json {
        let output = ListOutput {
            version,
            platform: args.platform,
            assets: &assets,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for name in &assets {
            println!("{name}");
        }
    }

    // Let the background cache write finish before the runtime goes away
    ctx.service.manifests().flush(version, args.platform).await;
    Ok(())
}
