//! Diff command - names added or changed between two manifest versions.
//!
//! # Examples
//!
//! ```bash
//! # Everything new or changed in 3520 relative to 3512
//! assetcache diff 3520 3512
//!
//! # Only changed audio packages
//! assetcache diff 3520 3512 --mode changed --prefix audio
//! ```

use anyhow::Result;
use assetcache_core::{DiffMode, Platform};
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use super::AppContext;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Newer content version (0 = current, needs a metadata URL)
    #[arg(id = "content_version", value_name = "VERSION")]
    pub version: u64,

    /// Older content version to compare against
    pub diff_version: u64,

    /// Which names to report (all, new, changed or 0-2)
    #[arg(short, long, default_value = "all")]
    pub mode: DiffMode,

    /// Only compare assets whose name starts with `<PREFIX>_`
    #[arg(long)]
    pub prefix: Option<String>,

    /// Target platform (windows, android, ios or 0-2)
    #[arg(short, long, default_value = "windows")]
    pub platform: Platform,

    /// Ignore cached manifests and download them again
    #[arg(short, long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct DiffOutput<'a> {
    version: u64,
    diff_version: u64,
    mode: DiffMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
    assets: &'a [String],
}

#[instrument(level = "info", name = "cmd::diff", skip_all, fields(version = args.version, diff_version = args.diff_version))]
pub async fn execute(ctx: &AppContext, args: &Args) -> Result<()> {
    let version = ctx.service.resolve_version(args.version).await?;
    let assets = ctx
        .service
        .get_list_diff(
            version,
            args.diff_version,
            args.force,
            args.mode,
            args.prefix.as_deref(),
            args.platform,
        )
        .await?;

    if args.json {
        let output = DiffOutput {
            version,
            diff_version: args.diff_version,
            mode: args.mode,
            prefix: args.prefix.as_deref(),
            assets: &assets,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for name in &assets {
            println!("{name}");
        }
    }
    Ok(())
}
