//! Version command - resolve the current asset version.

use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use tracing::instrument;

use super::AppContext;

#[derive(ClapArgs, Clone)]
pub struct Args {}

#[instrument(level = "info", name = "cmd::version", skip_all)]
pub async fn execute(ctx: &AppContext, _args: &Args) -> Result<()> {
    if !ctx.resolves_versions {
        bail!("No metadata URL configured (set COMLINK_URL, --metadata-url or [metadata] url)");
    }
    let version = ctx.service.resolve_version(0).await?;
    println!("{version}");
    Ok(())
}
