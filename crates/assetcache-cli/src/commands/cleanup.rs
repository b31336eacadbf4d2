//! Cleanup command - delete every cached manifest and bundle.

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use super::AppContext;

#[derive(ClapArgs, Clone)]
pub struct Args {}

#[instrument(level = "info", name = "cmd::cleanup", skip_all)]
pub async fn execute(ctx: &AppContext, _args: &Args, quiet: bool) -> Result<()> {
    let report = ctx.service.cleanup().await?;
    if !quiet {
        println!(
            "Removed {} file(s) from {}",
            report.removed,
            ctx.service.layout().root().display()
        );
        if report.failed > 0 {
            println!("{} file(s) could not be removed", report.failed);
        }
    }
    Ok(())
}
