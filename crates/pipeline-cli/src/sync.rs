//! `pipeline sync` command implementation.

use anyhow::{Context, Result};
use clap::Args;
use pipeline_client::PipelineClient;
use tracing::info;

/// Arguments for the `pipeline sync` command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Marker taken from a SYNC envelope.
    #[arg(long, short = 'm')]
    pub marker: String,
}

/// Run the sync command.
pub async fn run(client: &PipelineClient, args: &SyncArgs) -> Result<()> {
    client.sync(&args.marker).await.context("sync")?;
    info!(group = client.group(), "Read position recorded");
    Ok(())
}
