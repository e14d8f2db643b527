//! `pipeline receive` command implementation.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use pipeline_client::{Envelope, EnvelopeType, PipelineClient, ReceiveRequest, Reset};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Arguments for the `pipeline receive` command.
#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Topic to consume.
    #[arg(long, short = 't')]
    pub topic: String,

    /// Only receive messages for this organization. Repeatable.
    #[arg(long)]
    pub org: Vec<String>,

    /// Only receive messages from this source. Repeatable.
    #[arg(long)]
    pub source: Vec<String>,

    /// Ask for SYNC envelopes every N seconds (at least 5).
    #[arg(long, value_name = "SECS")]
    pub sync_interval: Option<u64>,

    /// Where to start reading: earliest or latest.
    #[arg(long)]
    pub reset: Option<Reset>,

    /// Longest gap between two heartbeats before reconnecting.
    #[arg(long, value_name = "SECS", default_value_t = 90)]
    pub ping_timeout: u64,

    /// Wait between two connection attempts.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub reconnect_delay: u64,

    /// Record each SYNC marker as the group's read position.
    #[arg(long, default_value_t = false)]
    pub auto_sync: bool,

    /// Stop after this many messages.
    #[arg(long)]
    pub limit: Option<u64>,
}

impl ReceiveArgs {
    fn request(&self) -> ReceiveRequest {
        let mut request = ReceiveRequest::default()
            .with_organizations(self.org.iter().cloned())
            .with_sources(self.source.iter().cloned())
            .with_ping_timeout(Duration::from_secs(self.ping_timeout))
            .with_reconnect_delay(Duration::from_secs(self.reconnect_delay));
        if let Some(secs) = self.sync_interval {
            request = request.with_sync_interval(Duration::from_secs(secs));
        }
        if let Some(reset) = self.reset {
            request = request.with_reset(reset);
        }
        request
    }
}

/// Run the receive command until interrupted or the limit is reached.
pub async fn run(client: &PipelineClient, args: &ReceiveArgs) -> Result<()> {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing feed");
            interrupt.cancel();
        }
    });

    let mut feed = client.receive(&token, &args.topic, args.request());
    let mut received = 0_u64;

    while let Some(unit) = feed.recv().await {
        let envelope = match unit {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Feed error, reconnecting");
                continue;
            }
        };

        if handle(client, args, envelope).await? {
            received += 1;
            if args.limit.is_some_and(|limit| received >= limit) {
                info!(received, "Limit reached");
                token.cancel();
            }
        }
    }

    Ok(())
}

/// Returns whether the envelope carried a message.
async fn handle(client: &PipelineClient, args: &ReceiveArgs, envelope: Envelope) -> Result<bool> {
    match envelope.envelope_type {
        EnvelopeType::Data => {
            let line = serde_json::to_string(&envelope.message).context("encode message")?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{line}").context("write message")?;
            return Ok(true);
        }
        EnvelopeType::Sync if args.auto_sync => {
            if let Err(e) = client.sync(&envelope.sync_marker).await {
                warn!(error = %e, marker = %envelope.sync_marker, "Sync failed");
            }
        }
        EnvelopeType::Sync => debug!(marker = %envelope.sync_marker, "Sync marker"),
        EnvelopeType::Ping => debug!("Heartbeat"),
        EnvelopeType::EndOfStream => info!("Server closing connection"),
        EnvelopeType::Other(other) => debug!(envelope_type = %other, "Ignoring envelope"),
    }
    Ok(false)
}
