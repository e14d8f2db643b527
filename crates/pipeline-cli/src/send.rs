//! `pipeline send` command implementation.

use anyhow::{Context, Result};
use clap::Args;
use pipeline_client::{Message, PipelineClient, SendRequest};
use tracing::info;

/// Arguments for the `pipeline send` command.
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Topic to publish to.
    #[arg(long, short = 't')]
    pub topic: String,

    /// Message value, as JSON.
    #[arg(long)]
    pub value: String,

    /// Partitioning key.
    #[arg(long)]
    pub key: Option<String>,

    /// Organization owning the message.
    #[arg(long)]
    pub org: Option<String>,

    /// Service producing the message.
    #[arg(long)]
    pub source: Option<String>,
}

impl SendArgs {
    fn message(&self) -> Result<Message> {
        let value = serde_json::from_str(&self.value).context("--value is not valid JSON")?;
        let mut message = Message::new(value);
        if let Some(key) = &self.key {
            message = message.with_key(key);
        }
        if let Some(org) = &self.org {
            message = message.with_ims_org(org);
        }
        if let Some(source) = &self.source {
            message = message.with_source(source);
        }
        Ok(message)
    }
}

/// Run the send command.
pub async fn run(client: &PipelineClient, args: &SendArgs) -> Result<()> {
    let request = SendRequest::new(vec![args.message()?]);
    client
        .send(&args.topic, &request)
        .await
        .with_context(|| format!("send to {}", args.topic))?;
    info!(topic = %args.topic, "Message sent");
    Ok(())
}
