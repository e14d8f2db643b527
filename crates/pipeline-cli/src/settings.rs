//! Connection settings: flags, environment and config file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use pipeline_client::{ClientConfig, PipelineClient, RetryConfig, StaticToken};
use serde::Deserialize;

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Base URL of the Pipeline API.
    #[arg(long, env = "PIPELINE_URL", global = true)]
    pub url: Option<String>,

    /// Consumer group.
    #[arg(long, env = "PIPELINE_GROUP", global = true)]
    pub group: Option<String>,

    /// Bearer token.
    #[arg(long, env = "PIPELINE_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// TOML file with connection settings. Flags take precedence.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, default_value_t = false, global = true)]
    pub json_logs: bool,
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    pipeline_url: Option<String>,
    group: Option<String>,
    /// Seconds.
    timeout: Option<u64>,
    retry: Option<RetryConfig>,
}

impl FileConfig {
    fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("parse config file")
    }
}

/// Build a client from flags, environment and the optional config file.
pub fn build_client(args: &GlobalArgs) -> Result<PipelineClient> {
    let file = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("read config file {}", path.display()))?;
            FileConfig::parse(&contents)?
        }
        None => FileConfig::default(),
    };

    let config = client_config(args, file)?;
    let token = args
        .token
        .clone()
        .context("missing token: set PIPELINE_TOKEN or pass --token")?;

    PipelineClient::new(config, StaticToken::new(token)).context("create client")
}

fn client_config(args: &GlobalArgs, file: FileConfig) -> Result<ClientConfig> {
    let url = args
        .url
        .clone()
        .or(file.pipeline_url)
        .context("missing Pipeline URL: set PIPELINE_URL or pass --url")?;
    let group = args
        .group
        .clone()
        .or(file.group)
        .context("missing group: set PIPELINE_GROUP or pass --group")?;

    let mut config = ClientConfig::new(url, group);
    if let Some(secs) = file.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(retry) = file.retry {
        config = config.with_retry(retry);
    }
    Ok(config)
}
