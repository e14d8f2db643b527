//! Log output on stderr, human-readable or JSON.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(json_logs: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_writer(std::io::stderr);

        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("initialize logging: {e}"))?;
    } else {
        let pretty_layer = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);

        subscriber
            .with(pretty_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("initialize logging: {e}"))?;
    }

    Ok(())
}
