//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ClientError, RetryPolicy};

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("pipeline-rs/", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`PipelineClient`](crate::PipelineClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Pipeline API
    pub pipeline_url: String,

    /// Consumer group
    pub group: String,

    /// Connect timeout, and request timeout for sync and send
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// User agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry configuration for sync and send
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

impl ClientConfig {
    /// Create a configuration with default timeout and retries.
    #[must_use]
    pub fn new(pipeline_url: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            pipeline_url: pipeline_url.into(),
            group: group.into(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check the configuration and return the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the URL is malformed or
    /// cannot carry a path, or if the group is empty.
    pub fn validate(&self) -> Result<Url, ClientError> {
        let url = Url::parse(&self.pipeline_url)
            .map_err(|e| ClientError::InvalidConfig(format!("malformed URL: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig(format!(
                "malformed URL: {} cannot be a base",
                self.pipeline_url
            )));
        }
        if self.group.is_empty() {
            return Err(ClientError::InvalidConfig("missing group".into()));
        }
        Ok(url)
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = Option::<u64>::deserialize(deserializer)?;
            Ok(millis.map(Duration::from_millis))
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Maximum random jitter added to each delay in milliseconds
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_max_jitter_ms() -> u64 {
    250
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    /// Disable retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Build the retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}
