//! Receive and send requests.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pipeline_streaming::{DEFAULT_PING_TIMEOUT, DEFAULT_RECONNECT_DELAY, Message};
use serde::{Deserialize, Serialize};

use crate::config::duration_millis;

/// Where to start reading when connecting to a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reset {
    /// The earliest marked position still available.
    Earliest,
    /// The latest marked position still available.
    Latest,
}

impl Reset {
    /// Query parameter value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }
}

impl fmt::Display for Reset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            other => Err(format!("unknown reset position '{other}', expected earliest or latest")),
        }
    }
}

/// Parameters of a feed opened with [`PipelineClient::receive`](crate::PipelineClient::receive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    /// Interval at which the server emits `SYNC` envelopes. None disables
    /// them; the server requires at least five seconds.
    #[serde(default, with = "duration_millis::option")]
    pub sync_interval: Option<Duration>,

    /// Only receive messages for these organizations.
    #[serde(default)]
    pub organizations: Vec<String>,

    /// Only receive messages from these sources.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Where to start reading.
    #[serde(default)]
    pub reset: Option<Reset>,

    /// Wait between two connection attempts. Zero means the default.
    #[serde(default = "default_reconnect_delay", with = "duration_millis")]
    pub reconnect_delay: Duration,

    /// Longest allowed gap between two `PING` envelopes. Zero means the
    /// default.
    #[serde(default = "default_ping_timeout", with = "duration_millis")]
    pub ping_timeout: Duration,
}

const fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

const fn default_ping_timeout() -> Duration {
    DEFAULT_PING_TIMEOUT
}

impl Default for ReceiveRequest {
    fn default() -> Self {
        Self {
            sync_interval: None,
            organizations: Vec::new(),
            sources: Vec::new(),
            reset: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

impl ReceiveRequest {
    /// Ask the server for `SYNC` envelopes every `interval`.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Filter by organization.
    #[must_use]
    pub fn with_organizations<I, S>(mut self, organizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.organizations = organizations.into_iter().map(Into::into).collect();
        self
    }

    /// Filter by source.
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the starting position.
    #[must_use]
    pub const fn with_reset(mut self, reset: Reset) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Set the reconnection delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the heartbeat timeout.
    #[must_use]
    pub const fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub(crate) fn effective_ping_timeout(&self) -> Duration {
        non_zero_or(self.ping_timeout, DEFAULT_PING_TIMEOUT)
    }

    pub(crate) fn effective_reconnect_delay(&self) -> Duration {
        non_zero_or(self.reconnect_delay, DEFAULT_RECONNECT_DELAY)
    }

    /// Query parameters for `group`.
    pub(crate) fn query(&self, group: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![("group", group.to_string())];
        if let Some(interval) = self.sync_interval.filter(|i| !i.is_zero()) {
            query.push(("syncInterval", interval.as_millis().to_string()));
        }
        if !self.organizations.is_empty() {
            query.push(("org", self.organizations.join(",")));
        }
        if !self.sources.is_empty() {
            query.push(("source", self.sources.join(",")));
        }
        if let Some(reset) = self.reset {
            query.push(("reset", reset.as_str().to_string()));
        }
        query
    }
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}

/// Messages published with [`PipelineClient::send`](crate::PipelineClient::send).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub messages: Vec<Message>,
}

impl SendRequest {
    /// Create a request publishing `messages`.
    #[must_use]
    pub const fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Add a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_minimal_query() {
        let query = ReceiveRequest::default().query("readers");
        assert_eq!(query, vec![("group", "readers".to_string())]);
    }

    #[test]
    fn test_full_query() {
        let request = ReceiveRequest::default()
            .with_sync_interval(Duration::from_secs(10))
            .with_organizations(["org-a", "org-b"])
            .with_sources(["src"])
            .with_reset(Reset::Earliest);

        let query = request.query("readers");

        assert_eq!(
            query,
            vec![
                ("group", "readers".to_string()),
                ("syncInterval", "10000".to_string()),
                ("org", "org-a,org-b".to_string()),
                ("source", "src".to_string()),
                ("reset", "earliest".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_durations_fall_back_to_defaults() {
        let request = ReceiveRequest::default()
            .with_ping_timeout(Duration::ZERO)
            .with_reconnect_delay(Duration::ZERO);

        assert_eq!(request.effective_ping_timeout(), DEFAULT_PING_TIMEOUT);
        assert_eq!(request.effective_reconnect_delay(), DEFAULT_RECONNECT_DELAY);

        let request = request.with_ping_timeout(Duration::from_secs(3));
        assert_eq!(request.effective_ping_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_receive_request_from_json() {
        let request: ReceiveRequest =
            serde_json::from_str(r#"{"sync_interval": 5000, "reset": "latest"}"#).unwrap();

        assert_eq!(request.sync_interval, Some(Duration::from_secs(5)));
        assert_eq!(request.reset, Some(Reset::Latest));
        assert_eq!(request.ping_timeout, DEFAULT_PING_TIMEOUT);
    }

    #[test]
    fn test_reset_from_str() {
        assert_eq!("latest".parse::<Reset>(), Ok(Reset::Latest));
        assert!("newest".parse::<Reset>().is_err());
    }

    #[test]
    fn test_send_request_wire_format() {
        let request = SendRequest::default().with_message(
            Message::new(json!({"id": 1}))
                .with_key("k")
                .with_ims_org("org"),
        );

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({"messages": [{"imsOrg": "org", "key": "k", "value": {"id": 1}}]})
        );
    }
}
