//! Pipeline wire types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Envelope type.
///
/// Four values carry meaning for the streaming engine. Any other value is
/// preserved verbatim so newer server envelope types pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvelopeType {
    /// A message published on the topic.
    Data,
    /// A read position marker to hand back through Sync.
    Sync,
    /// Heartbeat proving the connection is alive.
    Ping,
    /// The server is about to close the connection.
    EndOfStream,
    /// Any other envelope type.
    Other(String),
}

impl EnvelopeType {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Data => "DATA",
            Self::Sync => "SYNC",
            Self::Ping => "PING",
            Self::EndOfStream => "END_OF_STREAM",
            Self::Other(s) => s,
        }
    }
}

impl Default for EnvelopeType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for EnvelopeType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DATA" => Self::Data,
            "SYNC" => Self::Sync,
            "PING" => Self::Ping,
            "END_OF_STREAM" => Self::EndOfStream,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EnvelopeType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EnvelopeType> for String {
    fn from(value: EnvelopeType) -> Self {
        match value {
            EnvelopeType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message published by a client or received through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Organization owning the data. Required when publishing to a routed topic.
    #[serde(rename = "imsOrg", default, skip_serializing_if = "String::is_empty")]
    pub ims_org: String,

    /// Partitioning/ordering key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    /// Pipeline instances the message is routed to or came from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,

    /// Service that generated the message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    /// The payload.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Message {
    /// Create a message carrying a JSON value.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Set the organization.
    #[must_use]
    pub fn with_ims_org(mut self, ims_org: impl Into<String>) -> Self {
        self.ims_org = ims_org.into();
        self
    }

    /// Set the partitioning key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the routing locations.
    #[must_use]
    pub fn with_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Set the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// One unit of the feed.
///
/// Partition, offset, topic, create time and message are only meaningful for
/// `DATA` envelopes; the sync marker only for `SYNC` envelopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Envelope type.
    #[serde(default)]
    pub envelope_type: EnvelopeType,

    /// Kafka partition the message came from.
    #[serde(default)]
    pub partition: i64,

    /// Key used for partition assignment.
    #[serde(default)]
    pub key: String,

    /// Kafka offset of the message.
    #[serde(default)]
    pub offset: i64,

    /// Kafka topic of the message.
    #[serde(default)]
    pub topic: String,

    /// Time (UTC, epoch millis) the message was placed on the consumer's stream.
    #[serde(default)]
    pub create_time: u64,

    /// The message, for `DATA` envelopes.
    #[serde(rename = "pipelineMessage", default)]
    pub message: Message,

    /// Opaque read position, for `SYNC` envelopes.
    #[serde(default)]
    pub sync_marker: String,
}

impl Envelope {
    /// Create an envelope of the given type with every other field empty.
    #[must_use]
    pub fn new(envelope_type: impl Into<EnvelopeType>) -> Self {
        Self {
            envelope_type: envelope_type.into(),
            ..Self::default()
        }
    }

    /// A heartbeat envelope.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(EnvelopeType::Ping)
    }

    /// An end-of-stream envelope.
    #[must_use]
    pub fn end_of_stream() -> Self {
        Self::new(EnvelopeType::EndOfStream)
    }

    /// A sync envelope carrying the given marker.
    #[must_use]
    pub fn sync(marker: impl Into<String>) -> Self {
        Self {
            sync_marker: marker.into(),
            ..Self::new(EnvelopeType::Sync)
        }
    }

    /// A data envelope carrying the given message.
    #[must_use]
    pub fn data(topic: impl Into<String>, message: Message) -> Self {
        Self {
            topic: topic.into(),
            key: message.key.clone(),
            message,
            ..Self::new(EnvelopeType::Data)
        }
    }

    #[must_use]
    pub fn is_data(&self) -> bool {
        self.envelope_type == EnvelopeType::Data
    }

    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.envelope_type == EnvelopeType::Sync
    }

    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.envelope_type == EnvelopeType::Ping
    }

    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.envelope_type == EnvelopeType::EndOfStream
    }
}
