//! Streaming error types.

/// Boxed error used at the stream factory seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors delivered in-band on an envelope stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The payload on a live connection is not a valid envelope.
    #[error("decode envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading from the transport failed.
    #[error("read envelope: {0}")]
    Io(#[from] std::io::Error),

    /// The stream factory could not open a connection.
    #[error("get stream: {0}")]
    Connect(#[source] BoxError),
}

impl StreamError {
    /// Wrap a stream factory failure.
    pub fn connect(err: impl Into<BoxError>) -> Self {
        Self::Connect(err.into())
    }

    /// Whether this error was produced while decoding a connection's payload.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Io(_))
    }

    /// Whether this error was produced while opening a connection.
    #[must_use]
    pub const fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

/// One unit delivered downstream: an envelope or an in-band error.
pub type EnvelopeOrError = Result<crate::Envelope, StreamError>;
