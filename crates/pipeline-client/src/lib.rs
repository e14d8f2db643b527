//! Pipeline Client - resilient consumer and producer for the Pipeline API.
//!
//! - [`PipelineClient::receive`] opens a long-lived feed on a topic and keeps
//!   it open: heartbeats are supervised and the connection is re-established
//!   after every failure.
//! - [`PipelineClient::sync`] hands a `SYNC` marker back to the server to
//!   record the consumer group's read position.
//! - [`PipelineClient::send`] publishes messages to a topic.
//!
//! Sync and send are retried with exponential backoff when the server or the
//! network fails transiently.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipeline_client::{ClientConfig, PipelineClient, ReceiveRequest, StaticToken};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ClientConfig::new("https://pipeline.example.com", "my-group");
//! let client = PipelineClient::new(config, StaticToken::new(token))?;
//!
//! let token = CancellationToken::new();
//! let mut feed = client.receive(&token, "my-topic", ReceiveRequest::default());
//! while let Some(unit) = feed.recv().await {
//!     match unit {
//!         Ok(envelope) if envelope.is_sync() => client.sync(&envelope.sync_marker).await?,
//!         Ok(envelope) => handle(envelope),
//!         Err(e) => tracing::warn!(error = %e, "Feed error"),
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod request;
mod retry;
mod token;

pub use client::*;
pub use config::*;
pub use error::*;
pub use request::*;
pub use retry::*;
pub use token::*;

pub use pipeline_streaming::{
    ConnectionState, Envelope, EnvelopeOrError, EnvelopeType, Message, ReconnectingStream,
    StreamError,
};
