//! Pipeline Streaming - envelope streaming engine for the Pipeline feed.
//!
//! The feed is a long-lived HTTP response body carrying concatenated JSON
//! envelopes. This crate turns such a body into a stream of typed envelopes:
//!
//! - **Decoding**: [`EnvelopeDecoder`] parses one envelope at a time out of any
//!   [`tokio::io::AsyncRead`].
//! - **Liveness**: [`EnvelopeStream`] fuses the decoder with a heartbeat
//!   watchdog that tears the connection down when `PING` envelopes stop.
//! - **Recovery**: [`ReconnectingStream`] re-opens the feed through a
//!   [`StreamFactory`] after every failure, until cancelled.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use pipeline_streaming::ReconnectingStream;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let mut stream = ReconnectingStream::spawn(&token, factory, Duration::from_secs(5));
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(envelope) => println!("{}", envelope.envelope_type),
//!         Err(e) => eprintln!("error: {e}"),
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod decoder;
mod envelope;
mod error;
mod reconnect;
mod stream;

pub use decoder::*;
pub use envelope::*;
pub use error::*;
pub use reconnect::*;
pub use stream::*;

use std::time::Duration;

/// Default time allowed between two `PING` envelopes.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(90);

/// Default delay between two connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the channels joining the pipeline stages.
///
/// One slot is the closest tokio gets to a rendezvous channel.
pub const STAGE_CHANNEL_CAPACITY: usize = 1;

/// Default read buffer size for the decoder.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
