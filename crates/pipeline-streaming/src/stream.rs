//! Envelope stream with heartbeat supervision.
//!
//! An [`EnvelopeStream`] is one connection epoch: a decoder task reading the
//! transport, and a watchdog task forwarding its output while enforcing the
//! `PING` deadline.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::Stream;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::{EnvelopeDecoder, EnvelopeOrError, STAGE_CHANNEL_CAPACITY};

/// Stream of envelopes read from a single connection.
///
/// The stream ends after forwarding a decode error or an `END_OF_STREAM`
/// envelope, when the transport ends, when no `PING` envelope has been seen
/// for the heartbeat timeout, or when the parent token is cancelled.
/// Dropping the stream closes the connection.
#[derive(Debug)]
pub struct EnvelopeStream {
    rx: mpsc::Receiver<EnvelopeOrError>,
    _guard: DropGuard,
}

impl EnvelopeStream {
    /// Decode envelopes from `reader` under heartbeat supervision.
    ///
    /// The stream's own token is a child of `token`, so cancelling `token`
    /// tears the connection down.
    pub fn spawn<R>(token: &CancellationToken, reader: R, ping_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let token = token.child_token();
        let decoded = EnvelopeDecoder::new(reader).spawn(token.clone());
        Self::supervise(token, decoded, ping_timeout)
    }

    /// Apply heartbeat supervision to an already decoded sequence.
    pub fn watch(
        token: &CancellationToken,
        input: mpsc::Receiver<EnvelopeOrError>,
        ping_timeout: Duration,
    ) -> Self {
        Self::supervise(token.child_token(), input, ping_timeout)
    }

    fn supervise(
        token: CancellationToken,
        input: mpsc::Receiver<EnvelopeOrError>,
        ping_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tokio::spawn(watch_heartbeats(token.clone(), input, tx, ping_timeout));
        Self {
            rx,
            _guard: token.drop_guard(),
        }
    }

    /// Receive the next unit.
    pub async fn recv(&mut self) -> Option<EnvelopeOrError> {
        self.rx.recv().await
    }
}

impl Stream for EnvelopeStream {
    type Item = EnvelopeOrError;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Forward `input` to `output` until a terminal unit, a missed heartbeat, or
/// cancellation.
///
/// Only `PING` envelopes move the deadline. A unit waiting on a slow consumer
/// is dropped if the deadline passes first.
async fn watch_heartbeats(
    token: CancellationToken,
    mut input: mpsc::Receiver<EnvelopeOrError>,
    output: mpsc::Sender<EnvelopeOrError>,
    ping_timeout: Duration,
) {
    let timeout_ms = ping_timeout.as_millis();
    let deadline = sleep(ping_timeout);
    tokio::pin!(deadline);

    loop {
        let item = tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = &mut deadline => {
                warn!(timeout_ms, "No heartbeat within timeout, closing connection");
                break;
            }
            item = input.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let terminal = match &item {
            Ok(envelope) if envelope.is_ping() => {
                deadline.as_mut().reset(Instant::now() + ping_timeout);
                trace!("Heartbeat received");
                false
            }
            Ok(envelope) => envelope.is_end_of_stream(),
            Err(_) => true,
        };

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = &mut deadline => {
                warn!(timeout_ms, "Heartbeat deadline passed while delivering, closing connection");
                break;
            }
            sent = output.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        if terminal {
            debug!("Terminal unit forwarded, closing connection");
            break;
        }
    }

    // Stops the decoder, which closes the transport.
    token.cancel();
}
