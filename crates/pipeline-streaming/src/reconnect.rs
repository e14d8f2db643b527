//! Reconnecting envelope stream.
//!
//! Re-establishes the feed through a [`StreamFactory`] every time a
//! connection epoch ends, and presents all epochs as one stream.

use std::fmt;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::{BoxError, EnvelopeOrError, STAGE_CHANNEL_CAPACITY, StreamError};

/// Envelope sequence of one connection epoch.
pub type BoxEnvelopeStream = BoxStream<'static, EnvelopeOrError>;

/// Future returned by [`StreamFactory::open`].
pub type OpenFuture = BoxFuture<'static, Result<BoxEnvelopeStream, BoxError>>;

/// Opens one fresh connection and returns its envelope sequence.
///
/// The token passed to `open` is scoped to the epoch: it is cancelled when
/// the epoch ends, so the connection must not outlive it.
pub trait StreamFactory: Send + Sync + 'static {
    /// Open a connection.
    fn open(&self, token: CancellationToken) -> OpenFuture;
}

impl<F> StreamFactory for F
where
    F: Fn(CancellationToken) -> OpenFuture + Send + Sync + 'static,
{
    fn open(&self, token: CancellationToken) -> OpenFuture {
        self(token)
    }
}

/// Supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Waiting for the factory to open a connection.
    Connecting,
    /// Forwarding envelopes from an open connection.
    Streaming,
    /// Waiting before the next connection attempt.
    Delay,
    /// Stopped for good.
    Cancelled,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Delay => "delay",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Long-lived envelope stream that reconnects after every failure.
///
/// Connect failures are delivered in-band as [`StreamError::Connect`];
/// errors from an open connection are delivered by that connection's stream.
/// The stream ends only when the parent token is cancelled. Dropping it
/// stops the supervisor.
#[derive(Debug)]
pub struct ReconnectingStream {
    rx: mpsc::Receiver<EnvelopeOrError>,
    state: watch::Receiver<ConnectionState>,
    _guard: DropGuard,
}

impl ReconnectingStream {
    /// Start supervising connections opened by `factory`.
    ///
    /// `delay` is waited after every epoch, whether it ended with an error
    /// or cleanly.
    pub fn spawn<F>(token: &CancellationToken, factory: F, delay: Duration) -> Self
    where
        F: StreamFactory,
    {
        let token = token.child_token();
        let (tx, rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        tokio::spawn(supervise(token.clone(), factory, delay, tx, state_tx));

        Self {
            rx,
            state: state_rx,
            _guard: token.drop_guard(),
        }
    }

    /// Receive the next unit.
    pub async fn recv(&mut self) -> Option<EnvelopeOrError> {
        self.rx.recv().await
    }

    /// Current supervisor state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to supervisor state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

impl Stream for ReconnectingStream {
    type Item = EnvelopeOrError;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

async fn supervise<F: StreamFactory>(
    token: CancellationToken,
    factory: F,
    delay: Duration,
    output: mpsc::Sender<EnvelopeOrError>,
    state: watch::Sender<ConnectionState>,
) {
    let delay_ms = delay.as_millis();
    let mut epoch: u64 = 0;

    loop {
        epoch += 1;
        state.send_replace(ConnectionState::Connecting);
        debug!(epoch, "Opening stream");

        let epoch_token = token.child_token();
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => break,
            opened = factory.open(epoch_token.clone()) => opened,
        };

        match opened {
            Ok(source) => {
                state.send_replace(ConnectionState::Streaming);
                info!(epoch, "Stream connected");
                if forward(&token, source, &output).await.is_break() {
                    break;
                }
                info!(epoch, "Stream closed");
            }
            Err(err) => {
                warn!(epoch, error = %err, "Failed to open stream");
                let unit = Err(StreamError::Connect(err));
                let sent = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    sent = output.send(unit) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
        }

        // The previous connection is gone before the next one is attempted.
        epoch_token.cancel();
        state.send_replace(ConnectionState::Delay);
        debug!(epoch, delay_ms, "Waiting before reconnection");

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = sleep(delay) => {}
        }
    }

    token.cancel();
    state.send_replace(ConnectionState::Cancelled);
    debug!(epoch, "Reconnecting stream stopped");
}

/// Forward one epoch. Breaks when the supervisor must stop.
async fn forward(
    token: &CancellationToken,
    mut source: BoxEnvelopeStream,
    output: &mpsc::Sender<EnvelopeOrError>,
) -> ControlFlow<()> {
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => return ControlFlow::Break(()),
            next = source.next() => next,
        };

        let Some(unit) = next else {
            return ControlFlow::Continue(());
        };

        tokio::select! {
            biased;
            () = token.cancelled() => return ControlFlow::Break(()),
            sent = output.send(unit) => {
                if sent.is_err() {
                    return ControlFlow::Break(());
                }
            }
        }
    }
}
