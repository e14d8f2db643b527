//! Scripted transports and stream factories.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use pipeline_streaming::{
    BoxEnvelopeStream, BoxError, Envelope, EnvelopeOrError, OpenFuture, StreamFactory,
};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::fixtures;

/// Size of the in-memory pipe between a [`FeedWriter`] and its reader.
pub const TRANSPORT_BUFFER_SIZE: usize = 1024;

/// Server side of an in-memory feed connection.
#[derive(Debug)]
pub struct FeedWriter {
    writer: DuplexStream,
}

/// Create an in-memory connection: the writer plays the server, the reader
/// is handed to the decoder.
#[must_use]
pub fn transport() -> (FeedWriter, DuplexStream) {
    let (writer, reader) = tokio::io::duplex(TRANSPORT_BUFFER_SIZE);
    (FeedWriter { writer }, reader)
}

impl FeedWriter {
    /// Write one envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> io::Result<()> {
        self.send_raw(&fixtures::encode_one(envelope)).await
    }

    /// Write raw bytes.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Whether the reading side has been dropped, probing with whitespace
    /// writes for up to `within`.
    pub async fn wait_closed(&mut self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.writer.write_all(b" ").await.is_err() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

/// Adapt a channel receiver into an epoch stream.
#[must_use]
pub fn channel_stream(rx: mpsc::Receiver<EnvelopeOrError>) -> BoxEnvelopeStream {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|unit| (unit, rx))
    })
    .boxed()
}

/// An epoch stream yielding the given envelopes, then ending.
#[must_use]
pub fn envelope_stream(envelopes: Vec<Envelope>) -> BoxEnvelopeStream {
    futures_util::stream::iter(envelopes.into_iter().map(Ok)).boxed()
}

type Epoch = Result<BoxEnvelopeStream, String>;

/// Stream factory whose connections are scripted by a [`FactoryScript`].
///
/// Each `open` call waits for the script to provide the next epoch, or for
/// the epoch token to be cancelled.
#[derive(Clone)]
pub struct ScriptedFactory {
    epochs: Arc<tokio::sync::Mutex<mpsc::Receiver<Epoch>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

/// Drives a [`ScriptedFactory`].
#[derive(Debug)]
pub struct FactoryScript {
    epochs: mpsc::Sender<Epoch>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

/// Create a scripted factory and the script driving it.
#[must_use]
pub fn scripted_factory() -> (FactoryScript, ScriptedFactory) {
    let (tx, rx) = mpsc::channel(1);
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let script = FactoryScript {
        epochs: tx,
        attempts: Arc::clone(&attempts),
    };
    let factory = ScriptedFactory {
        epochs: Arc::new(tokio::sync::Mutex::new(rx)),
        attempts,
    };
    (script, factory)
}

impl StreamFactory for ScriptedFactory {
    fn open(&self, token: CancellationToken) -> OpenFuture {
        self.attempts
            .lock()
            .expect("attempts lock poisoned")
            .push(Instant::now());

        let epochs = Arc::clone(&self.epochs);
        async move {
            let mut epochs = epochs.lock().await;
            let opened: Result<BoxEnvelopeStream, BoxError> = tokio::select! {
                () = token.cancelled() => Err("open cancelled".into()),
                epoch = epochs.recv() => match epoch {
                    Some(Ok(stream)) => Ok(stream),
                    Some(Err(message)) => Err(message.into()),
                    None => {
                        token.cancelled().await;
                        Err("script finished".into())
                    }
                },
            };
            opened
        }
        .boxed()
    }
}

impl FactoryScript {
    /// Let the next `open` succeed with `stream`.
    pub async fn open_with(&self, stream: BoxEnvelopeStream) {
        self.epochs
            .send(Ok(stream))
            .await
            .expect("factory dropped");
    }

    /// Let the next `open` succeed with a channel-backed stream, returning
    /// the sending side. Dropping the sender ends the epoch.
    pub async fn open_channel(&self) -> mpsc::Sender<EnvelopeOrError> {
        let (tx, rx) = mpsc::channel(1);
        self.open_with(channel_stream(rx)).await;
        tx
    }

    /// Let the next `open` fail with `message`.
    pub async fn fail(&self, message: &str) {
        self.epochs
            .send(Err(message.to_string()))
            .await
            .expect("factory dropped");
    }

    /// Instants at which `open` was called.
    #[must_use]
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().expect("attempts lock poisoned").clone()
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().expect("attempts lock poisoned").len()
    }
}
