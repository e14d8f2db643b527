//! Envelope decoder.
//!
//! Parses concatenated JSON envelopes out of a byte source. Values need no
//! delimiter; whitespace between them is skipped.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{DEFAULT_BUFFER_SIZE, Envelope, EnvelopeOrError, STAGE_CHANNEL_CAPACITY, StreamError};

/// Incremental envelope decoder over an async byte source.
///
/// The decoder owns its source. It yields envelopes until the source ends
/// cleanly, or until the first failure, after which it yields nothing more.
///
/// A value split over many reads is not re-parsed on every read: the buffer
/// is parsed once the value's closing bracket has been seen, or when it has
/// doubled since the last attempt, so decoding stays linear in its size.
#[derive(Debug)]
pub struct EnvelopeDecoder<R> {
    reader: R,
    buffer: BytesMut,
    framer: Framer,
    parsed_len: usize,
    finished: bool,
}

impl<R> EnvelopeDecoder<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a decoder reading from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            framer: Framer::default(),
            parsed_len: 0,
            finished: false,
        }
    }

    /// Decode the next envelope.
    ///
    /// Returns `None` once the source is exhausted with no partial value
    /// pending, or after an error has been returned.
    pub async fn next_envelope(&mut self) -> Option<EnvelopeOrError> {
        if self.finished {
            return None;
        }

        loop {
            match self.decode_buffered() {
                Decoded::Envelope(envelope) => return Some(Ok(envelope)),
                Decoded::Failed(err) => return Some(self.fail(err)),
                Decoded::Incomplete => {}
            }

            if self.buffer.capacity() - self.buffer.len() < DEFAULT_BUFFER_SIZE / 4 {
                self.buffer.reserve(DEFAULT_BUFFER_SIZE);
            }

            match self.reader.read_buf(&mut self.buffer).await {
                Ok(0) => return self.finish(),
                Ok(n) => trace!(bytes = n, buffered = self.buffer.len(), "Read from transport"),
                Err(e) => return Some(self.fail(StreamError::Io(e))),
            }
        }
    }

    fn decode_buffered(&mut self) -> Decoded {
        let complete = self.framer.value_complete(&self.buffer);
        if !complete && self.buffer.len() < self.parsed_len.saturating_mul(2) {
            return Decoded::Incomplete;
        }
        self.parsed_len = self.buffer.len();

        let (next, consumed) = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Envelope>();
            let next = values.next();
            (next, values.byte_offset())
        };

        match next {
            Some(Ok(envelope)) => {
                self.buffer.advance(consumed);
                self.rescan();
                Decoded::Envelope(envelope)
            }
            Some(Err(e)) if e.is_eof() => Decoded::Incomplete,
            Some(Err(e)) => Decoded::Failed(StreamError::Decode(e)),
            None => {
                // Only whitespace left.
                self.buffer.clear();
                self.rescan();
                Decoded::Incomplete
            }
        }
    }

    fn rescan(&mut self) {
        self.framer = Framer::default();
        self.parsed_len = 0;
    }

    fn finish(&mut self) -> Option<EnvelopeOrError> {
        self.finished = true;
        if self.buffer.is_empty() {
            return None;
        }

        // A partial value is pending at end of input.
        let err = serde_json::from_slice::<Envelope>(&self.buffer).err()?;
        self.buffer.clear();
        Some(Err(StreamError::Decode(err)))
    }

    fn fail(&mut self, err: StreamError) -> EnvelopeOrError {
        self.finished = true;
        self.buffer.clear();
        Err(err)
    }
}

impl<R> EnvelopeDecoder<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Run the decoder as its own task.
    ///
    /// The task stops when the source ends, after forwarding the first error,
    /// when `token` is cancelled, or when the receiver is dropped. The source
    /// is dropped, and the connection closed, whenever the task exits.
    #[must_use]
    pub fn spawn(mut self, token: CancellationToken) -> mpsc::Receiver<EnvelopeOrError> {
        let (tx, rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    next = self.next_envelope() => next,
                };

                let Some(item) = next else {
                    debug!("Transport reached end of input");
                    break;
                };

                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }

            drop(self);
            trace!("Decoder stopped, transport closed");
        });

        rx
    }
}

enum Decoded {
    Envelope(Envelope),
    Incomplete,
    Failed(StreamError),
}

/// Tracks bracket nesting across reads to find where the first buffered
/// value ends, without building it.
#[derive(Debug, Default)]
struct Framer {
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Framer {
    /// Scan bytes appended since the last call.
    ///
    /// Returns `true` once the leading object or array is closed, or as soon
    /// as the leading value is not an object or array at all. Either way the
    /// buffer is worth handing to the parser.
    fn value_complete(&mut self, buffer: &[u8]) -> bool {
        for (i, &byte) in buffer.iter().enumerate().skip(self.scanned) {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b' ' | b'\t' | b'\n' | b'\r' => {}
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.scanned = i + 1;
                        return true;
                    }
                }
                b'"' if self.depth > 0 => self.in_string = true,
                _ if self.depth == 0 => return true,
                _ => {}
            }
        }

        self.scanned = buffer.len();
        false
    }
}
