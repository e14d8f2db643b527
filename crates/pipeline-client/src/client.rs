//! Pipeline API client.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt, TryStreamExt};
use pipeline_streaming::{
    BoxEnvelopeStream, BoxError, EnvelopeStream, OpenFuture, ReconnectingStream, StreamFactory,
};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    ApiError, ClientConfig, ClientError, ReceiveRequest, RetryDecision, RetryPolicy, SendRequest,
    TokenProvider,
};

/// Content type of a send request body.
pub const SEND_CONTENT_TYPE: &str = "application/vnd.pipe.json.v1+json";

/// Body of an open receive connection.
pub type ReceiveBody = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Client for the Pipeline API.
///
/// Cheap to clone; clones share the HTTP connection pool and the token
/// provider.
#[derive(Clone)]
pub struct PipelineClient {
    http: reqwest::Client,
    base_url: Url,
    group: String,
    timeout: Duration,
    retry: RetryPolicy,
    tokens: Arc<dyn TokenProvider>,
}

impl fmt::Debug for PipelineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineClient")
            .field("base_url", &self.base_url.as_str())
            .field("group", &self.group)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PipelineClient {
    /// Create a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig, tokens: impl TokenProvider) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Self::with_http_client(config, tokens, http)
    }

    /// Create a client on top of an existing HTTP client.
    ///
    /// The HTTP client must not set a total request timeout: receive
    /// connections stay open indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_http_client(
        config: ClientConfig,
        tokens: impl TokenProvider,
        http: reqwest::Client,
    ) -> Result<Self, ClientError> {
        let base_url = config.validate()?;
        Ok(Self {
            http,
            base_url,
            group: config.group,
            timeout: config.timeout,
            retry: config.retry.policy(),
            tokens: Arc::new(tokens),
        })
    }

    /// Consumer group of this client.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Base URL of the Pipeline API.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Receive
    // ─────────────────────────────────────────────────────────────────────────────

    /// Consume `topic` until `token` is cancelled.
    ///
    /// Connection failures, decode errors and missed heartbeats are reported
    /// in-band and followed by a reconnection after the request's delay.
    #[instrument(skip(self, token, request), fields(group = %self.group))]
    pub fn receive(
        &self,
        token: &CancellationToken,
        topic: &str,
        request: ReceiveRequest,
    ) -> ReconnectingStream {
        let delay = request.effective_reconnect_delay();
        let factory = ReceiveFactory {
            client: self.clone(),
            topic: topic.to_string(),
            ping_timeout: request.effective_ping_timeout(),
            request,
        };
        info!(delay_ms = delay.as_millis(), "Starting receive");
        ReconnectingStream::spawn(token, factory, delay)
    }

    /// Open one receive connection and return its body.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is available, the request fails, or the
    /// server does not answer `200 OK`.
    #[instrument(skip(self, request), fields(group = %self.group))]
    pub async fn open_receive(
        &self,
        topic: &str,
        request: &ReceiveRequest,
    ) -> Result<ReceiveBody, ClientError> {
        let url = self.receive_url(topic, request)?;
        let authorization = self.authorization().await?;

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(api_error(response).await);
        }

        debug!("Receive connection open");
        let body = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(StreamReader::new(body))
    }

    pub(crate) fn receive_url(
        &self,
        topic: &str,
        request: &ReceiveRequest,
    ) -> Result<Url, ClientError> {
        let mut url = self.endpoint(&["pipeline", "topics", topic, "messages"])?;
        url.query_pairs_mut()
            .extend_pairs(request.query(&self.group));
        Ok(url)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────────

    /// Record `marker`, taken from a `SYNC` envelope, as the consumer group's
    /// read position.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or immediately for
    /// errors that are not transient.
    #[instrument(skip(self), fields(group = %self.group))]
    pub async fn sync(&self, marker: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["pipeline", "consumers", &self.group, "sync"])?;
        self.retrying("sync", || self.sync_once(&url, marker))
            .await?;
        debug!("Sync marker recorded");
        Ok(())
    }

    async fn sync_once(&self, url: &Url, marker: &str) -> Result<(), ClientError> {
        let authorization = self.authorization().await?;
        let response = self
            .http
            .post(url.clone())
            .timeout(self.timeout)
            .header(AUTHORIZATION, authorization)
            .body(marker.to_string())
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Send
    // ─────────────────────────────────────────────────────────────────────────────

    /// Publish messages to `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded, or the last error
    /// once retries are exhausted.
    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    pub async fn send(&self, topic: &str, request: &SendRequest) -> Result<(), ClientError> {
        let url = self.endpoint(&["pipeline", "topics", topic, "messages"])?;
        let body = Bytes::from(serde_json::to_vec(request).map_err(ClientError::Encode)?);
        self.retrying("send", || self.send_once(&url, body.clone()))
            .await?;
        debug!("Messages sent");
        Ok(())
    }

    async fn send_once(&self, url: &Url, body: Bytes) -> Result<(), ClientError> {
        let authorization = self.authorization().await?;
        let response = self
            .http
            .post(url.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, SEND_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────────

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidConfig(format!(
                    "malformed URL: {} cannot be a base",
                    self.base_url
                ))
            })?
            .clear()
            .extend(segments);
        Ok(url)
    }

    async fn authorization(&self) -> Result<String, ClientError> {
        let token = self.tokens.token().await.map_err(ClientError::Token)?;
        Ok(format!("Bearer {token}"))
    }

    async fn retrying<F, Fut>(&self, operation: &'static str, attempt_once: F) -> Result<(), ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        let mut attempt = 1;
        loop {
            let Err(err) = attempt_once().await else {
                return Ok(());
            };
            match self.retry.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::DoNotRetry => return Err(err),
            }
        }
    }
}

/// Opens receive connections for a [`ReconnectingStream`].
struct ReceiveFactory {
    client: PipelineClient,
    topic: String,
    request: ReceiveRequest,
    ping_timeout: Duration,
}

impl StreamFactory for ReceiveFactory {
    fn open(&self, token: CancellationToken) -> OpenFuture {
        let client = self.client.clone();
        let topic = self.topic.clone();
        let request = self.request.clone();
        let ping_timeout = self.ping_timeout;
        open_epoch(client, topic, request, ping_timeout, token).boxed()
    }
}

async fn open_epoch(
    client: PipelineClient,
    topic: String,
    request: ReceiveRequest,
    ping_timeout: Duration,
    token: CancellationToken,
) -> Result<BoxEnvelopeStream, BoxError> {
    let body = client.open_receive(&topic, &request).await?;
    Ok(EnvelopeStream::spawn(&token, body, ping_timeout).boxed())
}

async fn expect_status(response: reqwest::Response, expected: StatusCode) -> Result<(), ClientError> {
    if response.status() == expected {
        return Ok(());
    }
    Err(api_error(response).await)
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    match response.bytes().await {
        Ok(body) => ApiError::from_response(status, &body, retry_after).into(),
        Err(e) => e.into(),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
