//! Mock Pipeline API server.
//!
//! Wraps wiremock with the receive, sync and send endpoints.

use std::time::Duration;

use pipeline_streaming::Envelope;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures;

/// Content type of a send request body.
pub const SEND_CONTENT_TYPE: &str = "application/vnd.pipe.json.v1+json";

/// A mock Pipeline API server.
pub struct MockPipeline {
    server: MockServer,
}

/// Path of the receive and send endpoints for `topic`.
#[must_use]
pub fn messages_path(topic: &str) -> String {
    format!("/pipeline/topics/{topic}/messages")
}

/// Path of the sync endpoint for `group`.
#[must_use]
pub fn sync_path(group: &str) -> String {
    format!("/pipeline/consumers/{group}/sync")
}

impl MockPipeline {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock server.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Underlying wiremock server, for custom mocks.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Receive
    // ─────────────────────────────────────────────────────────────────────────────

    /// Answer every receive request on `topic` with the given envelopes,
    /// concatenated. Each response body ends after the last envelope.
    pub async fn expect_receive(&self, topic: &str, envelopes: &[Envelope]) {
        self.expect_receive_raw(topic, fixtures::encode(envelopes))
            .await;
    }

    /// Answer every receive request on `topic` with a raw body.
    pub async fn expect_receive_raw(&self, topic: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(messages_path(topic)))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&self.server)
            .await;
    }

    /// Answer receive requests on `topic` carrying `name=value` in the query.
    pub async fn expect_receive_with_query(
        &self,
        topic: &str,
        name: &str,
        value: &str,
        envelopes: &[Envelope],
    ) {
        Mock::given(method("GET"))
            .and(path(messages_path(topic)))
            .and(query_param(name, value))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(fixtures::encode(envelopes), "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer the first `times` receive requests on `topic` with the given
    /// envelopes. Takes precedence over mocks mounted without a limit.
    pub async fn expect_receive_times(&self, topic: &str, envelopes: &[Envelope], times: u64) {
        Mock::given(method("GET"))
            .and(path(messages_path(topic)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(fixtures::encode(envelopes), "application/json"),
            )
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Answer receive requests on `topic` after a delay.
    pub async fn expect_receive_delayed(&self, topic: &str, delay: Duration, envelopes: &[Envelope]) {
        Mock::given(method("GET"))
            .and(path(messages_path(topic)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(delay)
                    .set_body_raw(fixtures::encode(envelopes), "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer receive requests on `topic` with an error response.
    pub async fn expect_receive_error(&self, topic: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(messages_path(topic)))
            .respond_with(error_response(status, body))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────────

    /// Accept sync requests for `group` with `204 No Content`.
    pub async fn expect_sync(&self, group: &str) {
        Mock::given(method("POST"))
            .and(path(sync_path(group)))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    /// Accept sync requests for `group` whose body is exactly `marker`.
    pub async fn expect_sync_marker(&self, group: &str, marker: &str) {
        Mock::given(method("POST"))
            .and(path(sync_path(group)))
            .and(body_string(marker))
            .respond_with(ResponseTemplate::new(204))
            .expect(1..)
            .mount(&self.server)
            .await;
    }

    /// Answer sync requests for `group` with an error response.
    pub async fn expect_sync_error(&self, group: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(sync_path(group)))
            .respond_with(error_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Answer the first `times` sync requests for `group` with an error,
    /// taking precedence over mocks mounted without a limit.
    pub async fn expect_sync_error_times(&self, group: &str, status: u16, times: u64) {
        Mock::given(method("POST"))
            .and(path(sync_path(group)))
            .respond_with(error_response(status, fixtures::error_body(status, "Try again")))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Send
    // ─────────────────────────────────────────────────────────────────────────────

    /// Accept send requests on `topic` with `200 OK`.
    pub async fn expect_send(&self, topic: &str) {
        Mock::given(method("POST"))
            .and(path(messages_path(topic)))
            .and(header("content-type", SEND_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Answer send requests on `topic` with an error response.
    pub async fn expect_send_error(&self, topic: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(messages_path(topic)))
            .respond_with(error_response(status, body))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────────

    /// All received requests, in arrival order.
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Received requests whose path is `request_path`.
    pub async fn requests_to(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }

    /// Verify that exactly `expected` requests were received.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await;
        assert_eq!(
            received.len(),
            expected,
            "Expected {} requests but received {}",
            expected,
            received.len()
        );
    }

    /// Verify that at least one request was received on `request_path`.
    ///
    /// # Panics
    ///
    /// Panics if no matching request was found.
    pub async fn assert_received(&self, request_path: &str) {
        let received = self.received_requests().await;
        let found = received.iter().any(|r| r.url.path() == request_path);
        assert!(
            found,
            "No request received to path '{}'. Received: {:?}",
            request_path,
            received.iter().map(|r| r.url.path()).collect::<Vec<_>>()
        );
    }

    /// Verify the mounted mocks' expectations.
    pub async fn verify(&self) {
        self.server.verify().await;
    }
}

fn error_response(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_body_is_concatenated_envelopes() {
        let mock = MockPipeline::start().await;
        let envelopes = [fixtures::ping(), fixtures::end_of_stream()];
        mock.expect_receive("orders", &envelopes).await;

        let response = reqwest::Client::new()
            .get(format!("{}/pipeline/topics/orders/messages", mock.base_url()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.bytes().await.unwrap();
        assert_eq!(body.as_ref(), fixtures::encode(&envelopes).as_slice());
    }

    #[tokio::test]
    async fn test_sync_answers_no_content() {
        let mock = MockPipeline::start().await;
        mock.expect_sync("readers").await;

        let response = reqwest::Client::new()
            .post(format!("{}/pipeline/consumers/readers/sync", mock.base_url()))
            .body("marker-1")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 204);
        mock.assert_received(&sync_path("readers")).await;
    }

    #[tokio::test]
    async fn test_send_error() {
        let mock = MockPipeline::start().await;
        mock.expect_send_error("orders", 403, fixtures::error_body(403, "Forbidden"))
            .await;

        let response = reqwest::Client::new()
            .post(format!("{}/pipeline/topics/orders/messages", mock.base_url()))
            .header("content-type", SEND_CONTENT_TYPE)
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 403);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["title"], "Forbidden");
        mock.assert_request_count(1).await;
    }
}
