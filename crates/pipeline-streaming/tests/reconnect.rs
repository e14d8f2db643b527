//! Reconnecting stream behaviour against scripted stream factories.

use std::time::Duration;

use futures_util::StreamExt;
use pipeline_streaming::{ConnectionState, EnvelopeStream, ReconnectingStream, StreamError};
use pipeline_testkit::{FactoryScript, fixtures, init_test_tracing, scripted_factory, transport};
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const PROMPTLY: Duration = Duration::from_secs(2);

async fn wait_for_state(states: &mut watch::Receiver<ConnectionState>, expected: ConnectionState) {
    tokio::time::timeout(PROMPTLY, states.wait_for(|state| *state == expected))
        .await
        .expect("state reached within timeout")
        .expect("supervisor alive");
}

async fn wait_for_attempts(script: &FactoryScript, expected: usize) {
    tokio::time::timeout(PROMPTLY, async {
        while script.attempt_count() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("factory called within timeout");
}

async fn assert_ends(stream: &mut ReconnectingStream) {
    let end = tokio::time::timeout(PROMPTLY, stream.recv())
        .await
        .expect("stream ends within timeout");
    assert!(end.is_none(), "unexpected unit: {end:?}");
}

#[tokio::test]
async fn factory_errors_are_delivered_and_spaced_by_delay() {
    init_test_tracing();

    let delay = Duration::from_millis(100);
    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let mut stream = ReconnectingStream::spawn(&token, factory, delay);

    for reason in ["refused", "unauthorized", "gone"] {
        script.fail(reason).await;
        let err = stream.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Connect(_)));
        assert_eq!(err.to_string(), format!("get stream: {reason}"));
    }

    wait_for_attempts(&script, 4).await;
    let attempts = script.attempts();
    for pair in attempts.windows(2) {
        assert!(pair[1] - pair[0] >= delay, "attempts closer than the delay");
    }

    token.cancel();
    assert_ends(&mut stream).await;
}

#[tokio::test]
async fn epochs_are_delivered_in_order() {
    init_test_tracing();

    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let mut stream = ReconnectingStream::spawn(&token, factory, Duration::from_millis(10));

    let producer = tokio::spawn(async move {
        for epoch in 0..2 {
            let tx = script.open_channel().await;
            for offset in 0..3 {
                let envelope = fixtures::data(&format!("epoch-{epoch}"), offset, json!(offset));
                tx.send(Ok(envelope)).await.unwrap();
            }
        }
        script
    });

    let mut seen = Vec::new();
    for _ in 0..6 {
        let envelope = stream.recv().await.unwrap().unwrap();
        seen.push((envelope.topic, envelope.offset));
    }

    let expected: Vec<(String, i64)> = (0..2)
        .flat_map(|epoch| (0..3).map(move |offset| (format!("epoch-{epoch}"), offset)))
        .collect();
    assert_eq!(seen, expected);

    let script = producer.await.unwrap();
    wait_for_attempts(&script, 3).await;
    token.cancel();
    assert_ends(&mut stream).await;
}

#[tokio::test]
async fn epoch_errors_pass_through_and_reconnect() {
    init_test_tracing();

    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let mut stream = ReconnectingStream::spawn(&token, factory, Duration::from_millis(10));

    let (mut writer, reader) = transport();
    let epoch = EnvelopeStream::spawn(&CancellationToken::new(), reader, Duration::from_secs(60));
    script.open_with(epoch.boxed()).await;
    writer.send_raw(b"{oops").await.unwrap();

    let err = stream.recv().await.unwrap().unwrap_err();
    assert!(err.is_decode());
    assert!(writer.wait_closed(PROMPTLY).await);

    script
        .open_with(pipeline_testkit::envelope_stream(vec![fixtures::sync("after")]))
        .await;
    assert_eq!(stream.recv().await.unwrap().unwrap().sync_marker, "after");

    token.cancel();
    assert_ends(&mut stream).await;
}

#[tokio::test]
async fn cancel_while_connecting() {
    init_test_tracing();

    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let mut stream = ReconnectingStream::spawn(&token, factory, Duration::ZERO);
    let mut states = stream.state_changes();

    wait_for_attempts(&script, 1).await;
    assert_eq!(stream.state(), ConnectionState::Connecting);

    token.cancel();
    assert_ends(&mut stream).await;
    wait_for_state(&mut states, ConnectionState::Cancelled).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(script.attempt_count(), 1);
}

#[tokio::test]
async fn cancel_while_streaming_closes_transport() {
    init_test_tracing();

    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let mut stream = ReconnectingStream::spawn(&token, factory, Duration::ZERO);
    let mut states = stream.state_changes();

    let (mut writer, reader) = transport();
    let epoch = EnvelopeStream::spawn(&CancellationToken::new(), reader, Duration::from_secs(60));
    script.open_with(epoch.boxed()).await;

    writer.send(&fixtures::ping()).await.unwrap();
    assert!(stream.recv().await.unwrap().unwrap().is_ping());
    wait_for_state(&mut states, ConnectionState::Streaming).await;

    token.cancel();
    assert_ends(&mut stream).await;
    assert!(writer.wait_closed(PROMPTLY).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(script.attempt_count(), 1);
}

#[tokio::test]
async fn cancel_while_delaying() {
    init_test_tracing();

    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let mut stream = ReconnectingStream::spawn(&token, factory, Duration::from_secs(60));
    let mut states = stream.state_changes();

    script.fail("refused").await;
    assert!(stream.recv().await.unwrap().is_err());
    wait_for_state(&mut states, ConnectionState::Delay).await;

    token.cancel();
    assert_ends(&mut stream).await;
    assert_eq!(stream.state(), ConnectionState::Cancelled);
    assert_eq!(script.attempt_count(), 1);
}

#[tokio::test]
async fn dropping_stream_stops_supervisor() {
    init_test_tracing();

    let (script, factory) = scripted_factory();
    let token = CancellationToken::new();
    let stream = ReconnectingStream::spawn(&token, factory, Duration::ZERO);
    let mut states = stream.state_changes();

    wait_for_attempts(&script, 1).await;
    drop(stream);

    wait_for_state(&mut states, ConnectionState::Cancelled).await;
    assert!(!token.is_cancelled());
}
