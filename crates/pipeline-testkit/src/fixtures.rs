//! Test fixtures for Pipeline wire types.

use pipeline_streaming::{Envelope, EnvelopeType, Message};
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// Envelopes
// ─────────────────────────────────────────────────────────────────────────────

/// A heartbeat envelope.
#[must_use]
pub fn ping() -> Envelope {
    Envelope::ping()
}

/// An end-of-stream envelope.
#[must_use]
pub fn end_of_stream() -> Envelope {
    Envelope::end_of_stream()
}

/// A sync envelope.
#[must_use]
pub fn sync(marker: &str) -> Envelope {
    Envelope::sync(marker)
}

/// A fully populated data envelope.
#[must_use]
pub fn data(topic: &str, offset: i64, value: serde_json::Value) -> Envelope {
    let message = Message::new(value)
        .with_ims_org("org-1")
        .with_key(format!("key-{offset}"))
        .with_locations(["loc-1", "loc-2"])
        .with_source("source-1");

    Envelope {
        partition: offset % 4,
        offset,
        create_time: 1_600_000_000_000 + u64::try_from(offset).unwrap_or_default(),
        ..Envelope::data(topic, message)
    }
}

/// An envelope with an envelope type the engine does not interpret.
#[must_use]
pub fn other(envelope_type: &str) -> Envelope {
    Envelope::new(EnvelopeType::Other(envelope_type.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode envelopes the way the server does: concatenated JSON objects.
#[must_use]
pub fn encode(envelopes: &[Envelope]) -> Vec<u8> {
    let mut out = Vec::new();
    for envelope in envelopes {
        out.extend(encode_one(envelope));
    }
    out
}

/// Encode envelopes separated by newlines and indentation.
#[must_use]
pub fn encode_pretty(envelopes: &[Envelope]) -> Vec<u8> {
    let mut out = Vec::new();
    for envelope in envelopes {
        out.extend(serde_json::to_vec_pretty(envelope).expect("envelope serializes"));
        out.push(b'\n');
    }
    out
}

/// Encode a single envelope.
#[must_use]
pub fn encode_one(envelope: &Envelope) -> Vec<u8> {
    serde_json::to_vec(envelope).expect("envelope serializes")
}

// ─────────────────────────────────────────────────────────────────────────────
// Error bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Pipeline error response body.
#[must_use]
pub fn error_body(status: u16, title: &str) -> serde_json::Value {
    json!({
        "status": status,
        "title": title,
        "report": {
            "errors": [
                {"id": "err-1", "code": "E1", "message": format!("{title} (detail)")}
            ]
        }
    })
}
