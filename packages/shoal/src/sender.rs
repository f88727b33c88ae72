//! Outbound message formatting and delivery.
//!
//! All writes to a session go through its bounded outbound queue, drained
//! by the connection's single writer task — two envelopes never interleave
//! on one transport.  A closed transport is not an application error: the
//! remote side may already be gone, so failures are logged at warn and
//! swallowed.

use serde_json::Value;
use tracing::warn;

use crate::envelope::{self, Envelope, EventType, wrap_base64};
use crate::error::DispatchError;
use crate::session::Session;
use crate::state::CoreState;

/// Options applied when formatting an outbound envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Wrap the content as `{"base64": "..."}` so it survives as opaque
    /// text (binary payloads).
    pub base64: bool,
}

/// Format and enqueue an envelope for one session.
pub async fn send(
    core: &CoreState,
    session: &Session,
    event: EventType,
    topic: &str,
    content: Value,
    opts: EncodeOptions,
) {
    let content = if opts.base64 {
        let bytes = match &content {
            Value::String(s) => s.clone().into_bytes(),
            other => serde_json::to_vec(other).unwrap_or_default(),
        };
        wrap_base64(&bytes)
    } else {
        content
    };

    let env = Envelope::new(event, topic, content);
    let frame = match envelope::encode(&env, core.config.max_envelope_bytes) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session = %session.id, topic, "failed to encode outbound envelope: {e}");
            core.metrics.message_dropped();
            return;
        }
    };

    if session.outbound().send(frame).await.is_err() {
        warn!(session = %session.id, topic, "transport closed, dropping outbound message");
        core.metrics.message_dropped();
    } else {
        core.metrics.message_sent();
    }
}

/// Reply to a request on the same topic.
pub async fn respond(core: &CoreState, session: &Session, topic: &str, content: Value) {
    send(
        core,
        session,
        EventType::Response,
        topic,
        content,
        EncodeOptions::default(),
    )
    .await;
}

/// Push a publish envelope to one session.
pub async fn publish(
    core: &CoreState,
    session: &Session,
    topic: &str,
    content: Value,
    opts: EncodeOptions,
) {
    send(core, session, EventType::Publish, topic, content, opts).await;
}

/// Report a dispatch error on the topic that caused it.
pub async fn send_error(core: &CoreState, session: &Session, topic: &str, error: &DispatchError) {
    let content = serde_json::json!({
        "title": error.title(),
        "detail": error.client_detail(),
        "severity": error.severity(),
    });
    send(
        core,
        session,
        EventType::Error,
        topic,
        content,
        EncodeOptions::default(),
    )
    .await;
}

/// Clear a previously shown error for a topic (`error` event, null content).
pub async fn clear_error(core: &CoreState, session: &Session, topic: &str) {
    send(
        core,
        session,
        EventType::Error,
        topic,
        Value::Null,
        EncodeOptions::default(),
    )
    .await;
}
