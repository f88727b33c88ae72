//! Content-store topics: file reads, writes with fan-out, tree listing.
//!
//! The topic path after the namespace prefix addresses a path inside the
//! session's current workspace.  Binary content crosses the wire
//! base64-wrapped; text goes as a plain string.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::{Envelope, EventType, unwrap_base64, wrap_base64};
use crate::error::DispatchError;
use crate::sender::{self, EncodeOptions};
use crate::session::Session;
use crate::state::CoreState;

fn file_path(topic: &str) -> &str {
    topic.strip_prefix("file:").unwrap_or(topic)
}

fn tree_path(topic: &str) -> &str {
    let rest = topic.strip_prefix("git:/tree").unwrap_or("");
    if rest.is_empty() { "/" } else { rest }
}

/// Bytes → wire content: UTF-8 text as a plain string, anything else
/// base64-wrapped.
fn content_for(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => wrap_base64(bytes),
    }
}

/// Wire content → bytes for a write.
fn bytes_for(content: &Value) -> Result<Vec<u8>, DispatchError> {
    if let Some(bytes) = unwrap_base64(content) {
        return Ok(bytes);
    }
    match content {
        Value::String(s) => Ok(s.clone().into_bytes()),
        Value::Null => Err(DispatchError::MissingField {
            field: "content".to_string(),
        }),
        other => serde_json::to_vec_pretty(other).map_err(|e| {
            DispatchError::collaborator("Content store error", e)
        }),
    }
}

/// `request file:<path>` — read a path from the content store and reply on
/// the same topic.
pub async fn read_file(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let path = file_path(&envelope.topic);
    let workspace = session.attrs.read().await.workspace.clone();
    let bytes = core
        .content
        .read(&workspace, path)
        .await
        .map_err(|e| DispatchError::collaborator("Content store error", e))?;

    // Clients may force opaque-text transport for textual payloads.
    let force_base64 = envelope
        .opt_field("base64")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    match std::str::from_utf8(&bytes) {
        Ok(text) if force_base64 => {
            sender::send(
                &core,
                &session,
                EventType::Response,
                &envelope.topic,
                Value::String(text.to_string()),
                EncodeOptions { base64: true },
            )
            .await;
        }
        Ok(text) => {
            sender::respond(&core, &session, &envelope.topic, Value::String(text.to_string()))
                .await;
        }
        Err(_) => {
            sender::respond(&core, &session, &envelope.topic, wrap_base64(&bytes)).await;
        }
    }
    Ok(())
}

/// `publish file:<path>` — write content to the store, then fan out one
/// publish to every subscriber of the topic.  No subscribers means no
/// messages; that is not an error.
pub async fn write_file(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let path = file_path(&envelope.topic);
    let bytes = bytes_for(&envelope.content)?;
    let workspace = session.attrs.read().await.workspace.clone();
    core.content
        .write(&workspace, path, &bytes)
        .await
        .map_err(|e| DispatchError::collaborator("Content store error", e))?;

    let content = content_for(&bytes);
    for (subscriber, _filter) in core.sessions.subscribers_of(&envelope.topic).await {
        sender::publish(
            &core,
            &subscriber,
            &envelope.topic,
            content.clone(),
            EncodeOptions::default(),
        )
        .await;
    }
    Ok(())
}

/// `request git:/tree[/<path>]` — list the workspace tree under a path.
pub async fn list_tree(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let path = tree_path(&envelope.topic);
    let workspace = session.attrs.read().await.workspace.clone();
    let tree = core
        .content
        .list(&workspace, path)
        .await
        .map_err(|e| DispatchError::collaborator("Content store error", e))?;
    let value = serde_json::to_value(tree)
        .map_err(|e| DispatchError::collaborator("Content store error", e))?;
    sender::respond(&core, &session, &envelope.topic, value).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventType;
    use crate::test_helpers::{grant, recv_envelope, test_core, test_session, try_recv_envelope};

    #[tokio::test]
    async fn subscribe_publish_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (reader, mut reader_rx) = test_session(&core, "reader").await;
        let (writer, mut writer_rx) = test_session(&core, "writer").await;
        grant(&writer, &["git_write"]).await;

        reader.subscribe("file:/x.txt", Value::Null).await;

        let envelope = Envelope::new(
            EventType::Publish,
            "file:/x.txt",
            Value::String("fresh contents".into()),
        );
        write_file(Arc::clone(&core), Arc::clone(&writer), envelope)
            .await
            .unwrap();

        // The subscriber receives exactly one publish with the new bytes.
        let published = recv_envelope(&mut reader_rx).await;
        assert_eq!(published.event, EventType::Publish);
        assert_eq!(published.topic, "file:/x.txt");
        assert_eq!(published.content, Value::String("fresh contents".into()));
        assert!(try_recv_envelope(&mut reader_rx).is_none());

        // The non-subscribed writer receives nothing.
        assert!(try_recv_envelope(&mut writer_rx).is_none());

        // The store observed the write.
        let bytes = core.content.read("production", "/x.txt").await.unwrap();
        assert_eq!(bytes, b"fresh contents");
    }

    #[tokio::test]
    async fn fanout_reaches_every_subscriber_of_the_topic() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (a, mut a_rx) = test_session(&core, "a").await;
        let (b, mut b_rx) = test_session(&core, "b").await;
        let (c, mut c_rx) = test_session(&core, "c").await;
        let (writer, _writer_rx) = test_session(&core, "writer").await;
        grant(&writer, &["git_write"]).await;

        a.subscribe("file:/shared.md", Value::Null).await;
        b.subscribe("file:/shared.md", Value::Null).await;
        c.subscribe("file:/other.md", Value::Null).await;

        let envelope = Envelope::new(
            EventType::Publish,
            "file:/shared.md",
            Value::String("v2".into()),
        );
        write_file(Arc::clone(&core), writer, envelope).await.unwrap();

        for rx in [&mut a_rx, &mut b_rx] {
            let published = recv_envelope(rx).await;
            assert_eq!(published.topic, "file:/shared.md");
            assert_eq!(published.content, Value::String("v2".into()));
            assert!(try_recv_envelope(rx).is_none());
        }
        // A session subscribed to a different topic receives nothing.
        assert!(try_recv_envelope(&mut c_rx).is_none());
    }

    #[tokio::test]
    async fn zero_subscriber_publish_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (writer, mut writer_rx) = test_session(&core, "writer").await;
        grant(&writer, &["git_write"]).await;

        let envelope = Envelope::new(
            EventType::Publish,
            "file:/lonely.txt",
            Value::String("nobody listening".into()),
        );
        write_file(Arc::clone(&core), writer, envelope).await.unwrap();

        // Zero messages, no error.
        assert!(try_recv_envelope(&mut writer_rx).is_none());
        assert_eq!(
            core.content.read("production", "/lonely.txt").await.unwrap(),
            b"nobody listening"
        );
    }

    #[tokio::test]
    async fn binary_content_is_base64_wrapped_on_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (reader, mut reader_rx) = test_session(&core, "reader").await;
        let (writer, _writer_rx) = test_session(&core, "writer").await;
        grant(&writer, &["git_write"]).await;

        reader.subscribe("file:/logo.png", Value::Null).await;

        let payload = [0x89u8, 0x50, 0x4e, 0x47, 0x00, 0xff];
        let envelope = Envelope::new(EventType::Publish, "file:/logo.png", wrap_base64(&payload));
        write_file(Arc::clone(&core), writer, envelope).await.unwrap();

        let published = recv_envelope(&mut reader_rx).await;
        assert_eq!(unwrap_base64(&published.content).unwrap(), payload);
        assert_eq!(
            core.content.read("production", "/logo.png").await.unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn read_replies_on_the_request_topic() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, mut rx) = test_session(&core, "s-1").await;
        grant(&session, &["git_read"]).await;

        core.content
            .write("production", "/a/b.json", b"{\"k\":1}")
            .await
            .unwrap();

        let envelope = Envelope::new(EventType::Request, "file:/a/b.json", Value::Null);
        read_file(Arc::clone(&core), Arc::clone(&session), envelope)
            .await
            .unwrap();

        let response = recv_envelope(&mut rx).await;
        assert_eq!(response.event, EventType::Response);
        assert_eq!(response.topic, "file:/a/b.json");
        assert_eq!(response.content, Value::String("{\"k\":1}".into()));
    }

    #[tokio::test]
    async fn read_can_force_base64_transport() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, mut rx) = test_session(&core, "s-1").await;
        grant(&session, &["git_read"]).await;

        core.content
            .write("production", "/notes.txt", b"plain text")
            .await
            .unwrap();

        let envelope = Envelope::new(
            EventType::Request,
            "file:/notes.txt",
            serde_json::json!({"base64": true}),
        );
        read_file(Arc::clone(&core), Arc::clone(&session), envelope)
            .await
            .unwrap();

        let response = recv_envelope(&mut rx).await;
        assert_eq!(unwrap_base64(&response.content).unwrap(), b"plain text");
    }

    #[tokio::test]
    async fn read_missing_file_is_a_collaborator_error() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, _rx) = test_session(&core, "s-1").await;

        let envelope = Envelope::new(EventType::Request, "file:/absent.txt", Value::Null);
        let err = read_file(core, session, envelope).await.unwrap_err();
        assert_eq!(err.title(), "Content store error");
    }

    #[tokio::test]
    async fn write_with_null_content_is_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, _rx) = test_session(&core, "s-1").await;

        let envelope = Envelope::new(EventType::Publish, "file:/x.txt", Value::Null);
        let err = write_file(core, session, envelope).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingField { .. }));
    }

    #[tokio::test]
    async fn tree_listing_reflects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, mut rx) = test_session(&core, "s-1").await;

        core.content
            .write("production", "/docs/a.md", b"a")
            .await
            .unwrap();

        let envelope = Envelope::new(EventType::Request, "git:/tree", Value::Null);
        list_tree(Arc::clone(&core), Arc::clone(&session), envelope)
            .await
            .unwrap();

        let response = recv_envelope(&mut rx).await;
        assert_eq!(response.topic, "git:/tree");
        assert_eq!(response.content["children"][0]["name"], "docs");
    }

    #[test]
    fn topic_paths_strip_their_prefixes() {
        assert_eq!(file_path("file:/a/b.json"), "/a/b.json");
        assert_eq!(tree_path("git:/tree"), "/");
        assert_eq!(tree_path("git:/tree/docs"), "/docs");
    }
}
