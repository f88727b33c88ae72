//! Workspace selection topic.
//!
//! Subscribing to `config:/workspace` immediately publishes the session's
//! current workspace name; an authenticated request switches it.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::sender::{self, EncodeOptions};
use crate::session::Session;
use crate::state::CoreState;

use super::subscriptions::persist_session;

pub async fn subscribe_workspace(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let filter = envelope.filter.clone().unwrap_or(Value::Null);
    session.subscribe(&envelope.topic, filter).await;
    persist_session(&core, &session).await;

    let workspace = session.attrs.read().await.workspace.clone();
    sender::publish(
        &core,
        &session,
        &envelope.topic,
        Value::String(workspace),
        EncodeOptions::default(),
    )
    .await;
    Ok(())
}

pub async fn switch_workspace(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let workspace = envelope.str_field("workspace")?.to_string();
    {
        let mut attrs = session.attrs.write().await;
        attrs.workspace = workspace.clone();
    }
    sender::publish(
        &core,
        &session,
        &envelope.topic,
        Value::String(workspace),
        EncodeOptions::default(),
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventType;
    use crate::test_helpers::{grant, recv_envelope, test_core, test_session};

    #[tokio::test]
    async fn subscribing_publishes_the_default_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, mut rx) = test_session(&core, "s-1").await;

        // Unauthenticated session, no permission required.
        let envelope = Envelope::new(EventType::Subscribe, "config:/workspace", Value::Null);
        subscribe_workspace(Arc::clone(&core), Arc::clone(&session), envelope)
            .await
            .unwrap();

        let published = recv_envelope(&mut rx).await;
        assert_eq!(published.event, EventType::Publish);
        assert_eq!(published.topic, "config:/workspace");
        assert_eq!(published.content, Value::String("production".into()));
    }

    #[tokio::test]
    async fn switching_updates_the_session_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, mut rx) = test_session(&core, "s-1").await;
        grant(&session, &["cms_user"]).await;

        let envelope = Envelope::new(
            EventType::Request,
            "config:/workspace",
            serde_json::json!({"workspace": "staging"}),
        );
        switch_workspace(Arc::clone(&core), Arc::clone(&session), envelope)
            .await
            .unwrap();

        assert_eq!(session.attrs.read().await.workspace, "staging");
        let published = recv_envelope(&mut rx).await;
        assert_eq!(published.content, Value::String("staging".into()));
    }

    #[tokio::test]
    async fn switch_without_a_workspace_value_is_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let (session, _rx) = test_session(&core, "s-1").await;

        let envelope = Envelope::new(EventType::Request, "config:/workspace", Value::Null);
        let err = switch_workspace(core, session, envelope).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingField { .. }));
    }
}
