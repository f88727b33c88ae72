//! Topic handlers and the startup registration table.

pub mod auth;
pub mod contact;
pub mod files;
pub mod query;
pub mod script;
pub mod subscriptions;
pub mod workspace;

use crate::dispatch::{HandlerRegistry, handler};
use crate::envelope::EventType;

/// Build the immutable handler table.  Registrations must stay disjoint
/// per event type — the dispatcher reports overlaps as configuration
/// defects instead of picking one.
pub fn build_registry() -> anyhow::Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();

    // Authentication and session continuity.
    registry.register(
        EventType::Request,
        "auth:/app/authenticate",
        "",
        handler(auth::authenticate),
    )?;
    registry.register(EventType::Request, "auth:/app/logout", "", handler(auth::logout))?;
    registry.register(
        EventType::Request,
        "auth:/keys/exchange",
        "",
        handler(auth::exchange_keys),
    )?;
    registry.register(
        EventType::Request,
        "auth:/app/reconnect",
        "",
        handler(auth::reconnect),
    )?;

    // Workspace selection.
    registry.register(
        EventType::Subscribe,
        "config:/workspace",
        "",
        handler(workspace::subscribe_workspace),
    )?;
    registry.register(
        EventType::Request,
        "config:/workspace",
        "cms_user",
        handler(workspace::switch_workspace),
    )?;

    // Content store.
    registry.register(EventType::Request, "file:.*", "git_read", handler(files::read_file))?;
    registry.register(EventType::Publish, "file:.*", "git_write", handler(files::write_file))?;
    registry.register(
        EventType::Request,
        "git:/tree(/.*)?",
        "git_read",
        handler(files::list_tree),
    )?;

    // Query and script collaborators.
    registry.register(EventType::Request, "sql:/query", "sql_query", handler(query::run_query))?;
    registry.register(
        EventType::Request,
        "script:/run",
        "script_run",
        handler(script::run_script),
    )?;

    // Anonymous contact form.
    registry.register(
        EventType::Request,
        "contact:/form",
        "contact_form",
        handler(contact::submit),
    )?;

    // Generic subscription bookkeeping.  `config:` is excluded — its
    // subscribe handler above also publishes the current value.
    registry.register(
        EventType::Subscribe,
        "(file|git|sql|script|contact):.*",
        "",
        handler(subscriptions::subscribe),
    )?;
    registry.register(EventType::Unsubscribe, "", "", handler(subscriptions::unsubscribe))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handle_frame;
    use crate::envelope::EventType;
    use crate::test_helpers::{grant, recv_envelope, test_core, test_session, try_recv_envelope};

    #[tokio::test]
    async fn registry_builds() {
        let registry = build_registry().unwrap();
        assert!(registry.len() >= 14);
    }

    #[tokio::test]
    async fn unauthenticated_workspace_subscription_publishes_production() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let registry = build_registry().unwrap();
        let (session, mut rx) = test_session(&core, "s-1").await;

        handle_frame(
            &core,
            &registry,
            &session,
            r#"{"event":"subscribe","topic":"config:/workspace"}"#,
        )
        .await;

        let published = recv_envelope(&mut rx).await;
        assert_eq!(published.event, EventType::Publish);
        assert_eq!(published.topic, "config:/workspace");
        assert_eq!(published.content, serde_json::json!("production"));
    }

    #[tokio::test]
    async fn permission_gate_reports_no_permission() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let registry = build_registry().unwrap();
        let (session, mut rx) = test_session(&core, "s-1").await;

        handle_frame(
            &core,
            &registry,
            &session,
            r#"{"event":"request","topic":"sql:/query","content":{"sql":"SELECT 1"}}"#,
        )
        .await;

        let error = recv_envelope(&mut rx).await;
        assert_eq!(error.event, EventType::Error);
        // The marker a client matches on to redirect to login.
        assert!(error.content["title"].as_str().unwrap().contains("no permission"));
        assert_eq!(error.content["severity"], "warning");
    }

    #[tokio::test]
    async fn unknown_topics_get_a_generic_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let registry = build_registry().unwrap();
        let (session, mut rx) = test_session(&core, "s-1").await;

        handle_frame(
            &core,
            &registry,
            &session,
            r#"{"event":"request","topic":"unknown:/thing"}"#,
        )
        .await;

        let error = recv_envelope(&mut rx).await;
        assert_eq!(error.content["title"], "Server error");
    }

    #[tokio::test]
    async fn end_to_end_subscribe_write_fanout_through_frames() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let registry = build_registry().unwrap();
        let (reader, mut reader_rx) = test_session(&core, "reader").await;
        let (writer, mut writer_rx) = test_session(&core, "writer").await;
        grant(&writer, &["git_write"]).await;

        handle_frame(
            &core,
            &registry,
            &reader,
            r#"{"event":"subscribe","topic":"file:/x.txt"}"#,
        )
        .await;
        handle_frame(
            &core,
            &registry,
            &writer,
            r#"{"event":"publish","topic":"file:/x.txt","content":"updated"}"#,
        )
        .await;

        let published = recv_envelope(&mut reader_rx).await;
        assert_eq!(published.event, EventType::Publish);
        assert_eq!(published.content, serde_json::json!("updated"));
        assert!(try_recv_envelope(&mut reader_rx).is_none());
        assert!(try_recv_envelope(&mut writer_rx).is_none());

        // The subscription change persisted the reader's bag.
        let restored = core.store.restore("reader").await.unwrap();
        assert!(restored.subscriptions.contains_key("file:/x.txt"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let registry = build_registry().unwrap();
        let (reader, mut reader_rx) = test_session(&core, "reader").await;
        let (writer, _writer_rx) = test_session(&core, "writer").await;
        grant(&writer, &["git_write"]).await;

        handle_frame(
            &core,
            &registry,
            &reader,
            r#"{"event":"subscribe","topic":"file:/x.txt"}"#,
        )
        .await;
        handle_frame(
            &core,
            &registry,
            &reader,
            r#"{"event":"unsubscribe","topic":"file:/x.txt"}"#,
        )
        .await;
        handle_frame(
            &core,
            &registry,
            &writer,
            r#"{"event":"publish","topic":"file:/x.txt","content":"updated"}"#,
        )
        .await;

        assert!(try_recv_envelope(&mut reader_rx).is_none());
    }
}
