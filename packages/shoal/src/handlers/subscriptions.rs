//! Generic subscription bookkeeping.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::session::Session;
use crate::state::CoreState;

/// Record a subscription for the envelope's topic, overwriting any
/// existing filter, and persist the session's attribute bag.
pub async fn subscribe(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let filter = envelope.filter.clone().unwrap_or(Value::Null);
    session.subscribe(&envelope.topic, filter).await;
    persist_session(&core, &session).await;
    Ok(())
}

/// Drop a subscription.  No forced persist: a crash before the next
/// persist may restore a stale subscription (accepted staleness).
pub async fn unsubscribe(
    _core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    session.unsubscribe(&envelope.topic).await;
    Ok(())
}

/// Best-effort snapshot write.  Persistence failures are logged, not
/// retried, and never fail the triggering operation.
pub async fn persist_session(core: &CoreState, session: &Session) {
    let attrs = session.attributes().await;
    if let Err(e) = core.store.persist(&session.id, &attrs).await {
        warn!(session = %session.id, "failed to persist session snapshot: {e}");
    }
}
