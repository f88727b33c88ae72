//! Relational query topic.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::sender;
use crate::session::Session;
use crate::state::CoreState;

/// `request sql:/query` with `{sql, params}` — run the query collaborator
/// and reply with the rows.
pub async fn run_query(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let sql = envelope.str_field("sql")?.to_string();
    let params = envelope
        .opt_field("params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let rows = core
        .queries
        .run(&sql, &params)
        .await
        .map_err(|e| DispatchError::collaborator("Query error", e))?;

    sender::respond(
        &core,
        &session,
        &envelope.topic,
        serde_json::json!({ "rows": rows }),
    )
    .await;
    Ok(())
}
