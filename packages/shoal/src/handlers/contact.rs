//! Anonymous contact-form submission.
//!
//! The one topic the default anonymous permission set enables.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::sender;
use crate::session::Session;
use crate::state::CoreState;

pub async fn submit(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let message = envelope.str_field("message")?.to_string();
    let name = envelope
        .opt_field("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let email = envelope
        .opt_field("email")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let id = core
        .db
        .record_contact(&name, &email, &message)
        .await
        .map_err(|e| DispatchError::collaborator("Contact form error", e))?;

    sender::respond(
        &core,
        &session,
        &envelope.topic,
        serde_json::json!({ "status": "ok", "id": id }),
    )
    .await;
    Ok(())
}
