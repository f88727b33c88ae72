//! Script execution topic.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::{self, Envelope};
use crate::error::DispatchError;
use crate::sender;
use crate::session::Session;
use crate::state::CoreState;

/// `request script:/run` with `{source, content, filter}` — hand the
/// source to the script collaborator under the acting username and reply
/// with its JSON output.
pub async fn run_script(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let source = envelope.str_field("source")?.to_string();
    let content = envelope.opt_field("content").cloned().unwrap_or(Value::Null);
    let filter = envelope.opt_field("filter").cloned();
    let username = session.attrs.read().await.username.clone();

    let output = core
        .scripts
        .run(&source, &content, filter.as_ref(), &username)
        .await
        .map_err(|e| DispatchError::collaborator("Script error", e))?;

    let value = envelope::prepare_content(&output, false)?;
    sender::respond(&core, &session, &envelope.topic, value).await;
    Ok(())
}
