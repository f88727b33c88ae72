//! Authentication topics: credential login, logout, key exchange, and the
//! reconnection state machine.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::info;

use crate::collab::crypto::reconnect_digest;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::persistence::StoreError;
use crate::sender;
use crate::session::Session;
use crate::state::CoreState;

use super::subscriptions::persist_session;

/// `request auth:/app/authenticate` with `{username, password}`.
///
/// On success the account's identity and permission set replace the
/// session's current ones wholesale — grants never merge.
pub async fn authenticate(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let username = envelope.str_field("username")?;
    let password = envelope.str_field("password")?;

    let account = core
        .db
        .verify_credentials(username, password)
        .await
        .map_err(|e| DispatchError::collaborator("Authentication error", e))?
        .ok_or_else(|| DispatchError::BadCredentials {
            detail: "Unknown username or wrong password.".to_string(),
        })?;

    {
        let mut attrs = session.attrs.write().await;
        attrs.username = account.username.clone();
        attrs.name = account.display_name.clone();
        attrs.email = account.email.clone();
        attrs.permissions.replace_with(account.permissions.clone());
    }
    info!(session = %session.id, user = %account.username, "authenticated");

    let attrs = session.attributes().await;
    sender::clear_error(&core, &session, &envelope.topic).await;
    sender::respond(
        &core,
        &session,
        &envelope.topic,
        serde_json::json!({
            "username": attrs.username,
            "name": attrs.name,
            "workspace": attrs.workspace,
            "permissions": attrs.permissions,
        }),
    )
    .await;
    Ok(())
}

/// `request auth:/app/logout` — drop identity and fall back to the
/// configured anonymous permission set and default workspace.
pub async fn logout(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    {
        let mut attrs = session.attrs.write().await;
        attrs.username.clear();
        attrs.name.clear();
        attrs.email.clear();
        attrs
            .permissions
            .replace_with(core.config.anonymous_permissions.clone());
        attrs.workspace = core.config.default_workspace.clone();
    }
    sender::respond(
        &core,
        &session,
        &envelope.topic,
        serde_json::json!({ "status": "ok" }),
    )
    .await;
    Ok(())
}

/// `request auth:/keys/exchange` with `{publicKey}` (base64, 32 bytes).
/// Stores the derived shared secret on the session and replies with the
/// server public key.
pub async fn exchange_keys(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let encoded = envelope.str_field("publicKey")?;
    let client_public: [u8; 32] = BASE64
        .decode(encoded)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            DispatchError::collaborator("Key exchange error", "publicKey must be 32 base64 bytes")
        })?;

    let (server_public, secret) = core.crypto.exchange_keys(&client_public);
    session.attrs.write().await.shared_secret = Some(secret);

    sender::respond(
        &core,
        &session,
        &envelope.topic,
        serde_json::json!({ "publicKey": BASE64.encode(server_public) }),
    )
    .await;
    Ok(())
}

/// `request auth:/app/reconnect` with
/// `{username, sessionId: <previous>, password: <encrypted>}`.
///
/// The state machine restores a previous session's attribute bag onto this
/// connection after verifying the reconnection credential: the encrypted
/// password, decrypted with THIS connection's key-exchange secret, must
/// equal `hex(sha256(previous_session_id + username))`, and the restored
/// snapshot must belong to the claimed username.  A failed check wipes the
/// claimed identity and leaves the previous snapshot untouched.
pub async fn reconnect(
    core: Arc<CoreState>,
    session: Arc<Session>,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let username = envelope.str_field("username")?.to_string();
    let previous_id = envelope.str_field("sessionId")?.to_string();
    let encrypted = envelope.str_field("password")?.to_string();

    // Unknown users fail before anything is restored; the session stays
    // anonymous.
    core.db
        .get_user(&username)
        .await
        .map_err(|e| DispatchError::collaborator("Authentication error", e))?
        .ok_or_else(|| DispatchError::BadCredentials {
            detail: "Unknown username.".to_string(),
        })?;

    session.attrs.write().await.username = username.clone();

    let restored = match core.store.restore(&previous_id).await {
        Ok(restored) => restored,
        Err(StoreError::NotFound(_)) => {
            return Err(DispatchError::BadCredentials {
                detail: "No session to restore.".to_string(),
            });
        }
        Err(e) => return Err(DispatchError::collaborator("Session restore error", e)),
    };

    // Credential check against this connection's shared secret.
    let secret = session.attrs.read().await.shared_secret;
    let Some(secret) = secret else {
        session.attrs.write().await.wipe_identity();
        return Err(DispatchError::Security {
            detail: format!("reconnect for {username} without a key exchange"),
        });
    };
    let presented = match core.crypto.decrypt(&encrypted, &secret) {
        Ok(presented) => presented,
        Err(_) => {
            session.attrs.write().await.wipe_identity();
            return Err(DispatchError::Security {
                detail: format!("undecryptable reconnect credential for {username}"),
            });
        }
    };
    if presented != reconnect_digest(&previous_id, &username)
        || restored.username != username
    {
        // Treated as attempted intrusion: identity wiped, snapshot kept.
        session.attrs.write().await.wipe_identity();
        return Err(DispatchError::Security {
            detail: format!(
                "reconnect credential mismatch for {username} against session {previous_id}"
            ),
        });
    }

    // Adopt the restored bag verbatim, consume the old snapshot, and
    // immediately write a fresh one so a second drop still restores.
    {
        let mut attrs = session.attrs.write().await;
        attrs.adopt(restored);
    }
    if let Err(e) = core.store.discard(&previous_id).await {
        tracing::warn!(previous = %previous_id, "failed to discard consumed snapshot: {e}");
    }
    persist_session(&core, &session).await;
    core.metrics.session_restored();
    info!(session = %session.id, previous = %previous_id, user = %username, "session restored");

    let attrs = session.attributes().await;
    sender::respond(
        &core,
        &session,
        &envelope.topic,
        serde_json::json!({
            "username": attrs.username,
            "workspace": attrs.workspace,
            "permissions": attrs.permissions,
            "subscriptions": attrs.subscriptions,
        }),
    )
    .await;
    Ok(())
}
