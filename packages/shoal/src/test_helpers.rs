//! Shared test fixtures: an in-memory core, channel-backed sessions, and
//! the client half of a key exchange.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::OsRng;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::collab::{DisabledScriptEngine, GitContentStore, SqliteQueryEngine, X25519ChaCha};
use crate::config::{FileConfig, RuntimeConfig};
use crate::envelope::{Envelope, EventType};
use crate::metrics::ServerMetrics;
use crate::notify::Notifier;
use crate::persistence::SessionStore;
use crate::registry::SessionRegistry;
use crate::repository::Database;
use crate::session::Session;
use crate::state::CoreState;

/// Build a full core against a temp directory and an in-memory database.
pub(crate) async fn test_core(dir: &tempfile::TempDir) -> Arc<CoreState> {
    let fc = FileConfig::default();
    let config = RuntimeConfig::resolve(dir.path().to_path_buf(), &fc, None, None);
    let db = Database::in_memory().await.expect("in-memory db");
    let store = SessionStore::new(config.snapshot_dir.clone(), config.snapshot_retention)
        .expect("snapshot store");
    let content =
        Arc::new(GitContentStore::new(config.workspaces_dir.clone()).expect("content store"));
    let queries = Arc::new(SqliteQueryEngine::new(db.pool.clone()));

    Arc::new(CoreState {
        config,
        sessions: SessionRegistry::new(Notifier::spawn(16)),
        store,
        db,
        content,
        queries,
        scripts: Arc::new(DisabledScriptEngine),
        crypto: Arc::new(X25519ChaCha),
        metrics: Arc::new(ServerMetrics::new()),
    })
}

/// Register a live session whose outbound frames land on the returned
/// receiver.
pub(crate) async fn test_session(
    core: &Arc<CoreState>,
    id: &str,
) -> (Arc<Session>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(64);
    let session = Arc::new(Session::new(id, tx, core.anonymous_attributes()));
    core.sessions.add(Arc::clone(&session));
    (session, rx)
}

/// Grant a session an exact permission set.
pub(crate) async fn grant(session: &Session, tokens: &[&str]) {
    let mut attrs = session.attrs.write().await;
    attrs.permissions = tokens.iter().copied().collect();
}

pub(crate) async fn recv_envelope(rx: &mut mpsc::Receiver<String>) -> Envelope {
    let frame = rx.recv().await.expect("expected an outbound frame");
    crate::envelope::decode(&frame).expect("outbound frame must decode")
}

pub(crate) fn try_recv_envelope(rx: &mut mpsc::Receiver<String>) -> Option<Envelope> {
    rx.try_recv()
        .ok()
        .map(|frame| crate::envelope::decode(&frame).expect("outbound frame must decode"))
}

/// Run the client half of a key exchange against a live session: invokes
/// the exchange handler, consumes the response, and returns the secret the
/// client derives (equal to the one now stored on the session).
pub(crate) async fn do_key_exchange(
    core: &Arc<CoreState>,
    session: &Arc<Session>,
    rx: &mut mpsc::Receiver<String>,
) -> [u8; 32] {
    let client_secret = EphemeralSecret::random_from_rng(OsRng);
    let client_public = PublicKey::from(&client_secret);

    let envelope = Envelope::new(
        EventType::Request,
        "auth:/keys/exchange",
        json!({ "publicKey": BASE64.encode(client_public.as_bytes()) }),
    );
    crate::handlers::auth::exchange_keys(Arc::clone(core), Arc::clone(session), envelope)
        .await
        .expect("key exchange");

    let response = recv_envelope(rx).await;
    assert_eq!(response.event, EventType::Response);
    let server_public: [u8; 32] = BASE64
        .decode(response.content["publicKey"].as_str().expect("server key"))
        .expect("base64 server key")
        .try_into()
        .expect("32-byte server key");

    let shared = client_secret.diffie_hellman(&PublicKey::from(server_public));
    Sha256::digest(shared.as_bytes()).into()
}
