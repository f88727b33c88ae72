//! Per-connection session state.
//!
//! One `Session` exists per live transport connection.  Its attribute bag
//! is a typed struct rather than a generic map — the key set is small and
//! fixed, and typed fields remove a class of runtime cast errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_auth::PermissionSet;
use tokio::sync::{RwLock, mpsc};

/// Everything a session carries besides its id and transport handle.
/// This is also the unit the snapshot store serializes.
///
/// `shared_secret` is bound to the live connection's key exchange and is
/// never serialized: the reconnect protocol decrypts credentials with the
/// NEW connection's secret, so a restored secret would be dead weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAttributes {
    pub username: String,
    pub name: String,
    pub email: String,
    pub workspace: String,
    pub permissions: PermissionSet,
    pub subscriptions: BTreeMap<String, Value>,
    #[serde(skip)]
    pub shared_secret: Option<[u8; 32]>,
}

impl SessionAttributes {
    /// Fresh anonymous attributes: no identity, the configured default
    /// workspace, and the configured anonymous permission set.
    pub fn anonymous(default_workspace: &str, anonymous_permissions: PermissionSet) -> Self {
        Self {
            username: String::new(),
            name: String::new(),
            email: String::new(),
            workspace: default_workspace.to_string(),
            permissions: anonymous_permissions,
            subscriptions: BTreeMap::new(),
            shared_secret: None,
        }
    }

    /// Copy every restored attribute verbatim onto this bag, except the
    /// connection-bound shared secret.
    pub fn adopt(&mut self, restored: SessionAttributes) {
        let secret = self.shared_secret.take();
        *self = restored;
        self.shared_secret = secret;
    }

    /// Security-violation path: drop the claimed identity and all grants.
    pub fn wipe_identity(&mut self) {
        self.username.clear();
        self.name.clear();
        self.email.clear();
        self.permissions = PermissionSet::empty();
    }
}

/// Server-side state for one live connection.
pub struct Session {
    /// Opaque id, stable for the connection's lifetime.
    pub id: String,
    /// Outbound frame queue; a single writer task per connection drains it,
    /// which serializes all writes on the transport.
    outbound: mpsc::Sender<String>,
    pub attrs: RwLock<SessionAttributes>,
}

impl Session {
    pub fn new(id: impl Into<String>, outbound: mpsc::Sender<String>, attrs: SessionAttributes) -> Self {
        Self {
            id: id.into(),
            outbound,
            attrs: RwLock::new(attrs),
        }
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<String> {
        &self.outbound
    }

    /// Record a subscription, overwriting any existing filter for the topic.
    pub async fn subscribe(&self, topic: &str, filter: Value) {
        let mut attrs = self.attrs.write().await;
        attrs.subscriptions.insert(topic.to_string(), filter);
    }

    /// Drop a subscription.  Returns whether one existed.
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        let mut attrs = self.attrs.write().await;
        attrs.subscriptions.remove(topic).is_some()
    }

    pub async fn subscription_filter(&self, topic: &str) -> Option<Value> {
        let attrs = self.attrs.read().await;
        attrs.subscriptions.get(topic).cloned()
    }

    /// Snapshot of the attribute bag (for persistence).
    pub async fn attributes(&self) -> SessionAttributes {
        self.attrs.read().await.clone()
    }
}
