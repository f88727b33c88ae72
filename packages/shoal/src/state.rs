//! Shared server state.
//!
//! One `CoreState` is constructed at startup and injected (as an `Arc`)
//! into the dispatcher, the transport layer, and every handler.

use std::sync::Arc;

use crate::collab::{ContentStore, CryptoProvider, QueryEngine, ScriptEngine};
use crate::config::RuntimeConfig;
use crate::metrics::ServerMetrics;
use crate::persistence::SessionStore;
use crate::registry::SessionRegistry;
use crate::repository::Database;
use crate::session::SessionAttributes;

pub struct CoreState {
    pub config: RuntimeConfig,
    pub sessions: SessionRegistry,
    pub store: SessionStore,
    pub db: Database,
    pub content: Arc<dyn ContentStore>,
    pub queries: Arc<dyn QueryEngine>,
    pub scripts: Arc<dyn ScriptEngine>,
    pub crypto: Arc<dyn CryptoProvider>,
    pub metrics: Arc<ServerMetrics>,
}

impl CoreState {
    /// Fresh anonymous attributes for a new connection, per the configured
    /// defaults.
    pub fn anonymous_attributes(&self) -> SessionAttributes {
        SessionAttributes::anonymous(
            &self.config.default_workspace,
            self.config.anonymous_permissions.clone(),
        )
    }
}
