//! Process-wide table of live sessions.
//!
//! An explicit registry object, constructed once at startup and injected
//! into every component that needs it — never ambient global state.  The
//! map is sharded (`DashMap`), so a publish from one connection reading
//! another connection's subscriptions contends per entry, not process-wide.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::notify::{Notifier, SessionEvent};
use crate::session::Session;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    notifier: Notifier,
}

impl SessionRegistry {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            sessions: DashMap::new(),
            notifier,
        }
    }

    /// Register a live session.  Fires an async best-effort start
    /// notification; connection setup never waits on it.
    pub fn add(&self, session: Arc<Session>) {
        self.notifier.notify(SessionEvent::Started {
            session_id: session.id.clone(),
        });
        self.sessions.insert(session.id.clone(), session);
    }

    /// Evict a session on connection close.  The persisted snapshot (if
    /// any) is left in place as a reconnect restore point.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(session_id).map(|(_, s)| s);
        if removed.is_some() {
            self.notifier.notify(SessionEvent::Ended {
                session_id: session_id.to_string(),
            });
        }
        removed
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Resolve the subscribers of a topic: every live session holding a
    /// subscription entry for it, with the recorded filter.
    ///
    /// O(sessions) per call — fan-out is driven by content changes, not a
    /// per-message hot path.  Sessions are snapshotted out of the map
    /// first so no shard lock is held across an await.
    pub async fn subscribers_of(&self, topic: &str) -> Vec<(Arc<Session>, Value)> {
        let sessions = self.all();
        let mut subscribers = Vec::new();
        for session in sessions {
            if let Some(filter) = session.subscription_filter(topic).await {
                subscribers.push((session, filter));
            }
        }
        subscribers
    }
}
