//! Bounded background worker for session lifecycle notifications.
//!
//! Session start/end notifications are best-effort: they run on a bounded
//! queue drained by one background task and must never block or fail
//! connection setup/teardown.  A full queue drops the notification with a
//! warning.

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug)]
pub enum SessionEvent {
    Started { session_id: String },
    Ended { session_id: String },
}

pub struct Notifier {
    tx: mpsc::Sender<SessionEvent>,
}

impl Notifier {
    /// Spawn the worker task.  `capacity` bounds the queue.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<SessionEvent>(capacity);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    SessionEvent::Started { session_id } => {
                        info!(session = %session_id, "session started");
                    }
                    SessionEvent::Ended { session_id } => {
                        info!(session = %session_id, "session ended");
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueue without waiting.  Never blocks the caller.
    pub fn notify(&self, event: SessionEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("dropping session notification: {e}");
        }
    }
}
