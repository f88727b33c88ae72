//! Handler registry and dispatcher.
//!
//! An immutable table of (event type, topic pattern, required permission,
//! handler) is built once at startup; dispatch scans it and counts
//! matches.  Exactly one registration must match an inbound envelope —
//! zero or multiple matches are error conditions reported to the client,
//! never a crash.  The dispatcher is also the single funnel for every
//! client-visible failure: whatever a handler returns, the connection
//! survives.

use std::sync::Arc;

use anyhow::Context;
use futures::future::BoxFuture;
use regex::Regex;

use crate::envelope::{self, Envelope, EventType};
use crate::error::DispatchError;
use crate::sender;
use crate::session::Session;
use crate::state::CoreState;

pub type HandlerFn = Arc<
    dyn Fn(Arc<CoreState>, Arc<Session>, Envelope) -> BoxFuture<'static, Result<(), DispatchError>>
        + Send
        + Sync,
>;

/// Adapt an async fn into a boxed handler.
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arc<CoreState>, Arc<Session>, Envelope) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    Arc::new(move |core, session, envelope| Box::pin(f(core, session, envelope)))
}

struct HandlerRegistration {
    event: EventType,
    /// `None` matches every topic.  Patterns are anchored: the topic must
    /// match the whole expression, case-sensitively.
    pattern: Option<Regex>,
    required_permission: String,
    handler: HandlerFn,
}

impl HandlerRegistration {
    fn matches(&self, envelope: &Envelope) -> bool {
        self.event == envelope.event
            && self
                .pattern
                .as_ref()
                .map(|p| p.is_match(&envelope.topic))
                .unwrap_or(true)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<HandlerRegistration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.  An empty pattern matches every topic; an empty
    /// permission means no gate.  Only called at startup — the table is
    /// immutable afterwards.
    pub fn register(
        &mut self,
        event: EventType,
        topic_pattern: &str,
        required_permission: &str,
        handler: HandlerFn,
    ) -> anyhow::Result<()> {
        let pattern = if topic_pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(&format!("^(?:{topic_pattern})$"))
                    .with_context(|| format!("bad topic pattern: {topic_pattern}"))?,
            )
        };
        self.entries.push(HandlerRegistration {
            event,
            pattern,
            required_permission: required_permission.to_string(),
            handler,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match an envelope against the table and run the single matching
    /// handler, permission-gated.
    pub async fn dispatch(
        &self,
        core: Arc<CoreState>,
        session: Arc<Session>,
        envelope: Envelope,
    ) -> Result<(), DispatchError> {
        let matches: Vec<&HandlerRegistration> =
            self.entries.iter().filter(|r| r.matches(&envelope)).collect();

        let registration = match matches.len() {
            0 => {
                return Err(DispatchError::NoHandler {
                    event: envelope.event,
                    topic: envelope.topic,
                });
            }
            1 => matches[0],
            count => {
                return Err(DispatchError::Ambiguous {
                    event: envelope.event,
                    topic: envelope.topic,
                    count,
                });
            }
        };

        if !registration.required_permission.is_empty() {
            let attrs = session.attrs.read().await;
            if !attrs.permissions.allows(&registration.required_permission) {
                return Err(DispatchError::Permission {
                    required: registration.required_permission.clone(),
                });
            }
        }

        (registration.handler)(core, session, envelope).await
    }
}

/// Process one raw inbound frame for a session: decode, dispatch, and
/// funnel any failure into an error envelope.  This is the only place
/// client-visible errors are produced, and it never returns one — the
/// connection outlives every application failure.
pub async fn handle_frame(
    core: &Arc<CoreState>,
    registry: &HandlerRegistry,
    session: &Arc<Session>,
    raw: &str,
) {
    core.metrics.message_received();

    let envelope = match envelope::decode(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            report(core, session, "", &e).await;
            return;
        }
    };

    let topic = envelope.topic.clone();
    if let Err(e) = registry
        .dispatch(Arc::clone(core), Arc::clone(session), envelope)
        .await
    {
        report(core, session, &topic, &e).await;
    }
}

async fn report(core: &Arc<CoreState>, session: &Arc<Session>, topic: &str, error: &DispatchError) {
    error.log(&session.id);
    core.metrics.dispatch_error();
    sender::send_error(core, session, topic, error).await;
}
