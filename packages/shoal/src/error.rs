//! Dispatch error taxonomy.
//!
//! Every client-visible failure funnels through `DispatchError`: the
//! dispatcher converts it into an error envelope and logs it at the level
//! the variant calls for.  Transport write failures are deliberately NOT
//! part of this taxonomy — the remote side may already be gone, so the
//! sender swallows them with a warning.

use crate::envelope::EventType;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed envelope: {excerpt}")]
    Decode { excerpt: String },

    #[error("missing value: {field}")]
    MissingField { field: String },

    #[error("no permission: requires {required}")]
    Permission { required: String },

    #[error("no handler for {event} {topic}")]
    NoHandler { event: EventType, topic: String },

    #[error("{count} handlers match {event} {topic}")]
    Ambiguous {
        event: EventType,
        topic: String,
        count: usize,
    },

    #[error("security violation: {detail}")]
    Security { detail: String },

    #[error("authentication failed: {detail}")]
    BadCredentials { detail: String },

    #[error("{title}: {detail}")]
    Collaborator { title: String, detail: String },

    #[error("envelope too large: {size} bytes (limit {limit})")]
    Oversize { size: usize, limit: usize },
}

impl DispatchError {
    /// Wrap a collaborator failure with a client-visible title.
    pub fn collaborator(title: &str, err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            title: title.to_string(),
            detail: err.to_string(),
        }
    }

    /// Client-visible error title.
    ///
    /// The permission title must contain the literal marker "no permission" —
    /// clients match on it to redirect to a login flow.
    pub fn title(&self) -> &str {
        match self {
            Self::Decode { .. } => "Invalid message",
            Self::MissingField { .. } => "Missing value",
            Self::Permission { .. } => "Sorry, no permission",
            Self::NoHandler { .. } | Self::Ambiguous { .. } => "Server error",
            Self::Security { .. } => "Access denied",
            Self::BadCredentials { .. } => "Authentication failed",
            Self::Collaborator { title, .. } => title,
            Self::Oversize { .. } => "Message too large",
        }
    }

    /// Client-visible detail line.  Server-side defects stay generic; the
    /// specifics go to the log instead.
    pub fn client_detail(&self) -> String {
        match self {
            Self::Decode { .. } => "The message could not be decoded.".to_string(),
            Self::MissingField { field } => format!("A value for '{field}' is required."),
            Self::Permission { .. } => {
                "You have no permission to perform this action.".to_string()
            }
            Self::NoHandler { .. } | Self::Ambiguous { .. } => {
                "The server could not process the request.".to_string()
            }
            Self::Security { .. } => "The request was rejected.".to_string(),
            Self::BadCredentials { detail } => detail.clone(),
            Self::Collaborator { detail, .. } => detail.clone(),
            Self::Oversize { limit, .. } => {
                format!("The message exceeds the {limit} byte limit.")
            }
        }
    }

    pub fn severity(&self) -> &'static str {
        match self {
            Self::Permission { .. } | Self::MissingField { .. } => "warning",
            _ => "error",
        }
    }

    /// Log with the level and context each variant calls for.
    pub fn log(&self, session_id: &str) {
        match self {
            Self::Decode { excerpt } => {
                tracing::error!(session = %session_id, excerpt = %excerpt, "failed to decode envelope");
            }
            Self::MissingField { field } => {
                tracing::warn!(session = %session_id, field = %field, "envelope missing required value");
            }
            Self::Permission { required } => {
                tracing::warn!(session = %session_id, required = %required, "permission denied");
            }
            Self::NoHandler { event, topic } => {
                tracing::error!(session = %session_id, %event, topic = %topic, "no handler registered");
            }
            Self::Ambiguous {
                event,
                topic,
                count,
            } => {
                // Overlapping registrations are a configuration defect.
                tracing::error!(session = %session_id, %event, topic = %topic, count, "ambiguous handler registrations");
            }
            Self::Security { detail } => {
                // Expected adversarial path — log loud, no stack needed.
                tracing::error!(session = %session_id, detail = %detail, "security violation");
            }
            Self::BadCredentials { detail } => {
                tracing::warn!(session = %session_id, detail = %detail, "authentication failed");
            }
            Self::Collaborator { title, detail } => {
                tracing::warn!(session = %session_id, title = %title, detail = %detail, "collaborator error");
            }
            Self::Oversize { size, limit } => {
                tracing::warn!(session = %session_id, size, limit, "oversized envelope rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_title_carries_login_marker() {
        let err = DispatchError::Permission {
            required: "cms_user".to_string(),
        };
        assert!(err.title().contains("no permission"));
        assert_eq!(err.severity(), "warning");
    }

    #[test]
    fn server_defects_stay_generic_for_clients() {
        let err = DispatchError::NoHandler {
            event: EventType::Request,
            topic: "file:/a.json".to_string(),
        };
        assert_eq!(err.title(), "Server error");
        assert!(!err.client_detail().contains("file:/a.json"));

        let err = DispatchError::Ambiguous {
            event: EventType::Request,
            topic: "file:/a.json".to_string(),
            count: 2,
        };
        assert_eq!(err.title(), "Server error");
    }

    #[test]
    fn missing_field_has_its_own_title() {
        let err = DispatchError::MissingField {
            field: "username".to_string(),
        };
        assert_eq!(err.title(), "Missing value");
        assert!(err.client_detail().contains("username"));
    }

    #[test]
    fn collaborator_errors_keep_their_title() {
        let err = DispatchError::collaborator("Content store error", "missing blob");
        assert_eq!(err.title(), "Content store error");
        assert_eq!(err.client_detail(), "missing blob");
    }
}
