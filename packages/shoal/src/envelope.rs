//! Wire envelope types and codec.
//!
//! The transport exchanges small JSON envelopes: an event type, a
//! hierarchical topic, an arbitrary content value, and (on subscribe) a
//! filter.  Envelopes are immutable once parsed.  The codec also handles
//! the two content transforms the protocol needs: base64-wrapping for
//! binary payloads and comment stripping for annotated JSON sources.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// Longest fragment of an offending payload echoed into logs/errors.
const EXCERPT_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Request,
    Response,
    Publish,
    Subscribe,
    Unsubscribe,
    Error,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The wire unit.  `topic` is namespaced by a prefix before `:`
/// (e.g. `file:/a/b.json`); the core never interprets the path beyond
/// pattern matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventType,
    pub topic: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl Envelope {
    pub fn new(event: EventType, topic: impl Into<String>, content: Value) -> Self {
        Self {
            event,
            topic: topic.into(),
            content,
            filter: None,
        }
    }

    /// Required string field from an object-shaped content.
    pub fn str_field(&self, field: &str) -> Result<&str, DispatchError> {
        self.content
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DispatchError::MissingField {
                field: field.to_string(),
            })
    }

    /// Optional field lookup; absent and `null` both read as `None`.
    pub fn opt_field<'a>(&'a self, field: &str) -> Option<&'a Value> {
        self.content.get(field).filter(|v| !v.is_null())
    }
}

/// Decode a raw inbound frame.  Malformed payloads never panic — they
/// yield a `Decode` error carrying an excerpt of the offending fragment.
pub fn decode(raw: &str) -> Result<Envelope, DispatchError> {
    serde_json::from_str(raw).map_err(|_| DispatchError::Decode {
        excerpt: excerpt(raw),
    })
}

/// Serialize an envelope, enforcing the configured size ceiling.
/// Exceeding it is an error, never a truncation.
pub fn encode(envelope: &Envelope, max_bytes: usize) -> Result<String, DispatchError> {
    let frame = serde_json::to_string(envelope).map_err(|e| DispatchError::Decode {
        excerpt: e.to_string(),
    })?;
    if frame.len() > max_bytes {
        return Err(DispatchError::Oversize {
            size: frame.len(),
            limit: max_bytes,
        });
    }
    Ok(frame)
}

/// Prepare a content value supplied as a raw string: strings opening an
/// object or array parse as JSON (optionally after comment stripping),
/// everything else passes through as a plain string.
pub fn prepare_content(raw: &str, strip_comments: bool) -> Result<Value, DispatchError> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let source = if strip_comments {
            strip_json_comments(raw)
        } else {
            raw.to_string()
        };
        serde_json::from_str(&source).map_err(|_| DispatchError::Decode {
            excerpt: excerpt(raw),
        })
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

/// Wrap bytes as `{"base64": "..."}` so binary content survives the JSON
/// transport as opaque text.
pub fn wrap_base64(bytes: &[u8]) -> Value {
    serde_json::json!({ "base64": BASE64.encode(bytes) })
}

/// Inverse of [`wrap_base64`].  Returns `None` when the value is not a
/// base64 wrapper or the payload does not decode.
pub fn unwrap_base64(value: &Value) -> Option<Vec<u8>> {
    let encoded = value.as_object()?.get("base64")?.as_str()?;
    BASE64.decode(encoded).ok()
}

/// Remove `//` line and `/* */` block comments outside string literals.
pub fn strip_json_comments(src: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        InString,
        Escaped,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(src.len());
    let mut state = State::Code;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '"' => {
                    state = State::InString;
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                _ => out.push(c),
            },
            State::InString => match c {
                '\\' => {
                    state = State::Escaped;
                    out.push(c);
                }
                '"' => {
                    state = State::Code;
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::Escaped => {
                state = State::InString;
                out.push(c);
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push(c);
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
        }
    }
    out
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_LEN).collect()
}
