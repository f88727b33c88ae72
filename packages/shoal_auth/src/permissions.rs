//! Flat permission sets: opaque string tokens with exact membership testing.
//!
//! There is deliberately no hierarchy and no wildcard — a handler either
//! names a token the session holds, or it is denied.  Authentication and
//! logout replace the whole set; nothing merges incrementally.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The set of permission tokens granted to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Exact membership test for a single token.
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    /// Guard check: an empty requirement always passes, otherwise exact
    /// membership decides.
    pub fn allows(&self, required: &str) -> bool {
        required.is_empty() || self.contains(required)
    }

    /// Replace the entire set.  This is the only mutation the protocol
    /// performs — grants never merge.
    pub fn replace_with(&mut self, other: PermissionSet) {
        self.0 = other.0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{token}")?;
            first = false;
        }
        Ok(())
    }
}
