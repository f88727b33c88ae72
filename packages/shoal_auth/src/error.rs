//! Error types for credential handling.

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("bad credentials")]
    BadCredentials,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            AuthError::UnknownUser("ada".into()).to_string(),
            "unknown user: ada"
        );
        assert_eq!(AuthError::BadCredentials.to_string(), "bad credentials");
    }
}
