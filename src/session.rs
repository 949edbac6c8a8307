//! Session identifiers used to correlate queries.

use std::fmt;

/// Opaque correlation key sent with every query of one interaction context.
///
/// Generated fresh for each context and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session identifier (`session_<uuid>`).
    pub fn generate() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4()))
    }

    /// The identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
