//! Stream identifier type

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a stream
///
/// Callers treat the token as a black box. Server-generated identifiers are
/// v4 UUIDs in simple form, which makes them collision-resistant and
/// unguessable; path-addressed broadcasters may supply their own token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StreamId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for StreamId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_non_empty() {
        let id = StreamId::generate();
        assert!(!id.as_str().is_empty());
        assert_eq!(id.as_str().len(), 32);
    }

    #[test]
    fn test_generate_unique() {
        let a = StreamId::generate();
        let b = StreamId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_transparent() {
        let id = StreamId::from("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");

        let back: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
