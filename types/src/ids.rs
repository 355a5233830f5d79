use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Session used when a caller supplies no id (or only whitespace).
pub const DEFAULT_SESSION_ID: &str = "default-session";

/// Number of hex characters kept from the SHA-256 digest.
const ENTITY_ID_HEX_LEN: usize = 16;

/// Identifies one trust-score session.
///
/// Always trimmed and non-empty; blank input collapses to [`DEFAULT_SESSION_ID`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Normalize an optional caller-supplied id.
    #[must_use]
    pub fn from_optional(raw: Option<&str>) -> Self {
        raw.map_or_else(Self::default, Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(DEFAULT_SESSION_ID.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short content-addressed identifier for a monitored entity.
///
/// The first 16 hex characters of a SHA-256 digest over a type-prefixed key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    #[must_use]
    pub fn for_image(url: &str) -> Self {
        Self::digest(&format!("image-{url}"))
    }

    #[must_use]
    pub fn for_text(url: &str, title: &str) -> Self {
        Self::digest(&format!("text-{url}-{title}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digest(key: &str) -> Self {
        let hash = Sha256::digest(key.as_bytes());
        let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex[..ENTITY_ID_HEX_LEN].to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_trims_whitespace() {
        assert_eq!(SessionId::new("  abc  ").as_str(), "abc");
    }

    #[test]
    fn blank_session_id_uses_default() {
        assert_eq!(SessionId::new("   ").as_str(), DEFAULT_SESSION_ID);
        assert_eq!(SessionId::from_optional(None).as_str(), DEFAULT_SESSION_ID);
        assert_eq!(
            SessionId::from_optional(Some("")).as_str(),
            DEFAULT_SESSION_ID
        );
    }

    #[test]
    fn session_id_deserializes_through_normalization() {
        let id: SessionId = serde_json::from_str("\"  s-1 \"").expect("valid json");
        assert_eq!(id.as_str(), "s-1");
    }

    #[test]
    fn entity_id_is_sixteen_lowercase_hex() {
        let id = EntityId::for_image("https://example.com/a.png");
        assert_eq!(id.as_str().len(), 16);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn entity_id_matches_sha256_prefix() {
        let id = EntityId::digest("abc");
        assert_eq!(id.as_str(), "ba7816bf8f01cfea");
    }

    #[test]
    fn image_and_text_ids_differ_for_same_url() {
        let url = "https://example.com/story";
        assert_ne!(EntityId::for_image(url), EntityId::for_text(url, ""));
    }
}
