//! Identifiers
//!
//! Stable handles for players, items, sessions and chat messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable player handle (the messaging-platform username, without `@`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Create a handle, stripping a leading `@` if present.
    pub fn new(handle: impl AsRef<str>) -> Self {
        Self(handle.as_ref().trim_start_matches('@').to_string())
    }

    /// Borrow the handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

/// Inventory item identifier (short hex digest).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Unique session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// First four bytes, hex encoded. Used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat the game is played in.
pub type ChatId = i64;

/// Message previously emitted into a chat.
pub type MessageId = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_strips_at() {
        assert_eq!(PlayerId::new("@alice"), PlayerId::new("alice"));
        assert_eq!(PlayerId::new("@alice").to_string(), "@alice");
    }

    #[test]
    fn test_session_id_short() {
        let id = SessionId::generate();
        assert_eq!(id.short().len(), 8);
    }
}
