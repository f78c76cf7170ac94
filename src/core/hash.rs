//! Identifier Hashing
//!
//! Domain-separated SHA-256 helpers used to derive:
//! - Inventory item ids (deterministic for purchases, unique for prize drops)
//! - Participant fingerprints recorded on wagers

use sha2::{Digest, Sha256};

use super::id::{ItemId, PlayerId};

/// Hash output type (256 bits / 32 bytes)
pub type Digest256 = [u8; 32];

/// Hex characters kept in an item id.
pub const ITEM_ID_LEN: usize = 8;

const ITEM_DOMAIN: &[u8] = b"NAMEPLATE_ITEM_V1";
const PRIZE_DOMAIN: &[u8] = b"NAMEPLATE_PRIZE_V1";
const PARTICIPANT_DOMAIN: &[u8] = b"NAMEPLATE_PARTICIPANT_V1";

/// SHA-256 hasher with a domain separator.
///
/// Strings are length-prefixed so `("ab", "c")` and `("a", "bc")` never collide.
pub struct IdHasher {
    hasher: Sha256,
}

impl IdHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest256 {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Digest256 {
    let mut hasher = IdHasher::new(domain);
    hasher.update_bytes(data);
    hasher.finalize()
}

fn short_id(digest: &Digest256) -> ItemId {
    let mut hex = hex::encode(digest);
    hex.truncate(ITEM_ID_LEN);
    ItemId::new(hex)
}

/// Deterministic id for a purchasable item, so repeat purchases land on
/// the same stack.
pub fn item_id(owner: &PlayerId, name: &str, value: i64) -> ItemId {
    let mut hasher = IdHasher::new(ITEM_DOMAIN);
    hasher.update_str(owner.as_str());
    hasher.update_str(name);
    hasher.update_u64(value as u64);
    short_id(&hasher.finalize())
}

/// Unique id for a single prize drop.
pub fn prize_item_id(owner: &PlayerId, name: &str, nonce: &uuid::Uuid) -> ItemId {
    let mut hasher = IdHasher::new(PRIZE_DOMAIN);
    hasher.update_str(owner.as_str());
    hasher.update_str(name);
    hasher.update_bytes(nonce.as_bytes());
    short_id(&hasher.finalize())
}

/// Full hex fingerprint of a participant handle.
pub fn participant_fingerprint(handle: &PlayerId) -> String {
    hex::encode(hash_with_domain(PARTICIPANT_DOMAIN, handle.as_str().as_bytes()))
}

// =============================================================================
// TESTS
// =============================================================================
