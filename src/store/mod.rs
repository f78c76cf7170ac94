//! Persistence interface.
//!
//! The engine reads and writes all durable state through [`Store`]. Two
//! backends ship with the crate:
//!
//! - [`MemoryStore`] keeps everything in process (tests, demos).
//! - [`JsonFileStore`] snapshots the same data model to a JSON file after
//!   every mutation.
//!
//! Every mutating call either persists or returns [`StoreError`]; the
//! engine never keeps a change that the store refused.

#[cfg(test)]
pub(crate) mod faulty;
pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{ItemId, PlayerId};
use crate::economy::item::{CatalogEntry, InventoryItem, Rarity};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Balance account kinds held per player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Account {
    /// Spendable cash.
    Cash,
    /// Savings, not spendable on wagers.
    Bank,
    /// Outstanding fine.
    Fine,
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend cannot be reached or refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt {
        /// Record key.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable state used by the engine.
pub trait Store: Send + Sync {
    /// Balance of one account, `None` if never written.
    fn balance(&self, player: &PlayerId, account: Account) -> StoreResult<Option<i64>>;

    /// Overwrite one account balance.
    fn set_balance(&self, player: &PlayerId, account: Account, amount: i64) -> StoreResult<()>;

    /// Every player with at least one balance record.
    fn players(&self) -> StoreResult<Vec<PlayerId>>;

    /// One inventory stack.
    fn item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<Option<InventoryItem>>;

    /// Insert or replace an inventory stack (keyed by owner and id).
    fn put_item(&self, item: &InventoryItem) -> StoreResult<()>;

    /// Remove an inventory stack. Missing stacks are not an error.
    fn delete_item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()>;

    /// All stacks held by `owner`, ordered by id.
    fn items(&self, owner: &PlayerId) -> StoreResult<Vec<InventoryItem>>;

    /// Id of the worn item.
    fn equipped(&self, owner: &PlayerId) -> StoreResult<Option<ItemId>>;

    /// Record the worn item.
    fn set_equipped(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()>;

    /// Clear the worn item.
    fn clear_equipped(&self, owner: &PlayerId) -> StoreResult<()>;

    /// Catalog entries of one tier.
    fn catalog(&self, rarity: Rarity) -> StoreResult<Vec<CatalogEntry>>;

    /// Arbitrary keyed blob.
    fn blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a keyed blob.
    fn set_blob(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a keyed blob. Missing keys are not an error.
    fn delete_blob(&self, key: &str) -> StoreResult<()>;
}

// =============================================================================
// SHARED DATA MODEL
// =============================================================================

/// Per-player balance record. `None` means the account was never written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Cash balance.
    pub cash: Option<i64>,
    /// Bank balance.
    pub bank: Option<i64>,
    /// Fine balance.
    pub fine: Option<i64>,
}

impl AccountRecord {
    fn get(&self, account: Account) -> Option<i64> {
        match account {
            Account::Cash => self.cash,
            Account::Bank => self.bank,
            Account::Fine => self.fine,
        }
    }

    fn slot(&mut self, account: Account) -> &mut Option<i64> {
        match account {
            Account::Cash => &mut self.cash,
            Account::Bank => &mut self.bank,
            Account::Fine => &mut self.fine,
        }
    }
}

/// Complete store contents. Both backends operate on this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Balances by player.
    pub accounts: BTreeMap<PlayerId, AccountRecord>,
    /// Inventory stacks by owner, then id.
    pub inventory: BTreeMap<PlayerId, BTreeMap<ItemId, InventoryItem>>,
    /// Worn item by owner.
    pub equipped: BTreeMap<PlayerId, ItemId>,
    /// Prize catalog.
    pub catalog: Vec<CatalogEntry>,
    /// Keyed blobs.
    pub blobs: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub(crate) fn balance(&self, player: &PlayerId, account: Account) -> Option<i64> {
        self.accounts.get(player).and_then(|r| r.get(account))
    }

    pub(crate) fn set_balance(&mut self, player: &PlayerId, account: Account, amount: i64) {
        *self.accounts.entry(player.clone()).or_default().slot(account) = Some(amount);
    }

    pub(crate) fn item(&self, owner: &PlayerId, id: &ItemId) -> Option<InventoryItem> {
        self.inventory.get(owner).and_then(|m| m.get(id)).cloned()
    }

    pub(crate) fn put_item(&mut self, item: &InventoryItem) {
        self.inventory
            .entry(item.owner.clone())
            .or_default()
            .insert(item.id.clone(), item.clone());
    }

    pub(crate) fn delete_item(&mut self, owner: &PlayerId, id: &ItemId) {
        if let Some(stacks) = self.inventory.get_mut(owner) {
            stacks.remove(id);
            if stacks.is_empty() {
                self.inventory.remove(owner);
            }
        }
    }

    pub(crate) fn items(&self, owner: &PlayerId) -> Vec<InventoryItem> {
        self.inventory
            .get(owner)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn catalog(&self, rarity: Rarity) -> Vec<CatalogEntry> {
        self.catalog.iter().filter(|e| e.rarity == rarity).cloned().collect()
    }
}
