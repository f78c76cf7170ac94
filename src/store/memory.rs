//! In-process store.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{Account, Snapshot, Store, StoreError, StoreResult};
use crate::core::{ItemId, PlayerId};
use crate::economy::item::{CatalogEntry, InventoryItem, Rarity};

/// Store backed by in-memory maps.
///
/// `set_offline(true)` makes every call fail with
/// [`StoreError::Unavailable`], which is how fail-closed behaviour is
/// exercised in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            offline: AtomicBool::new(false),
        }
    }

    /// Store with a prize catalog.
    pub fn with_catalog(catalog: Vec<CatalogEntry>) -> Self {
        Self::from_snapshot(Snapshot {
            catalog,
            ..Snapshot::default()
        })
    }

    /// Add a catalog entry.
    pub fn add_catalog_entry(&self, entry: CatalogEntry) {
        self.data.write().catalog.push(entry);
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Snapshot {
        self.data.read().clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Store for MemoryStore {
    fn balance(&self, player: &PlayerId, account: Account) -> StoreResult<Option<i64>> {
        self.check()?;
        Ok(self.data.read().balance(player, account))
    }

    fn set_balance(&self, player: &PlayerId, account: Account, amount: i64) -> StoreResult<()> {
        self.check()?;
        self.data.write().set_balance(player, account, amount);
        Ok(())
    }

    fn players(&self) -> StoreResult<Vec<PlayerId>> {
        self.check()?;
        Ok(self.data.read().accounts.keys().cloned().collect())
    }

    fn item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<Option<InventoryItem>> {
        self.check()?;
        Ok(self.data.read().item(owner, id))
    }

    fn put_item(&self, item: &InventoryItem) -> StoreResult<()> {
        self.check()?;
        self.data.write().put_item(item);
        Ok(())
    }

    fn delete_item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()> {
        self.check()?;
        self.data.write().delete_item(owner, id);
        Ok(())
    }

    fn items(&self, owner: &PlayerId) -> StoreResult<Vec<InventoryItem>> {
        self.check()?;
        Ok(self.data.read().items(owner))
    }

    fn equipped(&self, owner: &PlayerId) -> StoreResult<Option<ItemId>> {
        self.check()?;
        Ok(self.data.read().equipped.get(owner).cloned())
    }

    fn set_equipped(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()> {
        self.check()?;
        self.data.write().equipped.insert(owner.clone(), id.clone());
        Ok(())
    }

    fn clear_equipped(&self, owner: &PlayerId) -> StoreResult<()> {
        self.check()?;
        self.data.write().equipped.remove(owner);
        Ok(())
    }

    fn catalog(&self, rarity: Rarity) -> StoreResult<Vec<CatalogEntry>> {
        self.check()?;
        Ok(self.data.read().catalog(rarity))
    }

    fn blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.data.read().blobs.get(key).cloned())
    }

    fn set_blob(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.check()?;
        self.data.write().blobs.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_blob(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        self.data.write().blobs.remove(key);
        Ok(())
    }
}
