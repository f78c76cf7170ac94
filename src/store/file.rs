//! JSON snapshot store.
//!
//! Holds the full [`Snapshot`] in memory and rewrites the backing file
//! after every mutation (write to `<path>.tmp`, then rename). If the write
//! fails the in-memory change is rolled back and the caller gets
//! [`StoreError::Unavailable`].

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, error, info};

use super::{Account, Snapshot, Store, StoreError, StoreResult};
use crate::core::{ItemId, PlayerId};
use crate::economy::item::{CatalogEntry, InventoryItem, Rarity};

/// File-backed store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<Snapshot>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = fs::read(&path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            Snapshot::default()
        };
        info!(path = %path.display(), players = data.accounts.len(), "Opened store");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the prize catalog.
    pub fn set_catalog(&self, catalog: Vec<CatalogEntry>) -> StoreResult<()> {
        self.mutate(|d| d.catalog = catalog)
    }

    fn persist(&self, data: &Snapshot) -> StoreResult<()> {
        let encoded =
            serde_json::to_vec_pretty(data).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &encoded)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        debug!(bytes = encoded.len(), "Store flushed");
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut data = self.data.write();
        let before = data.clone();
        f(&mut data);
        if let Err(e) = self.persist(&data) {
            error!(path = %self.path.display(), error = %e, "Store write failed, rolling back");
            *data = before;
            return Err(e);
        }
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn balance(&self, player: &PlayerId, account: Account) -> StoreResult<Option<i64>> {
        Ok(self.data.read().balance(player, account))
    }

    fn set_balance(&self, player: &PlayerId, account: Account, amount: i64) -> StoreResult<()> {
        self.mutate(|d| d.set_balance(player, account, amount))
    }

    fn players(&self) -> StoreResult<Vec<PlayerId>> {
        Ok(self.data.read().accounts.keys().cloned().collect())
    }

    fn item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<Option<InventoryItem>> {
        Ok(self.data.read().item(owner, id))
    }

    fn put_item(&self, item: &InventoryItem) -> StoreResult<()> {
        self.mutate(|d| d.put_item(item))
    }

    fn delete_item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()> {
        self.mutate(|d| d.delete_item(owner, id))
    }

    fn items(&self, owner: &PlayerId) -> StoreResult<Vec<InventoryItem>> {
        Ok(self.data.read().items(owner))
    }

    fn equipped(&self, owner: &PlayerId) -> StoreResult<Option<ItemId>> {
        Ok(self.data.read().equipped.get(owner).cloned())
    }

    fn set_equipped(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()> {
        self.mutate(|d| {
            d.equipped.insert(owner.clone(), id.clone());
        })
    }

    fn clear_equipped(&self, owner: &PlayerId) -> StoreResult<()> {
        self.mutate(|d| {
            d.equipped.remove(owner);
        })
    }

    fn catalog(&self, rarity: Rarity) -> StoreResult<Vec<CatalogEntry>> {
        Ok(self.data.read().catalog(rarity))
    }

    fn blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.read().blobs.get(key).cloned())
    }

    fn set_blob(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.mutate(|d| {
            d.blobs.insert(key.to_string(), value.to_vec());
        })
    }

    fn delete_blob(&self, key: &str) -> StoreResult<()> {
        self.mutate(|d| {
            d.blobs.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let alice = PlayerId::new("alice");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set_balance(&alice, Account::Cash, 1234).unwrap();
            store.set_blob("k", b"v").unwrap();
            store
                .set_catalog(vec![CatalogEntry::new("Bronze", Rarity::Common, 100)])
                .unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.balance(&alice, Account::Cash).unwrap(), Some(1234));
        assert_eq!(store.blob("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.catalog(Rarity::Common).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("store.json");
        let store = JsonFileStore::open(&path).unwrap();
        let alice = PlayerId::new("alice");

        let result = store.set_balance(&alice, Account::Cash, 10);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.balance(&alice, Account::Cash).unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Corrupt { .. })));
    }
}
