//! Store wrapper that refuses selected writes, for failure-path tests.

use std::collections::HashSet;

use parking_lot::Mutex;

use super::{Account, MemoryStore, Store, StoreError, StoreResult};
use crate::core::{ItemId, PlayerId};
use crate::economy::item::{CatalogEntry, InventoryItem, Rarity};

/// Mutating store calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Write {
    SetBalance,
    PutItem,
    DeleteItem,
    SetEquipped,
    ClearEquipped,
    SetBlob,
}

/// [`MemoryStore`] whose writes fail for chosen (operation, player) pairs.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<HashSet<(Write, Option<PlayerId>)>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail `op` for `player` only.
    pub(crate) fn fail_for(&self, op: Write, player: &PlayerId) {
        self.faults.lock().insert((op, Some(player.clone())));
    }

    /// Fail `op` for everyone.
    pub(crate) fn fail(&self, op: Write) {
        self.faults.lock().insert((op, None));
    }

    /// Make every call fail, reads included.
    pub(crate) fn set_offline(&self, offline: bool) {
        self.inner.set_offline(offline);
    }

    /// Clear every fault.
    pub(crate) fn heal(&self) {
        self.faults.lock().clear();
    }

    fn check(&self, op: Write, player: Option<&PlayerId>) -> StoreResult<()> {
        let faults = self.faults.lock();
        let hit = faults.contains(&(op, None)) || player.is_some_and(|p| faults.contains(&(op, Some(p.clone()))));
        if hit {
            return Err(StoreError::Unavailable(format!("{:?} refused", op)));
        }
        Ok(())
    }
}

impl Store for FaultyStore {
    fn balance(&self, player: &PlayerId, account: Account) -> StoreResult<Option<i64>> {
        self.inner.balance(player, account)
    }

    fn set_balance(&self, player: &PlayerId, account: Account, amount: i64) -> StoreResult<()> {
        self.check(Write::SetBalance, Some(player))?;
        self.inner.set_balance(player, account, amount)
    }

    fn players(&self) -> StoreResult<Vec<PlayerId>> {
        self.inner.players()
    }

    fn item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<Option<InventoryItem>> {
        self.inner.item(owner, id)
    }

    fn put_item(&self, item: &InventoryItem) -> StoreResult<()> {
        self.check(Write::PutItem, Some(&item.owner))?;
        self.inner.put_item(item)
    }

    fn delete_item(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()> {
        self.check(Write::DeleteItem, Some(owner))?;
        self.inner.delete_item(owner, id)
    }

    fn items(&self, owner: &PlayerId) -> StoreResult<Vec<InventoryItem>> {
        self.inner.items(owner)
    }

    fn equipped(&self, owner: &PlayerId) -> StoreResult<Option<ItemId>> {
        self.inner.equipped(owner)
    }

    fn set_equipped(&self, owner: &PlayerId, id: &ItemId) -> StoreResult<()> {
        self.check(Write::SetEquipped, Some(owner))?;
        self.inner.set_equipped(owner, id)
    }

    fn clear_equipped(&self, owner: &PlayerId) -> StoreResult<()> {
        self.check(Write::ClearEquipped, Some(owner))?;
        self.inner.clear_equipped(owner)
    }

    fn catalog(&self, rarity: Rarity) -> StoreResult<Vec<CatalogEntry>> {
        self.inner.catalog(rarity)
    }

    fn blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.blob(key)
    }

    fn set_blob(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.check(Write::SetBlob, None)?;
        self.inner.set_blob(key, value)
    }

    fn delete_blob(&self, key: &str) -> StoreResult<()> {
        self.inner.delete_blob(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_scoped_to_player() {
        let store = FaultyStore::new();
        let (a, b) = (PlayerId::new("a"), PlayerId::new("b"));
        store.fail_for(Write::SetBalance, &a);

        assert!(store.set_balance(&a, Account::Cash, 1).is_err());
        store.set_balance(&b, Account::Cash, 1).unwrap();

        store.heal();
        store.set_balance(&a, Account::Cash, 2).unwrap();
        assert_eq!(store.balance(&a, Account::Cash).unwrap(), Some(2));
    }
}
