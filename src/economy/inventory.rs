//! # Inventory & Equipment
//!
//! Owns item stacks per player and the single "worn" nameplate reference.
//!
//! Every public operation runs inside [`Ledger::atomically`] for the players
//! it touches, so inventory and balance changes made by one operation are
//! never interleaved with another operation on the same player. The
//! `*_in` variants assume the caller already holds those locks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::item::{CatalogEntry, Category, InventoryItem};
use super::ledger::{Ledger, LedgerTx};
use super::shop;
use crate::config::ShopConfig;
use crate::core::hash::{item_id, prize_item_id};
use crate::core::{ItemId, PlayerId};
use crate::error::{GameError, GameResult};
use crate::store::{Account, Store};

/// Result of selling one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Stack as it was before the sale.
    pub item: InventoryItem,
    /// Cash credited.
    pub price: i64,
    /// Cash balance after the sale.
    pub cash_after: i64,
    /// Whether the sold stack had been worn.
    pub was_equipped: bool,
}

/// Inventory engine.
pub struct Inventory {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) shop: ShopConfig,
}

impl Inventory {
    /// Create the engine.
    pub fn new(store: Arc<dyn Store>, ledger: Arc<Ledger>, shop: ShopConfig) -> Self {
        Self { store, ledger, shop }
    }

    /// Shop configuration in effect.
    pub fn shop(&self) -> &ShopConfig {
        &self.shop
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All stacks held by `owner`.
    pub fn items(&self, owner: &PlayerId) -> GameResult<Vec<InventoryItem>> {
        Ok(self.store.items(owner)?)
    }

    /// Total units held.
    pub fn unit_count(&self, owner: &PlayerId) -> GameResult<u32> {
        Ok(self.store.items(owner)?.iter().map(|i| i.count).sum())
    }

    /// Sum of unit value times count.
    pub fn valuation(&self, owner: &PlayerId) -> GameResult<i64> {
        Ok(self.store.items(owner)?.iter().map(InventoryItem::stack_value).sum())
    }

    /// Units of a named item held.
    pub fn count_named(&self, owner: &PlayerId, name: &str) -> GameResult<u32> {
        Ok(self
            .store
            .items(owner)?
            .iter()
            .filter(|i| i.name == name)
            .map(|i| i.count)
            .sum())
    }

    /// The worn item, if any.
    pub fn equipped(&self, owner: &PlayerId) -> GameResult<Option<InventoryItem>> {
        self.ledger.atomically(&[owner], |_| self.equipped_in(owner))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Grant one unit of a purchasable item. Identical grants share a stack.
    pub fn grant(
        &self,
        owner: &PlayerId,
        name: &str,
        category: Category,
        value: i64,
    ) -> GameResult<InventoryItem> {
        self.ledger.atomically(&[owner], |_| self.grant_in(owner, name, category, value, 1))
    }

    /// Grant one prize drop.
    pub fn grant_prize(&self, owner: &PlayerId, prize: &CatalogEntry) -> GameResult<InventoryItem> {
        self.ledger.atomically(&[owner], |_| {
            self.add_unit_in(owner, &prize.name, Category::Cosmetic(prize.rarity), prize.value)
        })
    }

    /// Use up one unit of the named item.
    pub fn consume(&self, owner: &PlayerId, name: &str) -> GameResult<InventoryItem> {
        self.ledger.atomically(&[owner], |_| self.consume_in(owner, name))
    }

    /// Sell one unit of stack `id` for its configured sale price.
    pub fn sell(&self, owner: &PlayerId, id: &ItemId) -> GameResult<Sale> {
        self.ledger.atomically(&[owner], |tx| {
            let item = self.find_in(owner, id)?;
            let price = shop::sale_price(&self.shop, &item);
            let was_equipped = self.store.equipped(owner)?.as_ref() == Some(id);

            if was_equipped {
                self.store.clear_equipped(owner)?;
            }
            if let Err(e) = self.take_unit_in(&item) {
                self.restore_equip(owner, id, was_equipped);
                return Err(e);
            }
            let cash_after = match tx.adjust(owner, Account::Cash, price) {
                Ok(cash) => cash,
                Err(e) => {
                    self.restore_item(&item);
                    self.restore_equip(owner, id, was_equipped);
                    return Err(e);
                }
            };

            info!(owner = %owner, item = %item.name, price, "Item sold");
            Ok(Sale {
                item,
                price,
                cash_after,
                was_equipped,
            })
        })
    }

    /// Wear stack `id`, replacing whatever was worn.
    pub fn equip(&self, owner: &PlayerId, id: &ItemId) -> GameResult<InventoryItem> {
        self.ledger.atomically(&[owner], |_| {
            let item = self.find_in(owner, id)?;
            if !item.category.is_cosmetic() {
                return Err(GameError::InvalidArgument(format!("{} cannot be worn", item.name)));
            }
            self.store.clear_equipped(owner)?;
            self.store.set_equipped(owner, id)?;
            debug!(owner = %owner, item = %item.name, "Equipped");
            Ok(item)
        })
    }

    /// Stop wearing the current item.
    pub fn unequip(&self, owner: &PlayerId) -> GameResult<InventoryItem> {
        self.ledger.atomically(&[owner], |_| {
            let item = self
                .equipped_in(owner)?
                .ok_or_else(|| GameError::NothingEquipped(owner.clone()))?;
            self.store.clear_equipped(owner)?;
            debug!(owner = %owner, item = %item.name, "Unequipped");
            Ok(item)
        })
    }

    /// Hand one unit of stack `id` to another player.
    pub fn give(&self, from: &PlayerId, to: &PlayerId, id: &ItemId) -> GameResult<InventoryItem> {
        if from == to {
            return Err(GameError::SelfTarget(from.clone()));
        }
        self.ledger.atomically(&[from, to], |_| {
            let item = self.find_in(from, id)?;
            let was_equipped = self.store.equipped(from)?.as_ref() == Some(id);
            let moved = self
                .take_unit_in(&item)
                .and_then(|()| self.add_unit_in(to, &item.name, item.category, item.value));
            match moved {
                Ok(received) => {
                    info!(from = %from, to = %to, item = %item.name, "Item given");
                    Ok(received)
                }
                Err(e) => {
                    self.restore_item(&item);
                    self.restore_equip(from, id, was_equipped);
                    Err(e)
                }
            }
        })
    }

    // =========================================================================
    // Lock-held primitives
    // =========================================================================

    pub(crate) fn find_in(&self, owner: &PlayerId, id: &ItemId) -> GameResult<InventoryItem> {
        self.store
            .item(owner, id)?
            .filter(|i| i.count > 0)
            .ok_or_else(|| GameError::ItemIdNotFound {
                owner: owner.clone(),
                id: id.clone(),
            })
    }

    /// Worn item; a reference to a stack that no longer exists is cleared.
    pub(crate) fn equipped_in(&self, owner: &PlayerId) -> GameResult<Option<InventoryItem>> {
        let Some(id) = self.store.equipped(owner)? else {
            return Ok(None);
        };
        match self.store.item(owner, &id)? {
            Some(item) if item.count > 0 => Ok(Some(item)),
            _ => {
                self.store.clear_equipped(owner)?;
                Ok(None)
            }
        }
    }

    pub(crate) fn grant_in(
        &self,
        owner: &PlayerId,
        name: &str,
        category: Category,
        value: i64,
        count: u32,
    ) -> GameResult<InventoryItem> {
        if let Some(mut stack) = self.matching_stack(owner, name, category, value)? {
            stack.count = stack.count.saturating_add(count);
            self.store.put_item(&stack)?;
            return Ok(stack);
        }

        let mut id = item_id(owner, name, value);
        if self.store.item(owner, &id)?.is_some() {
            id = prize_item_id(owner, name, &uuid::Uuid::new_v4());
        }
        let stack = InventoryItem {
            id,
            owner: owner.clone(),
            name: name.to_string(),
            category,
            value,
            count,
        };
        self.store.put_item(&stack)?;
        Ok(stack)
    }

    /// Add one unit, merging into a same name+value stack or minting a
    /// unique stack.
    pub(crate) fn add_unit_in(
        &self,
        owner: &PlayerId,
        name: &str,
        category: Category,
        value: i64,
    ) -> GameResult<InventoryItem> {
        if let Some(mut stack) = self.matching_stack(owner, name, category, value)? {
            stack.count = stack.count.saturating_add(1);
            self.store.put_item(&stack)?;
            return Ok(stack);
        }
        let stack = InventoryItem {
            id: prize_item_id(owner, name, &uuid::Uuid::new_v4()),
            owner: owner.clone(),
            name: name.to_string(),
            category,
            value,
            count: 1,
        };
        self.store.put_item(&stack)?;
        Ok(stack)
    }

    pub(crate) fn consume_in(&self, owner: &PlayerId, name: &str) -> GameResult<InventoryItem> {
        let item = self
            .store
            .items(owner)?
            .into_iter()
            .find(|i| i.name == name && i.count > 0)
            .ok_or_else(|| GameError::ItemNotFound {
                owner: owner.clone(),
                name: name.to_string(),
            })?;
        self.take_unit_in(&item)?;
        debug!(owner = %owner, item = %name, left = item.count - 1, "Consumed");
        Ok(item)
    }

    /// Remove one unit of `item`, deleting the stack (and any reference to
    /// it) when the count reaches zero.
    pub(crate) fn take_unit_in(&self, item: &InventoryItem) -> GameResult<()> {
        if item.count > 1 {
            let mut next = item.clone();
            next.count -= 1;
            self.store.put_item(&next)?;
        } else {
            self.store.delete_item(&item.owner, &item.id)?;
            if self.store.equipped(&item.owner)?.as_ref() == Some(&item.id) {
                self.store.clear_equipped(&item.owner)?;
            }
        }
        Ok(())
    }

    pub(crate) fn restore_item(&self, item: &InventoryItem) {
        if let Err(e) = self.store.put_item(item) {
            error!(owner = %item.owner, item = %item.name, error = %e, "Item rollback failed");
        }
    }

    pub(crate) fn restore_equip(&self, owner: &PlayerId, id: &ItemId, was_equipped: bool) {
        if was_equipped {
            if let Err(e) = self.store.set_equipped(owner, id) {
                error!(owner = %owner, error = %e, "Equip rollback failed");
            }
        }
    }

    fn matching_stack(
        &self,
        owner: &PlayerId,
        name: &str,
        category: Category,
        value: i64,
    ) -> GameResult<Option<InventoryItem>> {
        Ok(self
            .store
            .items(owner)?
            .into_iter()
            .find(|i| i.name == name && i.value == value && i.category == category))
    }

    /// Run `f` under the locks of `players` with access to the ledger.
    pub(crate) fn locked<R, F>(&self, players: &[&PlayerId], f: F) -> GameResult<R>
    where
        F: FnOnce(&LedgerTx<'_>) -> GameResult<R>,
    {
        self.ledger.atomically(players, f)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomyRules;
    use crate::core::SystemClock;
    use crate::economy::item::Rarity;
    use crate::store::faulty::{FaultyStore, Write};

    fn setup() -> (Arc<FaultyStore>, Arc<Ledger>, Inventory) {
        let store = Arc::new(FaultyStore::new());
        let ledger = Arc::new(Ledger::new(store.clone(), Arc::new(SystemClock), EconomyRules::default()));
        let inventory = Inventory::new(store.clone(), ledger.clone(), ShopConfig::default());
        (store, ledger, inventory)
    }

    fn plate(name: &str, rarity: Rarity, value: i64) -> CatalogEntry {
        CatalogEntry::new(name, rarity, value)
    }

    #[test]
    fn test_grant_merges_identical() {
        let (_, _, inv) = setup();
        let alice = PlayerId::new("alice");
        let a = inv.grant(&alice, "Balaclava", Category::Equipment, 1000).unwrap();
        let b = inv.grant(&alice, "Balaclava", Category::Equipment, 1000).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.count, 2);
        assert_eq!(inv.items(&alice).unwrap().len(), 1);

        inv.grant(&alice, "Balaclava", Category::Equipment, 900).unwrap();
        assert_eq!(inv.items(&alice).unwrap().len(), 2);
    }

    #[test]
    fn test_consume_deletes_at_zero() {
        let (_, _, inv) = setup();
        let alice = PlayerId::new("alice");
        inv.grant(&alice, "Binoculars", Category::Equipment, 100).unwrap();
        inv.consume(&alice, "Binoculars").unwrap();
        assert!(inv.items(&alice).unwrap().is_empty());
        assert!(matches!(
            inv.consume(&alice, "Binoculars"),
            Err(GameError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_grant_then_sell_is_item_neutral() {
        let (_, ledger, inv) = setup();
        let alice = PlayerId::new("alice");
        let item = inv.grant_prize(&alice, &plate("Silver", Rarity::Rare, 300)).unwrap();
        let before = ledger.cash(&alice).unwrap();

        let sale = inv.sell(&alice, &item.id).unwrap();
        assert_eq!(sale.price, 500);
        assert!(inv.items(&alice).unwrap().is_empty());
        assert_eq!(ledger.cash(&alice).unwrap(), before + 500);
    }

    #[test]
    fn test_selling_equipped_clears_reference() {
        let (store, _, inv) = setup();
        let alice = PlayerId::new("alice");
        let item = inv.grant_prize(&alice, &plate("Gold", Rarity::Legendary, 2500)).unwrap();
        inv.equip(&alice, &item.id).unwrap();

        let sale = inv.sell(&alice, &item.id).unwrap();
        assert!(sale.was_equipped);
        assert_eq!(sale.price, 2500);
        assert_eq!(store.equipped(&alice).unwrap(), None);
    }

    #[test]
    fn test_sell_fails_closed_when_offline() {
        let (store, ledger, inv) = setup();
        let alice = PlayerId::new("alice");
        let item = inv.grant_prize(&alice, &plate("Bronze", Rarity::Common, 100)).unwrap();
        ledger.cash(&alice).unwrap();

        store.set_offline(true);
        assert!(inv.sell(&alice, &item.id).is_err());
        store.set_offline(false);
        assert_eq!(inv.items(&alice).unwrap().len(), 1);
        assert_eq!(ledger.cash(&alice).unwrap(), 1000);
    }

    #[test]
    fn test_sell_restores_worn_slot_when_delete_fails() {
        let (store, ledger, inv) = setup();
        let alice = PlayerId::new("alice");
        let item = inv.grant_prize(&alice, &plate("Bronze", Rarity::Common, 100)).unwrap();
        inv.equip(&alice, &item.id).unwrap();
        store.fail_for(Write::DeleteItem, &alice);

        assert!(inv.sell(&alice, &item.id).is_err());
        store.heal();
        assert_eq!(inv.equipped(&alice).unwrap(), Some(item));
        assert_eq!(ledger.cash(&alice).unwrap(), 1000);
    }

    #[test]
    fn test_unequip_fails_closed() {
        let (store, _, inv) = setup();
        let alice = PlayerId::new("alice");
        let item = inv.grant_prize(&alice, &plate("Bronze", Rarity::Common, 100)).unwrap();
        inv.equip(&alice, &item.id).unwrap();
        store.fail_for(Write::ClearEquipped, &alice);

        assert!(inv.unequip(&alice).is_err());
        store.heal();
        assert_eq!(inv.equipped(&alice).unwrap(), Some(item));
    }

    #[test]
    fn test_equip_replaces_previous() {
        let (_, _, inv) = setup();
        let alice = PlayerId::new("alice");
        let a = inv.grant_prize(&alice, &plate("A", Rarity::Common, 100)).unwrap();
        let b = inv.grant_prize(&alice, &plate("B", Rarity::Rare, 500)).unwrap();

        inv.equip(&alice, &a.id).unwrap();
        inv.equip(&alice, &b.id).unwrap();
        assert_eq!(inv.equipped(&alice).unwrap().map(|i| i.id), Some(b.id));
        assert_eq!(inv.items(&alice).unwrap().len(), 2);
    }

    #[test]
    fn test_equip_rejects_unknown_and_equipment() {
        let (_, _, inv) = setup();
        let alice = PlayerId::new("alice");
        assert!(matches!(
            inv.equip(&alice, &ItemId::new("deadbeef")),
            Err(GameError::ItemIdNotFound { .. })
        ));
        let gear = inv.grant(&alice, "Balaclava", Category::Equipment, 1000).unwrap();
        assert!(matches!(inv.equip(&alice, &gear.id), Err(GameError::InvalidArgument(_))));
    }

    #[test]
    fn test_unequip_requires_worn_item() {
        let (_, _, inv) = setup();
        let alice = PlayerId::new("alice");
        assert!(matches!(inv.unequip(&alice), Err(GameError::NothingEquipped(_))));

        let a = inv.grant_prize(&alice, &plate("A", Rarity::Common, 100)).unwrap();
        inv.equip(&alice, &a.id).unwrap();
        assert_eq!(inv.unequip(&alice).unwrap().id, a.id);
        assert_eq!(inv.equipped(&alice).unwrap(), None);
    }

    #[test]
    fn test_give_moves_one_unit() {
        let (_, _, inv) = setup();
        let (alice, bob) = (PlayerId::new("alice"), PlayerId::new("bob"));
        let a = inv.grant_prize(&alice, &plate("A", Rarity::Common, 100)).unwrap();
        inv.equip(&alice, &a.id).unwrap();

        let received = inv.give(&alice, &bob, &a.id).unwrap();
        assert_eq!(received.owner, bob);
        assert!(inv.items(&alice).unwrap().is_empty());
        assert_eq!(inv.equipped(&alice).unwrap(), None);
        assert_eq!(inv.unit_count(&bob).unwrap(), 1);
    }

    #[test]
    fn test_give_restores_worn_item_when_receiver_write_fails() {
        let (store, _, inv) = setup();
        let (alice, bob) = (PlayerId::new("alice"), PlayerId::new("bob"));
        let a = inv.grant_prize(&alice, &plate("A", Rarity::Common, 100)).unwrap();
        inv.equip(&alice, &a.id).unwrap();
        store.fail_for(Write::PutItem, &bob);

        assert!(inv.give(&alice, &bob, &a.id).is_err());
        store.heal();

        assert_eq!(inv.items(&alice).unwrap(), vec![a.clone()]);
        assert_eq!(inv.equipped(&alice).unwrap(), Some(a));
        assert!(inv.items(&bob).unwrap().is_empty());
    }

    #[test]
    fn test_valuation() {
        let (_, _, inv) = setup();
        let alice = PlayerId::new("alice");
        inv.grant(&alice, "Balaclava", Category::Equipment, 1000).unwrap();
        inv.grant(&alice, "Balaclava", Category::Equipment, 1000).unwrap();
        inv.grant_prize(&alice, &plate("A", Rarity::Common, 150)).unwrap();
        assert_eq!(inv.valuation(&alice).unwrap(), 2150);
        assert_eq!(inv.count_named(&alice, "Balaclava").unwrap(), 2);
    }
}
