//! Shop: gear purchases and sale pricing.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::inventory::Inventory;
use super::item::{Category, InventoryItem};
use crate::config::ShopConfig;
use crate::core::PlayerId;
use crate::error::{GameError, GameResult};
use crate::store::Account;

/// Cash credited for selling one unit of `item`.
///
/// Equipment uses the fixed price table, falling back to a percentage of
/// unit value. Cosmetics sell for their value, but never below the floor
/// for their rarity.
pub fn sale_price(shop: &ShopConfig, item: &InventoryItem) -> i64 {
    match item.category {
        Category::Equipment => shop
            .sale_prices
            .get(&item.name)
            .copied()
            .unwrap_or(item.value * shop.equipment_sale_percent / 100),
        Category::Cosmetic(rarity) => {
            let floor = shop.cosmetic_floor.get(&rarity).copied().unwrap_or(0);
            item.value.max(floor)
        }
    }
}

/// Completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Stack after the purchase.
    pub item: InventoryItem,
    /// Units bought.
    pub quantity: u32,
    /// Cash spent.
    pub total: i64,
    /// Cash balance afterwards.
    pub cash_after: i64,
}

impl Inventory {
    /// Buy `quantity` units of shop listing `number` (1-based).
    ///
    /// Cash is debited first; if the items cannot be stored the debit is
    /// refunded.
    pub fn purchase(&self, buyer: &PlayerId, number: usize, quantity: u32) -> GameResult<Purchase> {
        let listing = self
            .shop
            .listing(number)
            .ok_or(GameError::UnknownListing(number))?
            .clone();
        if quantity == 0 {
            return Err(GameError::NonPositiveAmount(0));
        }
        let total = listing
            .price
            .checked_mul(quantity as i64)
            .ok_or_else(|| GameError::InvalidArgument("quantity too large".into()))?;

        self.locked(&[buyer], |tx| {
            let cash_after = tx.adjust(buyer, Account::Cash, -total)?;
            match self.grant_in(buyer, &listing.name, Category::Equipment, listing.price, quantity) {
                Ok(item) => {
                    info!(buyer = %buyer, item = %listing.name, quantity, total, "Purchase");
                    Ok(Purchase {
                        item,
                        quantity,
                        total,
                        cash_after,
                    })
                }
                Err(e) => {
                    if let Err(refund) = tx.adjust(buyer, Account::Cash, total) {
                        error!(buyer = %buyer, total, error = %refund, "Purchase refund failed");
                    }
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EconomyRules;
    use crate::core::{ItemId, SystemClock};
    use crate::economy::item::Rarity;
    use crate::economy::ledger::Ledger;
    use crate::store::MemoryStore;

    fn item(name: &str, category: Category, value: i64) -> InventoryItem {
        InventoryItem {
            id: ItemId::new("00000000"),
            owner: PlayerId::new("alice"),
            name: name.into(),
            category,
            value,
            count: 1,
        }
    }

    #[test]
    fn test_sale_prices() {
        let shop = ShopConfig::default();
        assert_eq!(sale_price(&shop, &item("Balaclava", Category::Equipment, 1000)), 500);
        assert_eq!(sale_price(&shop, &item("Rope", Category::Equipment, 80)), 40);
        assert_eq!(sale_price(&shop, &item("Tin", Category::Cosmetic(Rarity::Common), 10)), 100);
        assert_eq!(
            sale_price(&shop, &item("Star", Category::Cosmetic(Rarity::Legendary), 5000)),
            5000
        );
    }

    #[test]
    fn test_purchase_with_quantity() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::new(store.clone(), Arc::new(SystemClock), EconomyRules::default()));
        let inv = Inventory::new(store, ledger.clone(), ShopConfig::default());
        let alice = PlayerId::new("alice");

        let p = inv.purchase(&alice, 2, 3).unwrap();
        assert_eq!(p.total, 300);
        assert_eq!(p.item.count, 3);
        assert_eq!(ledger.cash(&alice).unwrap(), 700);

        let again = inv.purchase(&alice, 2, 1).unwrap();
        assert_eq!(again.item.id, p.item.id);
        assert_eq!(again.item.count, 4);

        assert!(matches!(
            inv.purchase(&alice, 1, 1),
            Err(GameError::InsufficientFunds { .. })
        ));
        assert!(matches!(inv.purchase(&alice, 9, 1), Err(GameError::UnknownListing(9))));
        assert_eq!(inv.count_named(&alice, "Balaclava").unwrap(), 0);
    }
}
