//! Item Types
//!
//! Rarity tiers, inventory stacks and prize catalog entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{ItemId, PlayerId};

/// Rarity tier of a cosmetic nameplate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    /// Most frequent tier.
    Common,
    /// Uncommon tier.
    Rare,
    /// Rarest tier.
    Legendary,
}

impl Rarity {
    /// All tiers, most common first.
    pub const ALL: [Rarity; 3] = [Rarity::Common, Rarity::Rare, Rarity::Legendary];

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of thing an inventory stack holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Wearable nameplate with a rarity tier.
    Cosmetic(Rarity),
    /// Consumable shop gear (robbery gear, scout gear). Never wearable.
    Equipment,
}

impl Category {
    /// Rarity for cosmetics, `None` for equipment.
    pub fn rarity(&self) -> Option<Rarity> {
        match self {
            Category::Cosmetic(r) => Some(*r),
            Category::Equipment => None,
        }
    }

    /// Whether the stack can be worn.
    pub fn is_cosmetic(&self) -> bool {
        matches!(self, Category::Cosmetic(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Cosmetic(r) => write!(f, "{}", r),
            Category::Equipment => f.write_str("equipment"),
        }
    }
}

/// A stack of identical items in one player's inventory.
///
/// `count` is always at least 1 while the record exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Stack identifier.
    pub id: ItemId,
    /// Owner.
    pub owner: PlayerId,
    /// Display name.
    pub name: String,
    /// Tier or equipment kind.
    pub category: Category,
    /// Value of a single unit.
    pub value: i64,
    /// Units held.
    pub count: u32,
}

impl InventoryItem {
    /// Total value of the stack.
    pub fn stack_value(&self) -> i64 {
        self.value.saturating_mul(self.count as i64)
    }
}

/// Prize catalog entry, supplied from outside the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Display name.
    pub name: String,
    /// Tier.
    pub rarity: Rarity,
    /// Unit value.
    pub value: i64,
}

impl CatalogEntry {
    /// New catalog entry.
    pub fn new(name: impl Into<String>, rarity: Rarity, value: i64) -> Self {
        Self {
            name: name.into(),
            rarity,
            value,
        }
    }
}
