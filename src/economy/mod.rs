//! Player economy.
//!
//! Balances, items, the shop and the player-versus-player actions that
//! move both around.

pub mod coin;
pub mod inventory;
pub mod item;
pub mod ledger;
pub mod reward;
pub mod robbery;
pub mod shop;

pub use coin::{CoinSide, CoinToss, TossResult};
pub use inventory::{Inventory, Sale};
pub use item::{CatalogEntry, Category, InventoryItem, Rarity};
pub use ledger::{Balances, Ledger, PenaltyCharge};
pub use reward::{RewardTable, SelectedReward};
pub use robbery::{Heists, PlateRobberyOutcome, RobberyOutcome, ScoutReport};
pub use shop::{sale_price, Purchase};
