//! Reward Distribution
//!
//! Rolls a rarity tier for the session prize, then picks a concrete
//! nameplate of that tier from the catalog.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::item::{CatalogEntry, Rarity};
use crate::config::RewardOdds;
use crate::core::rng::choose;
use crate::core::RandomSource;
use crate::error::{GameError, GameResult};
use crate::store::Store;

/// Prize chosen for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedReward {
    /// Rolled tier.
    pub rarity: Rarity,
    /// Concrete prize.
    pub prize: CatalogEntry,
    /// Whether the tier was empty and the default prize was used.
    pub fallback: bool,
}

/// Map a `[0, 100]` draw to a tier.
pub fn rarity_for_roll(odds: &RewardOdds, roll: u32) -> Rarity {
    if roll <= odds.common_max {
        Rarity::Common
    } else if roll <= odds.rare_max {
        Rarity::Rare
    } else {
        Rarity::Legendary
    }
}

/// Prize picker.
pub struct RewardTable {
    store: Arc<dyn Store>,
    rng: Arc<dyn RandomSource>,
    odds: RewardOdds,
    default_prize: CatalogEntry,
}

impl RewardTable {
    /// Create the table.
    pub fn new(
        store: Arc<dyn Store>,
        rng: Arc<dyn RandomSource>,
        odds: RewardOdds,
        default_prize: CatalogEntry,
    ) -> Self {
        Self {
            store,
            rng,
            odds,
            default_prize,
        }
    }

    /// Uniform draw over `[0, 100]` mapped to a tier.
    pub fn roll_rarity(&self) -> Rarity {
        let roll = self.rng.below(101) as u32;
        rarity_for_roll(&self.odds, roll)
    }

    /// Uniformly chosen catalog entry of `rarity`.
    pub fn pick_prize(&self, rarity: Rarity) -> GameResult<CatalogEntry> {
        let entries = self.store.catalog(rarity)?;
        choose(self.rng.as_ref(), &entries)
            .cloned()
            .ok_or(GameError::NoPrizeForRarity(rarity))
    }

    /// Roll a tier and pick a prize, falling back to the default prize when
    /// the tier is empty.
    pub fn select(&self) -> GameResult<SelectedReward> {
        let rarity = self.roll_rarity();
        match self.pick_prize(rarity) {
            Ok(prize) => {
                debug!(%rarity, prize = %prize.name, "Reward selected");
                Ok(SelectedReward {
                    rarity,
                    prize,
                    fallback: false,
                })
            }
            Err(GameError::NoPrizeForRarity(_)) => {
                warn!(%rarity, "Catalog tier empty, using default prize");
                Ok(SelectedReward {
                    rarity,
                    prize: self.default_prize.clone(),
                    fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ScriptedRng, SeededRng};
    use crate::store::MemoryStore;

    fn table(rng: Arc<dyn RandomSource>, catalog: Vec<CatalogEntry>) -> RewardTable {
        RewardTable::new(
            Arc::new(MemoryStore::with_catalog(catalog)),
            rng,
            RewardOdds::default(),
            CatalogEntry::new("Participant", Rarity::Common, 100),
        )
    }

    #[test]
    fn test_thresholds() {
        let odds = RewardOdds::default();
        assert_eq!(rarity_for_roll(&odds, 0), Rarity::Common);
        assert_eq!(rarity_for_roll(&odds, 79), Rarity::Common);
        assert_eq!(rarity_for_roll(&odds, 80), Rarity::Rare);
        assert_eq!(rarity_for_roll(&odds, 94), Rarity::Rare);
        assert_eq!(rarity_for_roll(&odds, 95), Rarity::Legendary);
        assert_eq!(rarity_for_roll(&odds, 100), Rarity::Legendary);
    }

    #[test]
    fn test_distribution_over_many_draws() {
        let t = table(Arc::new(SeededRng::new(2024)), vec![]);
        let n = 100_000;
        let (mut common, mut rare, mut legendary) = (0u32, 0u32, 0u32);
        for _ in 0..n {
            match t.roll_rarity() {
                Rarity::Common => common += 1,
                Rarity::Rare => rare += 1,
                Rarity::Legendary => legendary += 1,
            }
        }
        let pct = |c: u32| c as f64 * 100.0 / n as f64;
        assert!((79.0..=81.0).contains(&pct(common)), "common {}", pct(common));
        assert!((14.0..=16.0).contains(&pct(rare)), "rare {}", pct(rare));
        assert!((5.0..=7.0).contains(&pct(legendary)), "legendary {}", pct(legendary));
    }

    #[test]
    fn test_pick_prize_from_tier() {
        let rng = Arc::new(ScriptedRng::new([1]));
        let t = table(
            rng,
            vec![
                CatalogEntry::new("Bronze", Rarity::Common, 100),
                CatalogEntry::new("Gold", Rarity::Legendary, 2000),
                CatalogEntry::new("Iron", Rarity::Common, 120),
            ],
        );
        assert_eq!(t.pick_prize(Rarity::Common).unwrap().name, "Iron");
        assert_eq!(
            t.pick_prize(Rarity::Rare).unwrap_err(),
            GameError::NoPrizeForRarity(Rarity::Rare)
        );
    }

    #[test]
    fn test_select_falls_back() {
        let rng = Arc::new(ScriptedRng::new([90]));
        let t = table(rng, vec![CatalogEntry::new("Bronze", Rarity::Common, 100)]);
        let reward = t.select().unwrap();
        assert_eq!(reward.rarity, Rarity::Rare);
        assert!(reward.fallback);
        assert_eq!(reward.prize.name, "Participant");
    }
}
