//! Engine configuration.
//!
//! Every constant that shapes a session or the economy lives here, so a
//! deployment can tune odds, windows and shop prices without code changes.
//! Values load from defaults, from JSON, or from `NAMEPLATE_*` environment
//! variables on top of the defaults.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::economy::item::{CatalogEntry, Rarity};
use crate::error::{GameError, GameResult};

/// Waits performed by the session scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// Initial betting window.
    pub initial_betting: Duration,
    /// Pause after betting closes before the first round.
    pub start_delay: Duration,
    /// Delay between elimination rounds.
    pub round_delay: Duration,
    /// Extra pause after each round delay.
    pub round_pause: Duration,
    /// Wait between announcing finalists and opening final bets.
    pub pre_final_delay: Duration,
    /// Final betting window.
    pub final_betting: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            initial_betting: Duration::from_secs(30),
            start_delay: Duration::from_secs(3),
            round_delay: Duration::from_secs(5),
            round_pause: Duration::from_millis(500),
            pre_final_delay: Duration::from_secs(5),
            final_betting: Duration::from_secs(30),
        }
    }
}

impl SessionTimings {
    /// Every wait set to `step`. Used to run whole sessions quickly.
    pub fn uniform(step: Duration) -> Self {
        Self {
            initial_betting: step,
            start_delay: step,
            round_delay: step,
            round_pause: Duration::ZERO,
            pre_final_delay: step,
            final_betting: step,
        }
    }
}

/// Wager rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BettingRules {
    /// Payout multiplier for a winning initial-phase wager.
    pub initial_multiplier: i64,
    /// Payout multiplier for a winning final-phase wager.
    pub final_multiplier: i64,
    /// When set, a bettor who wagered in one phase may not wager in the other.
    pub exclusive_phases: bool,
    /// When set, cancelling a session refunds every open wager.
    pub refund_on_cancel: bool,
    /// Minimum roster size to start a session.
    pub min_participants: usize,
}

impl Default for BettingRules {
    fn default() -> Self {
        Self {
            initial_multiplier: 30,
            final_multiplier: 2,
            exclusive_phases: false,
            refund_on_cancel: false,
            min_participants: 2,
        }
    }
}

/// Odds for a plain cash robbery, as thresholds on a `[0, 100)` draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobberyOdds {
    /// Draws below this succeed.
    pub success_below: u32,
    /// Draws below this (and not successful) get caught.
    pub caught_below: u32,
    /// Minimum penalty when caught.
    pub penalty_floor: i64,
    /// Penalty as a percentage of robber cash, if larger than the floor.
    pub penalty_percent: i64,
}

impl Default for RobberyOdds {
    fn default() -> Self {
        Self {
            success_below: 30,
            caught_below: 60,
            penalty_floor: 1000,
            penalty_percent: 10,
        }
    }
}

/// Plate-robbery success chance per rarity, in percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateOdds {
    /// Common target.
    pub common: u32,
    /// Rare target.
    pub rare: u32,
    /// Legendary target.
    pub legendary: u32,
}

impl Default for PlateOdds {
    fn default() -> Self {
        Self {
            common: 50,
            rare: 25,
            legendary: 10,
        }
    }
}

impl PlateOdds {
    /// Success chance for a target of `rarity`.
    pub fn for_rarity(&self, rarity: Rarity) -> u32 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Rare => self.rare,
            Rarity::Legendary => self.legendary,
        }
    }
}

/// Coin toss thresholds on a `[0, 100)` draw, and payout multipliers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinOdds {
    /// Draws at or below this land heads.
    pub heads_max: u32,
    /// Draws at or below this (above heads) land tails; the rest land on the edge.
    pub tails_max: u32,
    /// Heads payout multiplier.
    pub heads_multiplier: i64,
    /// Tails payout multiplier.
    pub tails_multiplier: i64,
    /// Edge payout multiplier.
    pub edge_multiplier: i64,
}

impl Default for CoinOdds {
    fn default() -> Self {
        Self {
            heads_max: 48,
            tails_max: 97,
            heads_multiplier: 2,
            tails_multiplier: 2,
            edge_multiplier: 100,
        }
    }
}

/// Ledger and player-versus-player rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyRules {
    /// Cash given to a player the first time they are seen.
    pub starting_balance: i64,
    /// Daily fine growth in basis points (1000 = 10%).
    pub fine_daily_rate_bp: i64,
    /// Cash robbery odds.
    pub robbery: RobberyOdds,
    /// Plate robbery odds.
    pub plate: PlateOdds,
    /// Scouting success chance, in percent.
    pub scout_success_percent: u32,
    /// Coin toss odds.
    pub coin: CoinOdds,
}

impl Default for EconomyRules {
    fn default() -> Self {
        Self {
            starting_balance: 1000,
            fine_daily_rate_bp: 1000,
            robbery: RobberyOdds::default(),
            plate: PlateOdds::default(),
            scout_success_percent: 70,
            coin: CoinOdds::default(),
        }
    }
}

/// Reward rarity thresholds on a `[0, 100]` draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardOdds {
    /// Draws at or below this are common.
    pub common_max: u32,
    /// Draws at or below this (above common) are rare; the rest legendary.
    pub rare_max: u32,
}

impl Default for RewardOdds {
    fn default() -> Self {
        Self {
            common_max: 79,
            rare_max: 94,
        }
    }
}

/// Consumable gear sold in the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GearKind {
    /// Consumed by robbery and plate robbery.
    Robbery,
    /// Consumed by scouting.
    Scout,
}

/// One shop listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopListing {
    /// Item name granted on purchase.
    pub name: String,
    /// Price per unit.
    pub price: i64,
    /// Which action the gear enables.
    pub gear: GearKind,
}

/// Shop listings and sale prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    /// Listings, addressed by 1-based position.
    pub listings: Vec<ShopListing>,
    /// Fixed sale prices for equipment, by item name.
    pub sale_prices: BTreeMap<String, i64>,
    /// Sale price for unlisted equipment, as a percentage of unit value.
    pub equipment_sale_percent: i64,
    /// Lowest sale price per rarity for cosmetics.
    pub cosmetic_floor: BTreeMap<Rarity, i64>,
}

impl Default for ShopConfig {
    fn default() -> Self {
        let listings = vec![
            ShopListing {
                name: "Balaclava".into(),
                price: 1000,
                gear: GearKind::Robbery,
            },
            ShopListing {
                name: "Binoculars".into(),
                price: 100,
                gear: GearKind::Scout,
            },
        ];
        let sale_prices = BTreeMap::from([("Balaclava".to_string(), 500), ("Binoculars".to_string(), 50)]);
        let cosmetic_floor =
            BTreeMap::from([(Rarity::Common, 100), (Rarity::Rare, 500), (Rarity::Legendary, 2000)]);
        Self {
            listings,
            sale_prices,
            equipment_sale_percent: 50,
            cosmetic_floor,
        }
    }
}

impl ShopConfig {
    /// Item name of the first listing of `gear`.
    pub fn gear_name(&self, gear: GearKind) -> Option<&str> {
        self.listings
            .iter()
            .find(|l| l.gear == gear)
            .map(|l| l.name.as_str())
    }

    /// Listing by 1-based number.
    pub fn listing(&self, number: usize) -> Option<&ShopListing> {
        number.checked_sub(1).and_then(|i| self.listings.get(i))
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler waits.
    pub timings: SessionTimings,
    /// Wager rules.
    pub betting: BettingRules,
    /// Ledger rules.
    pub economy: EconomyRules,
    /// Reward rarity odds.
    pub rewards: RewardOdds,
    /// Shop.
    pub shop: ShopConfig,
    /// Prize used when the rolled tier has no catalog entries.
    pub default_prize: CatalogEntry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timings: SessionTimings::default(),
            betting: BettingRules::default(),
            economy: EconomyRules::default(),
            rewards: RewardOdds::default(),
            shop: ShopConfig::default(),
            default_prize: CatalogEntry::new("Participant", Rarity::Common, 100),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key).ok()?.parse().ok().map(Duration::from_secs)
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v == "true" || v == "1")
}

impl EngineConfig {
    /// Defaults overridden by `NAMEPLATE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let t = &mut config.timings;
        if let Some(d) = env_secs("NAMEPLATE_INITIAL_BETTING_SECS") {
            t.initial_betting = d;
        }
        if let Some(d) = env_secs("NAMEPLATE_ROUND_DELAY_SECS") {
            t.round_delay = d;
        }
        if let Some(d) = env_secs("NAMEPLATE_PRE_FINAL_SECS") {
            t.pre_final_delay = d;
        }
        if let Some(d) = env_secs("NAMEPLATE_FINAL_BETTING_SECS") {
            t.final_betting = d;
        }
        if let Some(balance) = std::env::var("NAMEPLATE_STARTING_BALANCE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.economy.starting_balance = balance;
        }
        if let Some(flag) = env_flag("NAMEPLATE_REFUND_ON_CANCEL") {
            config.betting.refund_on_cancel = flag;
        }
        if let Some(flag) = env_flag("NAMEPLATE_EXCLUSIVE_PHASES") {
            config.betting.exclusive_phases = flag;
        }
        config
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> GameResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GameError::InvalidArgument(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject threshold tables that cannot describe a distribution.
    pub fn validate(&self) -> GameResult<()> {
        let bad = |msg: &str| Err(GameError::InvalidArgument(format!("config: {}", msg)));
        if self.rewards.common_max > self.rewards.rare_max || self.rewards.rare_max > 100 {
            return bad("reward thresholds must satisfy common_max <= rare_max <= 100");
        }
        let r = &self.economy.robbery;
        if r.success_below > r.caught_below || r.caught_below > 100 {
            return bad("robbery thresholds must satisfy success_below <= caught_below <= 100");
        }
        let c = &self.economy.coin;
        if c.heads_max > c.tails_max || c.tails_max > 99 {
            return bad("coin thresholds must satisfy heads_max <= tails_max <= 99");
        }
        if self.economy.starting_balance < 0 {
            return bad("starting balance cannot be negative");
        }
        if self.betting.min_participants < 2 {
            return bad("a session needs at least two participants");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timings.initial_betting, Duration::from_secs(30));
        assert_eq!(config.betting.initial_multiplier, 30);
        assert_eq!(config.betting.final_multiplier, 2);
        assert_eq!(config.economy.starting_balance, 1000);
        assert_eq!(config.shop.gear_name(GearKind::Robbery), Some("Balaclava"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{"betting": {"refund_on_cancel": true}}"#).unwrap();
        assert!(config.betting.refund_on_cancel);
        assert_eq!(config.betting.initial_multiplier, 30);
    }

    #[test]
    fn test_invalid_thresholds() {
        let json = r#"{"rewards": {"common_max": 95, "rare_max": 90}}"#;
        assert!(EngineConfig::from_json(json).is_err());
    }

    #[test]
    fn test_listing_is_one_based() {
        let shop = ShopConfig::default();
        assert_eq!(shop.listing(1).map(|l| l.price), Some(1000));
        assert!(shop.listing(0).is_none());
        assert!(shop.listing(3).is_none());
    }
}
