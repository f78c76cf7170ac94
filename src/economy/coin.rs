//! Coin toss gamble.
//!
//! A stake on heads, tails or the (rare) edge. A correct call pays
//! `stake × multiplier`; the stake is always debited first.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::ledger::Ledger;
use crate::config::CoinOdds;
use crate::core::{PlayerId, RandomSource};
use crate::error::{GameError, GameResult};
use crate::store::Account;

/// Where the coin can land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    /// Heads.
    Heads,
    /// Tails.
    Tails,
    /// Landed on its edge.
    Edge,
}

impl fmt::Display for CoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoinSide::Heads => "heads",
            CoinSide::Tails => "tails",
            CoinSide::Edge => "edge",
        })
    }
}

impl FromStr for CoinSide {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heads" | "h" => Ok(CoinSide::Heads),
            "tails" | "t" => Ok(CoinSide::Tails),
            "edge" | "e" => Ok(CoinSide::Edge),
            other => Err(GameError::InvalidArgument(format!("unknown coin side {:?}", other))),
        }
    }
}

/// Result of a toss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TossResult {
    /// Side the player called.
    pub call: CoinSide,
    /// Side the coin landed on.
    pub landed: CoinSide,
    /// Stake debited.
    pub stake: i64,
    /// Amount credited back (0 on a loss).
    pub payout: i64,
    /// Cash afterwards.
    pub cash_after: i64,
}

/// Coin toss game.
pub struct CoinToss {
    ledger: Arc<Ledger>,
    rng: Arc<dyn RandomSource>,
    odds: CoinOdds,
}

impl CoinToss {
    /// Create the game.
    pub fn new(ledger: Arc<Ledger>, rng: Arc<dyn RandomSource>, odds: CoinOdds) -> Self {
        Self { ledger, rng, odds }
    }

    /// Side for a `[0, 100)` draw.
    pub fn side_for_roll(&self, roll: u32) -> CoinSide {
        if roll <= self.odds.heads_max {
            CoinSide::Heads
        } else if roll <= self.odds.tails_max {
            CoinSide::Tails
        } else {
            CoinSide::Edge
        }
    }

    fn multiplier(&self, side: CoinSide) -> i64 {
        match side {
            CoinSide::Heads => self.odds.heads_multiplier,
            CoinSide::Tails => self.odds.tails_multiplier,
            CoinSide::Edge => self.odds.edge_multiplier,
        }
    }

    /// Stake `stake` on `call`.
    pub fn toss(&self, player: &PlayerId, call: CoinSide, stake: i64) -> GameResult<TossResult> {
        if stake <= 0 {
            return Err(GameError::NonPositiveAmount(stake));
        }
        self.ledger.atomically(&[player], |tx| {
            let mut cash_after = tx.adjust(player, Account::Cash, -stake)?;
            let landed = self.side_for_roll(self.rng.percent());
            let payout = if landed == call {
                stake.saturating_mul(self.multiplier(landed))
            } else {
                0
            };
            if payout > 0 {
                cash_after = tx.adjust(player, Account::Cash, payout)?;
            }
            info!(player = %player, %call, %landed, stake, payout, "Coin toss");
            Ok(TossResult {
                call,
                landed,
                stake,
                payout,
                cash_after,
            })
        })
    }
}
