//! # Robbery & Scouting
//!
//! Player-versus-player actions gated by consumable gear. Each attempt
//! consumes exactly one unit of gear whatever the outcome; the gear is put
//! back only if the store fails mid-operation.
//!
//! All draws are taken from the injected [`RandomSource`], one `[0, 100)`
//! roll per attempt.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::inventory::Inventory;
use super::item::InventoryItem;
use super::ledger::{LedgerTx, PenaltyCharge};
use crate::config::{EconomyRules, GearKind};
use crate::core::rng::choose;
use crate::core::{PlayerId, RandomSource};
use crate::error::{GameError, GameResult};
use crate::store::Account;

/// Result of a cash robbery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobberyOutcome {
    /// Cash moved from victim to robber. 0 when the victim had under 2 cash.
    Stolen {
        /// Amount taken.
        amount: i64,
    },
    /// Robber was caught and penalized.
    Caught(PenaltyCharge),
    /// Nothing happened.
    Escaped,
}

/// Result of a plate robbery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateRobberyOutcome {
    /// One unit moved to the robber.
    Stolen {
        /// Stack received by the robber.
        item: InventoryItem,
        /// Whether it was taken from the victim's worn slot (and is now worn by the robber).
        from_worn_slot: bool,
    },
    /// Robber was caught and penalized.
    Caught {
        /// Item the robber went for.
        target: InventoryItem,
        /// Penalty collected.
        charge: PenaltyCharge,
    },
}

/// Result of scouting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoutReport {
    /// Target's finances were revealed.
    Revealed {
        /// Cash.
        cash: i64,
        /// Bank.
        bank: i64,
        /// Inventory units.
        items: u32,
    },
    /// Scouting failed.
    Nothing,
}

/// Robbery and scouting actions.
pub struct Heists {
    inventory: Arc<Inventory>,
    rng: Arc<dyn RandomSource>,
    rules: EconomyRules,
}

impl Heists {
    /// Create the subsystem.
    pub fn new(inventory: Arc<Inventory>, rng: Arc<dyn RandomSource>, rules: EconomyRules) -> Self {
        Self { inventory, rng, rules }
    }

    fn gear(&self, kind: GearKind) -> GameResult<String> {
        self.inventory
            .shop()
            .gear_name(kind)
            .map(str::to_string)
            .ok_or_else(|| GameError::InvalidArgument(format!("no {:?} gear configured", kind)))
    }

    fn penalty_for(&self, tx: &LedgerTx<'_>, robber: &PlayerId) -> GameResult<i64> {
        let r = &self.rules.robbery;
        let cash = tx.balance(robber, Account::Cash)?;
        Ok(r.penalty_floor.max(cash * r.penalty_percent / 100))
    }

    /// Run `body` after consuming one unit of `gear`, restoring the gear if
    /// `body` fails.
    fn with_gear<R, F>(&self, owner: &PlayerId, gear: &str, body: F) -> GameResult<R>
    where
        F: FnOnce() -> GameResult<R>,
    {
        let used = self.inventory.consume_in(owner, gear)?;
        body().map_err(|e| {
            self.inventory.restore_item(&used);
            e
        })
    }

    /// Try to steal cash from `victim`.
    pub fn rob(&self, robber: &PlayerId, victim: &PlayerId) -> GameResult<RobberyOutcome> {
        if robber == victim {
            return Err(GameError::SelfTarget(robber.clone()));
        }
        let gear = self.gear(GearKind::Robbery)?;
        let odds = self.rules.robbery.clone();

        self.inventory.locked(&[robber, victim], |tx| {
            self.with_gear(robber, &gear, || {
                let roll = self.rng.percent();
                let outcome = if roll < odds.success_below {
                    let max = tx.balance(victim, Account::Cash)? / 2;
                    let amount = if max >= 1 {
                        self.rng.range_inclusive(1, max as u64) as i64
                    } else {
                        0
                    };
                    if amount > 0 {
                        tx.move_between(victim, Account::Cash, robber, Account::Cash, amount)?;
                    }
                    RobberyOutcome::Stolen { amount }
                } else if roll < odds.caught_below {
                    let penalty = self.penalty_for(tx, robber)?;
                    RobberyOutcome::Caught(tx.charge_penalty(robber, penalty)?)
                } else {
                    RobberyOutcome::Escaped
                };
                info!(robber = %robber, victim = %victim, roll, ?outcome, "Robbery");
                Ok(outcome)
            })
        })
    }

    /// Try to steal a nameplate: the victim's worn one, or a random cosmetic stack.
    pub fn rob_plate(&self, robber: &PlayerId, victim: &PlayerId) -> GameResult<PlateRobberyOutcome> {
        if robber == victim {
            return Err(GameError::SelfTarget(robber.clone()));
        }
        let gear = self.gear(GearKind::Robbery)?;

        self.inventory.locked(&[robber, victim], |tx| {
            let (target, from_worn_slot) = match self.inventory.equipped_in(victim)? {
                Some(worn) => (worn, true),
                None => {
                    let cosmetics: Vec<InventoryItem> = self
                        .inventory
                        .items(victim)?
                        .into_iter()
                        .filter(|i| i.category.is_cosmetic())
                        .collect();
                    let pick = choose(self.rng.as_ref(), &cosmetics)
                        .cloned()
                        .ok_or_else(|| GameError::NoCosmetics(victim.clone()))?;
                    (pick, false)
                }
            };
            let Some(rarity) = target.category.rarity() else {
                return Err(GameError::NoCosmetics(victim.clone()));
            };

            self.with_gear(robber, &gear, || {
                let roll = self.rng.percent();
                let chance = self.rules.plate.for_rarity(rarity);
                if roll < chance {
                    let item = self.move_plate(robber, victim, &target, from_worn_slot)?;
                    info!(robber = %robber, victim = %victim, item = %item.name, roll, "Plate stolen");
                    Ok(PlateRobberyOutcome::Stolen { item, from_worn_slot })
                } else {
                    let penalty = self.penalty_for(tx, robber)?;
                    let charge = tx.charge_penalty(robber, penalty)?;
                    info!(robber = %robber, victim = %victim, item = %target.name, roll, "Plate robbery caught");
                    Ok(PlateRobberyOutcome::Caught { target, charge })
                }
            })
        })
    }

    /// Move one unit of `target` to the robber, worn if it was worn. On
    /// failure the victim gets the unit and the worn slot back.
    fn move_plate(
        &self,
        robber: &PlayerId,
        victim: &PlayerId,
        target: &InventoryItem,
        from_worn_slot: bool,
    ) -> GameResult<InventoryItem> {
        let inventory = &self.inventory;
        let moved = inventory.take_unit_in(target).and_then(|()| {
            if from_worn_slot {
                inventory.store.clear_equipped(victim)?;
            }
            inventory.add_unit_in(robber, &target.name, target.category, target.value)
        });
        let item = match moved {
            Ok(item) => item,
            Err(e) => {
                self.return_plate(victim, target, from_worn_slot);
                return Err(e);
            }
        };
        if from_worn_slot {
            if let Err(e) = inventory.store.set_equipped(robber, &item.id) {
                if let Err(undo) = inventory.take_unit_in(&item) {
                    error!(owner = %robber, item = %item.name, error = %undo, "Plate rollback failed");
                }
                self.return_plate(victim, target, from_worn_slot);
                return Err(e.into());
            }
        }
        Ok(item)
    }

    fn return_plate(&self, victim: &PlayerId, target: &InventoryItem, worn: bool) {
        self.inventory.restore_item(target);
        self.inventory.restore_equip(victim, &target.id, worn);
    }

    /// Spy on `target`'s finances.
    pub fn scout(&self, scout: &PlayerId, target: &PlayerId) -> GameResult<ScoutReport> {
        if scout == target {
            return Err(GameError::SelfTarget(scout.clone()));
        }
        let gear = self.gear(GearKind::Scout)?;

        self.inventory.locked(&[scout, target], |tx| {
            self.with_gear(scout, &gear, || {
                let roll = self.rng.percent();
                let report = if roll < self.rules.scout_success_percent {
                    let items = self.inventory.items(target)?.iter().map(|i| i.count).sum();
                    ScoutReport::Revealed {
                        cash: tx.balance(target, Account::Cash)?,
                        bank: tx.balance(target, Account::Bank)?,
                        items,
                    }
                } else {
                    ScoutReport::Nothing
                };
                info!(scout = %scout, target = %target, roll, ?report, "Scouting");
                Ok(report)
            })
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
