//! # Economy Ledger
//!
//! Cash, bank and fine accounts per player.
//!
//! ## Invariants
//!
//! - No account is ever written with a negative value. An adjustment that
//!   would go below zero fails with no mutation.
//! - Every read-modify-write on a player happens while that player's lock is
//!   held. Multi-player operations take the locks in sorted order, so two
//!   transfers in opposite directions cannot deadlock.
//! - Fines compound lazily: each full day since the last accrual multiplies
//!   the fine once, applied on the next read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::EconomyRules;
use crate::core::{Clock, PlayerId};
use crate::error::{GameError, GameResult};
use crate::store::{Account, Store, StoreError};

const BASIS_POINTS: i64 = 10_000;

fn fine_since_key(player: &PlayerId) -> String {
    format!("fine_since:{}", player.as_str())
}

/// Point-in-time balances of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Cash.
    pub cash: i64,
    /// Bank.
    pub bank: i64,
    /// Fine, with accrual applied.
    pub fine: i64,
}

/// How a penalty was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyCharge {
    /// Total penalty.
    pub amount: i64,
    /// Portion taken from cash.
    pub from_cash: i64,
    /// Shortfall added to the fine.
    pub to_fine: i64,
}

/// Player balance ledger.
pub struct Ledger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    rules: EconomyRules,
    /// Per-player locks, present only while some operation holds a handle.
    locks: Mutex<HashMap<PlayerId, Arc<Mutex<()>>>>,
}

/// Access to balances while the locks for a set of players are held.
///
/// Obtained from [`Ledger::atomically`]. Only the players passed to that
/// call are protected.
pub struct LedgerTx<'a> {
    ledger: &'a Ledger,
}

impl Ledger {
    /// Create a ledger over `store`.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, rules: EconomyRules) -> Self {
        Self {
            store,
            clock,
            rules,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Rules in effect.
    pub fn rules(&self) -> &EconomyRules {
        &self.rules
    }

    fn lock_handle(&self, player: &PlayerId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(player.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` with the locks of `players` held.
    ///
    /// Locks are taken in sorted order and duplicates are ignored. `f` must
    /// not call back into the locking methods of this ledger for the same
    /// players.
    pub fn atomically<R, F>(&self, players: &[&PlayerId], f: F) -> GameResult<R>
    where
        F: FnOnce(&LedgerTx<'_>) -> GameResult<R>,
    {
        let mut ordered: Vec<&PlayerId> = players.to_vec();
        ordered.sort();
        ordered.dedup();

        let result = {
            let handles: Vec<Arc<Mutex<()>>> = ordered.iter().map(|p| self.lock_handle(p)).collect();
            let _guards: Vec<MutexGuard<'_, ()>> = handles.iter().map(|m| m.lock()).collect();
            let tx = LedgerTx { ledger: self };
            f(&tx)
        };
        self.release(&ordered);
        result
    }

    /// Drop lock entries nobody else holds a handle to.
    fn release(&self, players: &[&PlayerId]) {
        let mut locks = self.locks.lock();
        for player in players {
            if locks.get(*player).is_some_and(|m| Arc::strong_count(m) == 1) {
                locks.remove(*player);
            }
        }
    }

    // =========================================================================
    // Single-player operations
    // =========================================================================

    /// Cash balance, materializing the player with the starting balance.
    pub fn cash(&self, player: &PlayerId) -> GameResult<i64> {
        self.atomically(&[player], |tx| tx.balance(player, Account::Cash))
    }

    /// Any account balance.
    pub fn balance(&self, player: &PlayerId, account: Account) -> GameResult<i64> {
        self.atomically(&[player], |tx| tx.balance(player, account))
    }

    /// All three balances.
    pub fn balances(&self, player: &PlayerId) -> GameResult<Balances> {
        self.atomically(&[player], |tx| {
            Ok(Balances {
                cash: tx.balance(player, Account::Cash)?,
                bank: tx.balance(player, Account::Bank)?,
                fine: tx.balance(player, Account::Fine)?,
            })
        })
    }

    /// Apply `delta` to cash. Fails with no mutation if the result would be negative.
    pub fn adjust(&self, player: &PlayerId, delta: i64) -> GameResult<i64> {
        self.atomically(&[player], |tx| tx.adjust(player, Account::Cash, delta))
    }

    /// Add `amount` to cash.
    pub fn credit(&self, player: &PlayerId, amount: i64) -> GameResult<i64> {
        check_positive(amount)?;
        self.adjust(player, amount)
    }

    /// Remove `amount` from cash.
    pub fn debit(&self, player: &PlayerId, amount: i64) -> GameResult<i64> {
        check_positive(amount)?;
        self.adjust(player, -amount)
    }

    /// Move cash into the bank.
    pub fn deposit(&self, player: &PlayerId, amount: i64) -> GameResult<Balances> {
        check_positive(amount)?;
        self.atomically(&[player], |tx| {
            tx.move_between(player, Account::Cash, player, Account::Bank, amount)?;
            tx.balances(player)
        })
    }

    /// Move bank savings back to cash.
    pub fn withdraw(&self, player: &PlayerId, amount: i64) -> GameResult<Balances> {
        check_positive(amount)?;
        self.atomically(&[player], |tx| {
            tx.move_between(player, Account::Bank, player, Account::Cash, amount)?;
            tx.balances(player)
        })
    }

    /// Move cash from one player to another.
    pub fn transfer(&self, from: &PlayerId, to: &PlayerId, amount: i64) -> GameResult<()> {
        check_positive(amount)?;
        if from == to {
            return Err(GameError::SelfTarget(from.clone()));
        }
        self.atomically(&[from, to], |tx| {
            tx.move_between(from, Account::Cash, to, Account::Cash, amount)
        })
    }

    // =========================================================================
    // Fines
    // =========================================================================

    /// Current fine with accrual applied.
    pub fn fine(&self, player: &PlayerId) -> GameResult<i64> {
        self.balance(player, Account::Fine)
    }

    /// Add to a player's fine.
    pub fn add_fine(&self, player: &PlayerId, amount: i64) -> GameResult<i64> {
        check_positive(amount)?;
        self.atomically(&[player], |tx| tx.add_fine(player, amount))
    }

    /// Collect a penalty: cash first, any shortfall becomes fine.
    pub fn charge_penalty(&self, player: &PlayerId, amount: i64) -> GameResult<PenaltyCharge> {
        check_positive(amount)?;
        self.atomically(&[player], |tx| tx.charge_penalty(player, amount))
    }

    /// Pay the whole outstanding fine from cash.
    ///
    /// Returns the amount paid; 0 when there was nothing owed.
    pub fn pay_fine(&self, player: &PlayerId) -> GameResult<i64> {
        self.atomically(&[player], |tx| {
            let fine = tx.balance(player, Account::Fine)?;
            if fine == 0 {
                return Ok(0);
            }
            let cash = tx.balance(player, Account::Cash)?;
            if cash < fine {
                return Err(GameError::InsufficientFunds {
                    needed: fine,
                    available: cash,
                });
            }
            tx.adjust(player, Account::Cash, -fine)?;
            if let Err(e) = tx.clear_fine(player) {
                tx.restore(player, Account::Cash, cash);
                return Err(e);
            }
            info!(player = %player, paid = fine, "Fine paid");
            Ok(fine)
        })
    }

    /// Players with an outstanding fine, largest first.
    pub fn debtors(&self) -> GameResult<Vec<(PlayerId, i64)>> {
        let mut out = Vec::new();
        for player in self.store.players()? {
            let fine = self.fine(&player)?;
            if fine > 0 {
                out.push((player, fine));
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }

    /// Every known player's balances.
    pub fn all_balances(&self) -> GameResult<Vec<(PlayerId, Balances)>> {
        self.store
            .players()?
            .into_iter()
            .map(|p| self.balances(&p).map(|b| (p, b)))
            .collect()
    }
}

fn check_positive(amount: i64) -> GameResult<()> {
    if amount <= 0 {
        Err(GameError::NonPositiveAmount(amount))
    } else {
        Ok(())
    }
}

impl LedgerTx<'_> {
    /// Balance of one account. Cash is materialized with the starting
    /// balance; fines are accrued.
    pub fn balance(&self, player: &PlayerId, account: Account) -> GameResult<i64> {
        match account {
            Account::Cash => self.materialize(player),
            Account::Bank => Ok(self.ledger.store.balance(player, Account::Bank)?.unwrap_or(0)),
            Account::Fine => self.accrue_fine(player),
        }
    }

    /// Balances of one player.
    pub fn balances(&self, player: &PlayerId) -> GameResult<Balances> {
        Ok(Balances {
            cash: self.balance(player, Account::Cash)?,
            bank: self.balance(player, Account::Bank)?,
            fine: self.balance(player, Account::Fine)?,
        })
    }

    /// Apply `delta` to an account, refusing negative results.
    pub fn adjust(&self, player: &PlayerId, account: Account, delta: i64) -> GameResult<i64> {
        let current = self.balance(player, account)?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| GameError::InvalidArgument(format!("balance overflow for {}", player)))?;
        if next < 0 {
            return Err(GameError::InsufficientFunds {
                needed: -delta,
                available: current,
            });
        }
        self.ledger.store.set_balance(player, account, next)?;
        debug!(player = %player, ?account, delta, balance = next, "Balance adjusted");
        Ok(next)
    }

    /// Two linked adjustments; the first is undone if the second fails.
    pub fn move_between(
        &self,
        from: &PlayerId,
        from_account: Account,
        to: &PlayerId,
        to_account: Account,
        amount: i64,
    ) -> GameResult<()> {
        self.adjust(from, from_account, -amount)?;
        if let Err(e) = self.adjust(to, to_account, amount) {
            if let Err(undo) = self.adjust(from, from_account, amount) {
                error!(player = %from, ?from_account, amount, error = %undo, "Rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Add to the fine, starting its accrual clock if it was zero.
    pub fn add_fine(&self, player: &PlayerId, amount: i64) -> GameResult<i64> {
        let current = self.accrue_fine(player)?;
        if current == 0 {
            self.write_fine_since(player, self.ledger.clock.now())?;
        }
        self.adjust(player, Account::Fine, amount)
    }

    /// Take `amount` from cash, adding any shortfall to the fine.
    pub fn charge_penalty(&self, player: &PlayerId, amount: i64) -> GameResult<PenaltyCharge> {
        let cash = self.balance(player, Account::Cash)?;
        let from_cash = cash.min(amount);
        let to_fine = amount - from_cash;
        if from_cash > 0 {
            self.adjust(player, Account::Cash, -from_cash)?;
        }
        if to_fine > 0 {
            if let Err(e) = self.add_fine(player, to_fine) {
                self.restore(player, Account::Cash, cash);
                return Err(e);
            }
        }
        info!(player = %player, amount, from_cash, to_fine, "Penalty charged");
        Ok(PenaltyCharge {
            amount,
            from_cash,
            to_fine,
        })
    }

    fn restore(&self, player: &PlayerId, account: Account, value: i64) {
        if let Err(e) = self.ledger.store.set_balance(player, account, value) {
            error!(player = %player, ?account, value, error = %e, "Rollback failed");
        }
    }

    fn materialize(&self, player: &PlayerId) -> GameResult<i64> {
        match self.ledger.store.balance(player, Account::Cash)? {
            Some(cash) => Ok(cash),
            None => {
                let start = self.ledger.rules.starting_balance;
                self.ledger.store.set_balance(player, Account::Cash, start)?;
                info!(player = %player, balance = start, "New player");
                Ok(start)
            }
        }
    }

    fn fine_since(&self, player: &PlayerId) -> GameResult<Option<DateTime<Utc>>> {
        let key = fine_since_key(player);
        let Some(raw) = self.ledger.store.blob(&key)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        DateTime::parse_from_rfc3339(&text)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| {
                GameError::Persistence(StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                })
            })
    }

    fn write_fine_since(&self, player: &PlayerId, at: DateTime<Utc>) -> GameResult<()> {
        self.ledger
            .store
            .set_blob(&fine_since_key(player), at.to_rfc3339().as_bytes())?;
        Ok(())
    }

    fn clear_fine(&self, player: &PlayerId) -> GameResult<()> {
        self.ledger.store.set_balance(player, Account::Fine, 0)?;
        self.ledger.store.delete_blob(&fine_since_key(player))?;
        Ok(())
    }

    fn accrue_fine(&self, player: &PlayerId) -> GameResult<i64> {
        let fine = self.ledger.store.balance(player, Account::Fine)?.unwrap_or(0);
        if fine <= 0 {
            return Ok(0);
        }
        let now = self.ledger.clock.now();
        let Some(since) = self.fine_since(player)? else {
            self.write_fine_since(player, now)?;
            return Ok(fine);
        };

        let days = (now - since).num_days();
        if days <= 0 {
            return Ok(fine);
        }

        let rate = BASIS_POINTS + self.ledger.rules.fine_daily_rate_bp;
        let mut accrued = fine;
        for _ in 0..days {
            accrued = accrued.saturating_mul(rate) / BASIS_POINTS;
        }
        self.ledger.store.set_balance(player, Account::Fine, accrued)?;
        self.write_fine_since(player, since + Duration::days(days))?;
        debug!(player = %player, days, from = fine, to = accrued, "Fine accrued");
        Ok(accrued)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::store::faulty::{FaultyStore, Write};
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = Ledger::new(store.clone(), clock.clone(), EconomyRules::default());
        (store, clock, ledger)
    }

    fn p(name: &str) -> PlayerId {
        PlayerId::new(name)
    }

    #[test]
    fn test_new_player_gets_starting_balance() {
        let (store, _, ledger) = setup();
        assert_eq!(ledger.cash(&p("alice")).unwrap(), 1000);
        assert_eq!(store.balance(&p("alice"), Account::Cash).unwrap(), Some(1000));
    }

    #[test]
    fn test_adjust_refuses_negative() {
        let (_, _, ledger) = setup();
        let alice = p("alice");
        let err = ledger.adjust(&alice, -1001).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                needed: 1001,
                available: 1000
            }
        );
        assert_eq!(ledger.cash(&alice).unwrap(), 1000);
        assert_eq!(ledger.adjust(&alice, -1000).unwrap(), 0);
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let (_, _, ledger) = setup();
        let alice = p("alice");
        let b = ledger.deposit(&alice, 400).unwrap();
        assert_eq!((b.cash, b.bank), (600, 400));

        assert!(ledger.withdraw(&alice, 401).is_err());
        let b = ledger.withdraw(&alice, 150).unwrap();
        assert_eq!((b.cash, b.bank), (750, 250));
    }

    #[test]
    fn test_transfer_requires_funds() {
        let (_, _, ledger) = setup();
        let (alice, bob) = (p("alice"), p("bob"));
        ledger.transfer(&alice, &bob, 300).unwrap();
        assert_eq!(ledger.cash(&alice).unwrap(), 700);
        assert_eq!(ledger.cash(&bob).unwrap(), 1300);

        assert!(matches!(
            ledger.transfer(&alice, &bob, 701),
            Err(GameError::InsufficientFunds { .. })
        ));
        assert!(matches!(ledger.transfer(&alice, &alice, 1), Err(GameError::SelfTarget(_))));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let (_, _, ledger) = setup();
        assert_eq!(
            ledger.credit(&p("alice"), 0).unwrap_err(),
            GameError::NonPositiveAmount(0)
        );
        assert!(ledger.deposit(&p("alice"), -5).is_err());
    }

    #[test]
    fn test_fine_compounds_daily() {
        let (_, clock, ledger) = setup();
        let alice = p("alice");
        ledger.add_fine(&alice, 1000).unwrap();

        clock.advance(Duration::hours(23));
        assert_eq!(ledger.fine(&alice).unwrap(), 1000);

        clock.advance(Duration::hours(1) + Duration::days(2));
        assert_eq!(ledger.fine(&alice).unwrap(), 1331);

        // Reading again the same day does not compound twice.
        assert_eq!(ledger.fine(&alice).unwrap(), 1331);
    }

    #[test]
    fn test_pay_fine() {
        let (store, clock, ledger) = setup();
        let alice = p("alice");
        ledger.add_fine(&alice, 500).unwrap();
        clock.advance(Duration::days(1));

        assert_eq!(ledger.pay_fine(&alice).unwrap(), 550);
        assert_eq!(ledger.cash(&alice).unwrap(), 450);
        assert_eq!(ledger.fine(&alice).unwrap(), 0);
        assert_eq!(store.blob("fine_since:alice").unwrap(), None);
        assert_eq!(ledger.pay_fine(&alice).unwrap(), 0);
    }

    #[test]
    fn test_pay_fine_requires_cash() {
        let (_, _, ledger) = setup();
        let alice = p("alice");
        ledger.add_fine(&alice, 5000).unwrap();
        assert!(matches!(
            ledger.pay_fine(&alice),
            Err(GameError::InsufficientFunds {
                needed: 5000,
                available: 1000
            })
        ));
        assert_eq!(ledger.fine(&alice).unwrap(), 5000);
    }

    #[test]
    fn test_penalty_spills_into_fine() {
        let (_, _, ledger) = setup();
        let alice = p("alice");
        ledger.adjust(&alice, -600).unwrap();

        let charge = ledger.charge_penalty(&alice, 1000).unwrap();
        assert_eq!(charge.from_cash, 400);
        assert_eq!(charge.to_fine, 600);
        assert_eq!(ledger.cash(&alice).unwrap(), 0);
        assert_eq!(ledger.fine(&alice).unwrap(), 600);
    }

    #[test]
    fn test_debtors_sorted() {
        let (_, _, ledger) = setup();
        ledger.add_fine(&p("a"), 100).unwrap();
        ledger.add_fine(&p("b"), 300).unwrap();
        ledger.cash(&p("c")).unwrap();

        let debtors = ledger.debtors().unwrap();
        assert_eq!(debtors, vec![(p("b"), 300), (p("a"), 100)]);
    }

    #[test]
    fn test_offline_store_fails_closed() {
        let (store, _, ledger) = setup();
        let alice = p("alice");
        ledger.cash(&alice).unwrap();
        store.set_offline(true);

        let err = ledger.adjust(&alice, 10).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceUnavailable);

        store.set_offline(false);
        assert_eq!(ledger.cash(&alice).unwrap(), 1000);
    }

    #[test]
    fn test_transfer_rolls_back_when_credit_fails() {
        let store = Arc::new(FaultyStore::new());
        let ledger = Ledger::new(store.clone(), Arc::new(ManualClock::new(Utc::now())), EconomyRules::default());
        let (alice, bob) = (p("alice"), p("bob"));
        ledger.cash(&alice).unwrap();
        ledger.cash(&bob).unwrap();

        store.fail_for(Write::SetBalance, &bob);
        let err = ledger.transfer(&alice, &bob, 300).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceUnavailable);
        store.heal();

        assert_eq!(ledger.cash(&alice).unwrap(), 1000);
        assert_eq!(ledger.cash(&bob).unwrap(), 1000);
    }

    #[test]
    fn test_lock_entries_released() {
        let (_, _, ledger) = setup();
        ledger.transfer(&p("alice"), &p("bob"), 10).unwrap();
        ledger.cash(&p("carol")).unwrap();
        assert!(ledger.locks.lock().is_empty());
    }

    #[test]
    fn test_concurrent_adjustments_do_not_lose_updates() {
        let (_, _, ledger) = setup();
        let ledger = Arc::new(ledger);
        let alice = p("alice");
        ledger.cash(&alice).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                let alice = alice.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        ledger.adjust(&alice, 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.cash(&alice).unwrap(), 1800);
    }

    proptest! {
        #[test]
        fn prop_balance_never_negative(deltas in prop::collection::vec(-1500i64..1500, 1..60)) {
            let (_, _, ledger) = setup();
            let alice = p("alice");
            let mut expected = 1000i64;
            for delta in deltas {
                match ledger.adjust(&alice, delta) {
                    Ok(balance) => {
                        expected += delta;
                        prop_assert_eq!(balance, expected);
                    }
                    Err(_) => prop_assert!(expected + delta < 0),
                }
                prop_assert!(ledger.cash(&alice).unwrap() >= 0);
            }
        }
    }
}
