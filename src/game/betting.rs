//! # Betting Ledger & Settlement
//!
//! Wagers are escrowed by debiting the bettor's cash when placed. A session
//! holds at most one wager per bettor per phase. Settlement credits
//! `amount × multiplier` for every wager on the winner and runs once.
//!
//! Open wagers are persisted as a bincode blob under
//! `session:<id>:wagers` after every placement, so a crash mid-session
//! leaves a record of who staked what.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::roster::Participant;
use crate::config::BettingRules;
use crate::core::hash::participant_fingerprint;
use crate::core::{PlayerId, SessionId};
use crate::economy::Ledger;
use crate::error::{GameError, GameResult};
use crate::store::{Store, StoreError};

/// Which wagers are currently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BettingPhase {
    /// No session.
    None,
    /// Opening bets on any participant.
    Initial,
    /// Bets on one of the two finalists.
    Final,
    /// Bets not accepted.
    Closed,
}

impl BettingPhase {
    /// Allowed phase changes.
    pub fn can_transition_to(self, next: BettingPhase) -> bool {
        use BettingPhase::*;
        matches!(
            (self, next),
            (None, Initial) | (Initial, Closed) | (Closed, Final) | (Final, Closed) | (_, None)
        )
    }

    /// Whether bets are accepted in this phase.
    pub fn is_open(self) -> bool {
        matches!(self, BettingPhase::Initial | BettingPhase::Final)
    }
}

impl fmt::Display for BettingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BettingPhase::None => "none",
            BettingPhase::Initial => "initial",
            BettingPhase::Final => "final",
            BettingPhase::Closed => "closed",
        })
    }
}

/// One stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    /// Who placed it.
    pub bettor: PlayerId,
    /// Participant backed.
    pub target: Participant,
    /// Fingerprint of the target handle; settlement matches on this.
    pub target_fingerprint: String,
    /// Stake.
    pub amount: i64,
    /// Phase it was placed in.
    pub phase: BettingPhase,
}

/// Settlement result of one wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// The wager.
    pub wager: Wager,
    /// Amount credited (0 for a losing wager).
    pub amount: i64,
}

/// Outcome of settling a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Every wager with its payout, initial phase first.
    pub payouts: Vec<Payout>,
    /// Sum of credited payouts.
    pub total_paid: i64,
}

impl Settlement {
    /// Payouts to winning wagers.
    pub fn winners(&self) -> impl Iterator<Item = &Payout> {
        self.payouts.iter().filter(|p| p.amount > 0)
    }
}

/// Persisted form of the open wagers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerSnapshot {
    /// Owning session.
    pub session: SessionId,
    /// Phase at the time of writing.
    pub phase: BettingPhase,
    /// Initial-phase wagers.
    pub initial: Vec<Wager>,
    /// Final-phase wagers.
    pub finals: Vec<Wager>,
}

/// Blob key of a session's wagers.
pub fn wagers_key(session: &SessionId) -> String {
    format!("session:{}:wagers", session)
}

/// Load a persisted wager snapshot.
pub fn load_wagers(store: &dyn Store, session: &SessionId) -> GameResult<Option<WagerSnapshot>> {
    let key = wagers_key(session);
    let Some(raw) = store.blob(&key)? else {
        return Ok(None);
    };
    bincode::deserialize(&raw).map(Some).map_err(|e| {
        GameError::Persistence(StoreError::Corrupt {
            key,
            reason: e.to_string(),
        })
    })
}

/// Wagers of one session.
#[derive(Debug, Clone)]
pub struct BettingBook {
    session: SessionId,
    rules: BettingRules,
    phase: BettingPhase,
    initial_slots: Vec<Participant>,
    final_slots: Vec<Participant>,
    initial: BTreeMap<PlayerId, Wager>,
    finals: BTreeMap<PlayerId, Wager>,
    settled: bool,
}

impl BettingBook {
    /// Empty book in phase `None`.
    pub fn new(session: SessionId, rules: BettingRules) -> Self {
        Self {
            session,
            rules,
            phase: BettingPhase::None,
            initial_slots: Vec::new(),
            final_slots: Vec::new(),
            initial: BTreeMap::new(),
            finals: BTreeMap::new(),
            settled: false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> BettingPhase {
        self.phase
    }

    /// Participants addressable in the current (or last) open phase.
    pub fn slots(&self, phase: BettingPhase) -> &[Participant] {
        match phase {
            BettingPhase::Final => &self.final_slots,
            _ => &self.initial_slots,
        }
    }

    /// Wagers of one phase.
    pub fn wagers(&self, phase: BettingPhase) -> Vec<&Wager> {
        match phase {
            BettingPhase::Initial => self.initial.values().collect(),
            BettingPhase::Final => self.finals.values().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether settlement already ran.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    fn transition(&mut self, next: BettingPhase) -> GameResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(GameError::InvalidPhaseTransition {
                from: self.phase,
                to: next,
            });
        }
        info!(session = %self.session.short(), from = %self.phase, to = %next, "Betting phase");
        self.phase = next;
        Ok(())
    }

    /// Open initial betting over `slots` (already in betting order).
    pub fn open_initial(&mut self, slots: Vec<Participant>) -> GameResult<()> {
        self.transition(BettingPhase::Initial)?;
        self.initial_slots = slots;
        self.initial.clear();
        self.finals.clear();
        Ok(())
    }

    /// Open final betting over the two finalists.
    pub fn open_final(&mut self, finalists: [Participant; 2]) -> GameResult<()> {
        self.transition(BettingPhase::Final)?;
        self.final_slots = finalists.to_vec();
        Ok(())
    }

    /// Stop accepting bets.
    pub fn close(&mut self) -> GameResult<()> {
        self.transition(BettingPhase::Closed)
    }

    /// Place a wager on slot `slot` (1-based) of the open phase.
    ///
    /// The stake is debited immediately. If the wager cannot be persisted
    /// the debit is refunded and the wager discarded.
    pub fn place(
        &mut self,
        ledger: &Ledger,
        store: &dyn Store,
        bettor: &PlayerId,
        slot: usize,
        amount: i64,
    ) -> GameResult<Wager> {
        let phase = self.phase;
        if !phase.is_open() {
            return Err(GameError::BettingClosed(phase));
        }
        if amount <= 0 {
            return Err(GameError::NonPositiveAmount(amount));
        }
        let slots = self.slots(phase);
        let target = slot
            .checked_sub(1)
            .and_then(|i| slots.get(i))
            .cloned()
            .ok_or(GameError::UnknownSlot {
                slot,
                max: slots.len(),
            })?;

        let (current, other, other_phase) = match phase {
            BettingPhase::Initial => (&self.initial, &self.finals, BettingPhase::Final),
            _ => (&self.finals, &self.initial, BettingPhase::Initial),
        };
        if current.contains_key(bettor) {
            return Err(GameError::AlreadyBet {
                bettor: bettor.clone(),
                phase,
            });
        }
        if self.rules.exclusive_phases && other.contains_key(bettor) {
            return Err(GameError::AlreadyBet {
                bettor: bettor.clone(),
                phase: other_phase,
            });
        }

        ledger.debit(bettor, amount)?;

        let wager = Wager {
            bettor: bettor.clone(),
            target_fingerprint: participant_fingerprint(&target.id),
            target,
            amount,
            phase,
        };
        self.book_mut(phase).insert(bettor.clone(), wager.clone());

        if let Err(e) = self.persist(store) {
            self.book_mut(phase).remove(bettor);
            if let Err(refund) = ledger.credit(bettor, amount) {
                error!(bettor = %bettor, amount, error = %refund, "Wager refund failed");
            }
            return Err(e);
        }

        info!(
            session = %self.session.short(),
            bettor = %bettor,
            target = %wager.target.id,
            amount,
            %phase,
            "Bet placed"
        );
        Ok(wager)
    }

    fn book_mut(&mut self, phase: BettingPhase) -> &mut BTreeMap<PlayerId, Wager> {
        match phase {
            BettingPhase::Final => &mut self.finals,
            _ => &mut self.initial,
        }
    }

    /// Write the open wagers to the store.
    pub fn persist(&self, store: &dyn Store) -> GameResult<()> {
        let snapshot = WagerSnapshot {
            session: self.session,
            phase: self.phase,
            initial: self.initial.values().cloned().collect(),
            finals: self.finals.values().cloned().collect(),
        };
        let encoded = bincode::serialize(&snapshot)
            .map_err(|e| GameError::Persistence(StoreError::Unavailable(e.to_string())))?;
        store.set_blob(&wagers_key(&self.session), &encoded)?;
        Ok(())
    }

    fn clear(&mut self, store: &dyn Store) {
        self.initial.clear();
        self.finals.clear();
        if let Err(e) = store.delete_blob(&wagers_key(&self.session)) {
            warn!(session = %self.session.short(), error = %e, "Could not delete wager record");
        }
    }

    /// Pay every wager on `winner` and clear the book. Runs once.
    ///
    /// Each wager leaves the book as soon as it is resolved. If a payout
    /// cannot be credited, the unpaid wagers stay in the book and in the
    /// stored record, the first error is returned, and a later call pays
    /// only what is left.
    pub fn settle(&mut self, ledger: &Ledger, store: &dyn Store, winner: &PlayerId) -> GameResult<Settlement> {
        if self.settled {
            return Err(GameError::AlreadySettled);
        }

        let winning = participant_fingerprint(winner);
        let mut settlement = Settlement::default();
        let mut failure = None;
        let phases = [
            (BettingPhase::Initial, self.rules.initial_multiplier),
            (BettingPhase::Final, self.rules.final_multiplier),
        ];

        for (phase, multiplier) in phases {
            for wager in self.wagers(phase).into_iter().cloned().collect::<Vec<_>>() {
                let amount = if wager.target_fingerprint == winning {
                    wager.amount.saturating_mul(multiplier)
                } else {
                    0
                };
                if amount > 0 {
                    if let Err(e) = ledger.credit(&wager.bettor, amount) {
                        error!(bettor = %wager.bettor, amount, error = %e, "Payout failed");
                        if failure.is_none() {
                            failure = Some(e);
                        }
                        continue;
                    }
                    settlement.total_paid += amount;
                }
                self.book_mut(phase).remove(&wager.bettor);
                settlement.payouts.push(Payout { wager, amount });
            }
        }

        if let Some(e) = failure {
            let unpaid = self.initial.len() + self.finals.len();
            if let Err(persist) = self.persist(store) {
                error!(session = %self.session.short(), unpaid, error = %persist, "Could not record unpaid wagers");
            }
            warn!(
                session = %self.session.short(),
                unpaid,
                paid = settlement.total_paid,
                "Settlement incomplete"
            );
            return Err(e);
        }

        self.settled = true;
        info!(
            session = %self.session.short(),
            winner = %winner,
            wagers = settlement.payouts.len(),
            paid = settlement.total_paid,
            "Settled"
        );
        self.clear(store);
        Ok(settlement)
    }

    /// Return every open stake to its bettor and clear the book.
    pub fn refund_all(&mut self, ledger: &Ledger, store: &dyn Store) -> i64 {
        let mut refunded = 0;
        let wagers: Vec<Wager> = self.initial.values().chain(self.finals.values()).cloned().collect();
        for wager in wagers {
            match ledger.credit(&wager.bettor, wager.amount) {
                Ok(_) => refunded += wager.amount,
                Err(e) => error!(bettor = %wager.bettor, amount = wager.amount, error = %e, "Refund failed"),
            }
        }
        self.settled = true;
        self.clear(store);
        refunded
    }

    /// Move to phase `None`.
    pub fn reset(&mut self) {
        self.phase = BettingPhase::None;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EconomyRules;
    use crate::core::SystemClock;
    use crate::store::faulty::{FaultyStore, Write};

    struct Fixture {
        store: Arc<FaultyStore>,
        ledger: Ledger,
        book: BettingBook,
        slots: Vec<Participant>,
    }

    fn fixture(rules: BettingRules) -> Fixture {
        let store = Arc::new(FaultyStore::new());
        let ledger = Ledger::new(store.clone(), Arc::new(SystemClock), EconomyRules::default());
        let slots: Vec<Participant> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|h| Participant::new(*h, format!("Player {}", h.to_uppercase())))
            .collect();
        let mut book = BettingBook::new(SessionId::generate(), rules);
        book.open_initial(slots.clone()).unwrap();
        Fixture {
            store,
            ledger,
            book,
            slots,
        }
    }

    fn p(h: &str) -> PlayerId {
        PlayerId::new(h)
    }

    #[test]
    fn test_transition_table() {
        use BettingPhase::*;
        assert!(None.can_transition_to(Initial));
        assert!(Initial.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Final));
        assert!(Final.can_transition_to(Closed));
        assert!(Final.can_transition_to(None));
        assert!(!None.can_transition_to(Final));
        assert!(!Initial.can_transition_to(Final));
        assert!(!Closed.can_transition_to(Initial));
    }

    #[test]
    fn test_place_debits_and_persists() {
        let mut f = fixture(BettingRules::default());
        let wager = f.book.place(&f.ledger, f.store.as_ref(), &p("punter"), 2, 100).unwrap();
        assert_eq!(wager.target.id, p("b"));
        assert_eq!(f.ledger.cash(&p("punter")).unwrap(), 900);

        let snap = load_wagers(f.store.as_ref(), &f.book.session).unwrap().unwrap();
        assert_eq!(snap.initial, vec![wager]);
        assert!(snap.finals.is_empty());
    }

    #[test]
    fn test_second_bet_same_phase_rejected() {
        let mut f = fixture(BettingRules::default());
        f.book.place(&f.ledger, f.store.as_ref(), &p("punter"), 1, 100).unwrap();
        let err = f.book.place(&f.ledger, f.store.as_ref(), &p("punter"), 3, 50).unwrap_err();
        assert!(matches!(err, GameError::AlreadyBet { .. }));
        assert_eq!(f.ledger.cash(&p("punter")).unwrap(), 900);
    }

    #[test]
    fn test_validation() {
        let mut f = fixture(BettingRules::default());
        let punter = p("punter");
        assert_eq!(
            f.book.place(&f.ledger, f.store.as_ref(), &punter, 6, 10).unwrap_err(),
            GameError::UnknownSlot { slot: 6, max: 5 }
        );
        assert!(matches!(
            f.book.place(&f.ledger, f.store.as_ref(), &punter, 0, 10),
            Err(GameError::UnknownSlot { .. })
        ));
        assert_eq!(
            f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 0).unwrap_err(),
            GameError::NonPositiveAmount(0)
        );
        assert!(matches!(
            f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 1001),
            Err(GameError::InsufficientFunds { .. })
        ));

        f.book.close().unwrap();
        assert_eq!(
            f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 10).unwrap_err(),
            GameError::BettingClosed(BettingPhase::Closed)
        );
        assert_eq!(f.ledger.cash(&punter).unwrap(), 1000);
    }

    #[test]
    fn test_cross_phase_betting() {
        let mut f = fixture(BettingRules::default());
        let punter = p("punter");
        f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 100).unwrap();
        f.book.close().unwrap();
        f.book.open_final([f.slots[0].clone(), f.slots[1].clone()]).unwrap();

        assert!(matches!(
            f.book.place(&f.ledger, f.store.as_ref(), &punter, 3, 50),
            Err(GameError::UnknownSlot { slot: 3, max: 2 })
        ));
        f.book.place(&f.ledger, f.store.as_ref(), &punter, 2, 50).unwrap();
        assert_eq!(f.ledger.cash(&punter).unwrap(), 850);
    }

    #[test]
    fn test_exclusive_phases() {
        let rules = BettingRules {
            exclusive_phases: true,
            ..BettingRules::default()
        };
        let mut f = fixture(rules);
        let punter = p("punter");
        f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 100).unwrap();
        f.book.close().unwrap();
        f.book.open_final([f.slots[0].clone(), f.slots[1].clone()]).unwrap();

        let err = f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 50).unwrap_err();
        assert_eq!(
            err,
            GameError::AlreadyBet {
                bettor: punter.clone(),
                phase: BettingPhase::Initial
            }
        );
    }

    #[test]
    fn test_persist_failure_refunds() {
        let mut f = fixture(BettingRules::default());
        let punter = p("punter");
        f.ledger.cash(&punter).unwrap();
        f.store.fail(Write::SetBlob);

        let err = f.book.place(&f.ledger, f.store.as_ref(), &punter, 1, 100).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceUnavailable);
        assert_eq!(f.ledger.cash(&punter).unwrap(), 1000);
        assert!(f.book.wagers(BettingPhase::Initial).is_empty());
    }

    #[test]
    fn test_settlement_pays_multipliers_once() {
        let mut f = fixture(BettingRules::default());
        let store = f.store.clone();
        f.book.place(&f.ledger, store.as_ref(), &p("x"), 2, 100).unwrap();
        f.book.place(&f.ledger, store.as_ref(), &p("y"), 3, 200).unwrap();
        f.book.close().unwrap();
        f.book.open_final([f.slots[1].clone(), f.slots[2].clone()]).unwrap();
        f.book.place(&f.ledger, store.as_ref(), &p("x"), 1, 50).unwrap();
        f.book.place(&f.ledger, store.as_ref(), &p("z"), 2, 70).unwrap();
        f.book.close().unwrap();

        let settlement = f.book.settle(&f.ledger, store.as_ref(), &p("b")).unwrap();
        assert_eq!(settlement.total_paid, 100 * 30 + 50 * 2);
        assert_eq!(settlement.winners().count(), 2);
        assert_eq!(f.ledger.cash(&p("x")).unwrap(), 850 + 3000 + 100);
        assert_eq!(f.ledger.cash(&p("y")).unwrap(), 800);
        assert_eq!(f.ledger.cash(&p("z")).unwrap(), 930);
        assert!(load_wagers(store.as_ref(), &f.book.session).unwrap().is_none());

        assert_eq!(
            f.book.settle(&f.ledger, store.as_ref(), &p("b")).unwrap_err(),
            GameError::AlreadySettled
        );
    }

    #[test]
    fn test_failed_payout_stays_recorded_until_paid() {
        let mut f = fixture(BettingRules::default());
        let store = f.store.clone();
        f.book.place(&f.ledger, store.as_ref(), &p("x"), 2, 100).unwrap();
        f.book.place(&f.ledger, store.as_ref(), &p("y"), 2, 10).unwrap();
        f.book.place(&f.ledger, store.as_ref(), &p("z"), 3, 200).unwrap();
        f.book.close().unwrap();

        store.fail_for(Write::SetBalance, &p("x"));
        let err = f.book.settle(&f.ledger, store.as_ref(), &p("b")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceUnavailable);
        assert!(!f.book.is_settled());
        assert_eq!(f.ledger.cash(&p("y")).unwrap(), 990 + 300);

        let left = f.book.wagers(BettingPhase::Initial);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].bettor, p("x"));
        let snap = load_wagers(store.as_ref(), &f.book.session).unwrap().unwrap();
        assert_eq!(snap.initial.len(), 1);
        assert_eq!(snap.initial[0].bettor, p("x"));

        store.heal();
        let retry = f.book.settle(&f.ledger, store.as_ref(), &p("b")).unwrap();
        assert_eq!(retry.total_paid, 3000);
        assert_eq!(f.ledger.cash(&p("x")).unwrap(), 3900);
        assert_eq!(f.ledger.cash(&p("y")).unwrap(), 1290);
        assert!(f.book.is_settled());
        assert!(load_wagers(store.as_ref(), &f.book.session).unwrap().is_none());
    }

    #[test]
    fn test_refund_all() {
        let mut f = fixture(BettingRules::default());
        let store = f.store.clone();
        f.book.place(&f.ledger, store.as_ref(), &p("x"), 2, 100).unwrap();
        f.book.place(&f.ledger, store.as_ref(), &p("y"), 1, 300).unwrap();

        assert_eq!(f.book.refund_all(&f.ledger, store.as_ref()), 400);
        assert_eq!(f.ledger.cash(&p("x")).unwrap(), 1000);
        assert_eq!(f.ledger.cash(&p("y")).unwrap(), 1000);
        assert!(f.book.is_settled());
    }
}
