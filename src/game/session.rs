//! # Game Session
//!
//! One run of the elimination game: the participants still standing, the
//! elimination order, the prize and the wagers. The engine's scheduler
//! task drives a [`Session`] through its states; the session itself only
//! enforces the transition table and performs the draws.
//!
//! ```text
//! Idle → BettingInitial → EliminationRounds ─┬─────────────────────────────→ Settlement → Idle
//!                                            └→ FinalDuoPrep → FinalDuoBetting → FinalDuoResolve ┘
//! (any in-progress state) → Cancelled → Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use super::betting::{BettingBook, BettingPhase, Settlement};
use super::roster::{betting_order, Participant};
use crate::config::BettingRules;
use crate::core::{ChatId, MessageId, RandomSource, SessionId};
use crate::economy::{InventoryItem, SelectedReward};
use crate::error::{GameError, GameResult};

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Opening bets are accepted.
    BettingInitial,
    /// Participants are being eliminated one per round.
    EliminationRounds,
    /// Two left, finalists announced.
    FinalDuoPrep,
    /// Bets on the finalists are accepted.
    FinalDuoBetting,
    /// Coin flip between the finalists.
    FinalDuoResolve,
    /// Paying out wagers and the prize.
    Settlement,
    /// Stopped by request.
    Cancelled,
}

impl SessionState {
    /// Whether a session in this state still holds the in-progress flag.
    pub fn is_in_progress(self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Cancelled)
    }

    /// Allowed state changes.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, BettingInitial)
            | (BettingInitial, EliminationRounds)
            | (EliminationRounds, FinalDuoPrep)
            | (EliminationRounds, Settlement)
            | (FinalDuoPrep, FinalDuoBetting)
            | (FinalDuoBetting, FinalDuoResolve)
            | (FinalDuoResolve, Settlement)
            | (Settlement, Idle)
            | (Cancelled, Idle) => true,
            (from, Cancelled) => from.is_in_progress() && from != Settlement,
            _ => false,
        }
    }
}

/// A finished session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Session id.
    pub session: SessionId,
    /// Winner.
    pub winner: Participant,
    /// Losing finalist, if the final duo was played.
    pub runner_up: Option<Participant>,
    /// Eliminated participants, first out first.
    pub eliminated: Vec<Participant>,
    /// Prize rolled at start.
    pub reward: SelectedReward,
    /// Prize stack as granted to the winner. `None` if the grant failed.
    pub prize: Option<InventoryItem>,
    /// Wager resolution.
    pub settlement: Settlement,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
}

/// Read-only view of the engine's session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Running session, if any.
    pub session: Option<SessionId>,
    /// Lifecycle state.
    pub state: SessionState,
    /// Betting phase.
    pub phase: BettingPhase,
    /// Rounds played.
    pub round: u32,
    /// Rounds the session will play (participants at start minus one).
    pub total_rounds: u32,
    /// Participants still in.
    pub remaining: Vec<Participant>,
    /// Eliminated participants, first out first.
    pub eliminated: Vec<Participant>,
    /// Prize rolled at start.
    pub reward: Option<SelectedReward>,
    /// Wagers placed in the initial phase.
    pub initial_wagers: usize,
    /// Wagers placed in the final phase.
    pub final_wagers: usize,
}

impl SessionStatus {
    /// Status with no session.
    pub fn idle() -> Self {
        Self {
            session: None,
            state: SessionState::Idle,
            phase: BettingPhase::None,
            round: 0,
            total_rounds: 0,
            remaining: Vec::new(),
            eliminated: Vec::new(),
            reward: None,
            initial_wagers: 0,
            final_wagers: 0,
        }
    }
}

/// Live session state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    chat: ChatId,
    state: SessionState,
    slots: Vec<Participant>,
    remaining: Vec<Participant>,
    eliminated: Vec<Participant>,
    round: u32,
    total_rounds: u32,
    reward: SelectedReward,
    started_at: DateTime<Utc>,
    /// Message edited with each round result.
    pub game_message: Option<MessageId>,
    /// Wagers.
    pub book: BettingBook,
    cancel: watch::Sender<bool>,
}

impl Session {
    /// Snapshot `participants` into a new idle session.
    ///
    /// `participants` keeps its order for elimination draws; betting slots
    /// use [`betting_order`].
    pub fn new(
        chat: ChatId,
        participants: Vec<Participant>,
        reward: SelectedReward,
        rules: BettingRules,
        cancel: watch::Sender<bool>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let id = SessionId::generate();
        let total_rounds = participants.len().saturating_sub(1) as u32;
        Self {
            id,
            chat,
            state: SessionState::Idle,
            slots: betting_order(&participants),
            remaining: participants,
            eliminated: Vec::new(),
            round: 0,
            total_rounds,
            reward,
            started_at,
            game_message: None,
            book: BettingBook::new(id, rules),
            cancel,
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Chat the session runs in.
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Initial betting slots.
    pub fn slots(&self) -> &[Participant] {
        &self.slots
    }

    /// Participants still in.
    pub fn remaining(&self) -> &[Participant] {
        &self.remaining
    }

    /// Eliminated participants.
    pub fn eliminated(&self) -> &[Participant] {
        &self.eliminated
    }

    /// Rolled prize.
    pub fn reward(&self) -> &SelectedReward {
        &self.reward
    }

    /// Start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// (rounds played, total rounds).
    pub fn progress(&self) -> (u32, u32) {
        (self.round, self.total_rounds)
    }

    /// Move to `next` if the transition table allows it.
    pub fn advance(&mut self, next: SessionState) -> GameResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(GameError::InvalidSessionTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(session = %self.id.short(), from = ?self.state, to = ?next, "Session state");
        self.state = next;
        Ok(())
    }

    /// Signal the scheduler to stop at its next wait.
    pub fn request_cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether cancellation was requested.
    pub fn cancel_requested(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Remove one uniformly chosen participant.
    ///
    /// Only legal with three or more remaining; the last two go to the final.
    pub fn eliminate(&mut self, rng: &dyn RandomSource) -> GameResult<Participant> {
        if self.state != SessionState::EliminationRounds {
            return Err(GameError::InvalidSessionTransition {
                from: self.state,
                to: SessionState::EliminationRounds,
            });
        }
        if self.remaining.len() < 3 || self.round >= self.total_rounds {
            return Err(GameError::InvalidArgument(format!(
                "cannot eliminate with {} participants after round {}/{}",
                self.remaining.len(),
                self.round,
                self.total_rounds
            )));
        }
        let index = rng.index(self.remaining.len());
        let out = self.remaining.remove(index);
        self.eliminated.push(out.clone());
        self.round += 1;
        info!(
            session = %self.id.short(),
            round = self.round,
            total = self.total_rounds,
            eliminated = %out.id,
            remaining = self.remaining.len(),
            "Participant eliminated"
        );
        Ok(out)
    }

    /// The two finalists in betting order, once exactly two remain.
    pub fn finalists(&self) -> Option<[Participant; 2]> {
        match betting_order(&self.remaining).as_slice() {
            [a, b] => Some([a.clone(), b.clone()]),
            _ => None,
        }
    }

    /// Flip a coin between the finalists. Returns (winner, loser).
    pub fn resolve_final(&mut self, rng: &dyn RandomSource) -> GameResult<(Participant, Participant)> {
        if self.state != SessionState::FinalDuoResolve {
            return Err(GameError::InvalidSessionTransition {
                from: self.state,
                to: SessionState::FinalDuoResolve,
            });
        }
        let [first, second] = self.finalists().ok_or_else(|| {
            GameError::InvalidArgument(format!("final needs two participants, have {}", self.remaining.len()))
        })?;
        let (winner, loser) = if rng.coin() == 0 {
            (first, second)
        } else {
            (second, first)
        };
        self.remaining.retain(|p| p.id == winner.id);
        self.eliminated.push(loser.clone());
        self.round = self.total_rounds;
        info!(session = %self.id.short(), winner = %winner.id, loser = %loser.id, "Final resolved");
        Ok((winner, loser))
    }

    /// Read-only snapshot.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session: Some(self.id),
            state: self.state,
            phase: self.book.phase(),
            round: self.round,
            total_rounds: self.total_rounds,
            remaining: self.remaining.clone(),
            eliminated: self.eliminated.clone(),
            reward: Some(self.reward.clone()),
            initial_wagers: self.book.wagers(BettingPhase::Initial).len(),
            final_wagers: self.book.wagers(BettingPhase::Final).len(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
