//! Game Events
//!
//! Structured events emitted while a session runs. The engine broadcasts
//! them to subscribers and renders the plain-text chat lines from
//! [`GameEvent::summary`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::betting::BettingPhase;
use super::roster::Participant;
use crate::core::{PlayerId, SessionId};
use crate::economy::{CatalogEntry, Rarity};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Session accepted; initial betting is about to open.
    SessionStarted {
        participants: usize,
        rarity: Rarity,
        prize: CatalogEntry,
    },

    /// A betting phase opened over these slots.
    BettingOpened {
        phase: BettingPhase,
        slots: Vec<Participant>,
    },

    /// Wager accepted.
    BetPlaced {
        bettor: PlayerId,
        target: PlayerId,
        amount: i64,
        phase: BettingPhase,
    },

    /// Betting closed.
    BettingClosed { phase: BettingPhase, wagers: usize },

    /// Participant removed in an elimination round.
    ParticipantEliminated {
        round: u32,
        total_rounds: u32,
        participant: Participant,
        remaining: usize,
    },

    /// Two participants left.
    FinalistsAnnounced { finalists: [Participant; 2] },

    /// Session winner.
    WinnerDecided {
        winner: Participant,
        runner_up: Option<Participant>,
    },

    /// Wagers resolved.
    Settled { winning_wagers: usize, total_paid: i64 },

    /// Prize granted to the winner.
    PrizeAwarded {
        winner: PlayerId,
        prize: CatalogEntry,
    },

    /// Session stopped by request.
    SessionCancelled { refunded: i64 },

    /// Session aborted on an internal error.
    SessionFailed { reason: String },
}

/// An event with its session and wall-clock time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Owning session.
    pub session: SessionId,
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Event data.
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(session: SessionId, at: DateTime<Utc>, data: GameEventData) -> Self {
        Self { session, at, data }
    }

    /// Participant eliminated event.
    pub fn eliminated(
        session: SessionId,
        at: DateTime<Utc>,
        round: u32,
        total_rounds: u32,
        participant: Participant,
        remaining: usize,
    ) -> Self {
        Self::new(
            session,
            at,
            GameEventData::ParticipantEliminated {
                round,
                total_rounds,
                participant,
                remaining,
            },
        )
    }

    /// Betting opened event.
    pub fn betting_opened(session: SessionId, at: DateTime<Utc>, phase: BettingPhase, slots: Vec<Participant>) -> Self {
        Self::new(session, at, GameEventData::BettingOpened { phase, slots })
    }

    /// Winner decided event.
    pub fn winner(session: SessionId, at: DateTime<Utc>, winner: Participant, runner_up: Option<Participant>) -> Self {
        Self::new(session, at, GameEventData::WinnerDecided { winner, runner_up })
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.data,
            GameEventData::PrizeAwarded { .. }
                | GameEventData::SessionCancelled { .. }
                | GameEventData::SessionFailed { .. }
        )
    }

    /// Plain-text line for the chat.
    pub fn summary(&self) -> String {
        match &self.data {
            GameEventData::SessionStarted {
                participants,
                rarity,
                prize,
            } => format!(
                "Game on! {} participants are playing for a {} nameplate: {} (worth {}).",
                participants, rarity, prize.name, prize.value
            ),
            GameEventData::BettingOpened { phase, slots } => {
                let mut text = match phase {
                    BettingPhase::Final => "Final betting is open! Pick a finalist:".to_string(),
                    _ => "Betting is open! Pick your winner:".to_string(),
                };
                for (i, p) in slots.iter().enumerate() {
                    text.push_str(&format!("\n{}. {}", i + 1, p.label()));
                }
                text
            }
            GameEventData::BetPlaced {
                bettor,
                target,
                amount,
                phase,
            } => format!("{} bet {} on {} ({} phase).", bettor, amount, target, phase),
            GameEventData::BettingClosed { phase, wagers } => {
                format!("{} betting closed with {} wagers.", capitalize(&phase.to_string()), wagers)
            }
            GameEventData::ParticipantEliminated {
                round,
                total_rounds,
                participant,
                remaining,
            } => format!(
                "Round {}/{}: {} is out. {} left.",
                round,
                total_rounds,
                participant.label(),
                remaining
            ),
            GameEventData::FinalistsAnnounced { finalists } => format!(
                "Final duo: {} vs {}!",
                finalists[0].label(),
                finalists[1].label()
            ),
            GameEventData::WinnerDecided { winner, runner_up } => match runner_up {
                Some(loser) => format!("{} beats {} and wins the game!", winner.label(), loser.label()),
                None => format!("{} wins the game!", winner.label()),
            },
            GameEventData::Settled {
                winning_wagers,
                total_paid,
            } => format!("{} winning bets paid out {} in total.", winning_wagers, total_paid),
            GameEventData::PrizeAwarded { winner, prize } => {
                format!("{} receives the {} nameplate {}.", winner, prize.rarity, prize.name)
            }
            GameEventData::SessionCancelled { refunded } if *refunded > 0 => {
                format!("Game cancelled. {} in open bets refunded.", refunded)
            }
            GameEventData::SessionCancelled { .. } => "Game cancelled.".to_string(),
            GameEventData::SessionFailed { reason } => format!("Game aborted: {}", reason),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summaries() {
        let session = SessionId::generate();
        let now = Utc::now();
        let ann = Participant::new("ann", "Ann Adams");
        let bob = Participant::new("bob", "Bob Brown");

        let opened = GameEvent::betting_opened(session, now, BettingPhase::Initial, vec![ann.clone(), bob.clone()]);
        assert_eq!(
            opened.summary(),
            "Betting is open! Pick your winner:\n1. Ann Adams (@ann)\n2. Bob Brown (@bob)"
        );

        let out = GameEvent::eliminated(session, now, 1, 4, ann.clone(), 4);
        assert_eq!(out.summary(), "Round 1/4: Ann Adams (@ann) is out. 4 left.");

        let closed = GameEvent::new(
            session,
            now,
            GameEventData::BettingClosed {
                phase: BettingPhase::Final,
                wagers: 3,
            },
        );
        assert_eq!(closed.summary(), "Final betting closed with 3 wagers.");

        let won = GameEvent::winner(session, now, bob, Some(ann));
        assert!(won.summary().starts_with("Bob Brown (@bob) beats"));
        assert!(!won.is_terminal());
    }

    #[test]
    fn test_terminal_events() {
        let event = GameEvent::new(
            SessionId::generate(),
            Utc::now(),
            GameEventData::SessionCancelled { refunded: 0 },
        );
        assert!(event.is_terminal());
        assert_eq!(event.summary(), "Game cancelled.");
    }
}
