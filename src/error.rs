//! # Game Error Types
//!
//! Every operation of the engine surfaces one of these. Callers map them
//! to user-facing replies through [`GameError::kind`]; nothing is retried.

use thiserror::Error;

use crate::core::{ItemId, PlayerId};
use crate::economy::item::Rarity;
use crate::game::betting::BettingPhase;
use crate::game::session::SessionState;
use crate::store::StoreError;

/// Coarse classification used by command handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad argument shape; rejected with no state change.
    Validation,
    /// Operation conflicts with current session or equipment state.
    StateConflict,
    /// Not enough cash for the operation.
    InsufficientFunds,
    /// Unknown item, player, or empty catalog tier.
    NotFound,
    /// Durable storage refused the write; the mutation was not applied.
    PersistenceUnavailable,
}

/// Errors that can occur in the game engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Amount was zero or negative.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// Slot number does not map to a participant in the open phase.
    #[error("unknown slot {slot}, valid slots are 1..={max}")]
    UnknownSlot {
        /// Requested slot.
        slot: usize,
        /// Highest valid slot.
        max: usize,
    },

    /// A player tried to act on themselves.
    #[error("{0} cannot target themselves")]
    SelfTarget(PlayerId),

    /// Malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A session is already scheduled or running.
    #[error("a session is already running")]
    SessionAlreadyRunning,

    /// No session is currently running.
    #[error("no session is running")]
    NoSessionRunning,

    /// Roster is too small to start.
    #[error("need at least {required} participants, have {have}")]
    InsufficientParticipants {
        /// Participants required.
        required: usize,
        /// Participants present.
        have: usize,
    },

    /// Betting is not open for the requested phase.
    #[error("betting is closed (current phase: {0})")]
    BettingClosed(BettingPhase),

    /// Bettor already holds a wager in this phase.
    #[error("{bettor} already placed a {phase} bet")]
    AlreadyBet {
        /// Bettor.
        bettor: PlayerId,
        /// Phase of the existing wager.
        phase: BettingPhase,
    },

    /// Phase change not allowed from the current phase.
    #[error("betting phase cannot move from {from} to {to}")]
    InvalidPhaseTransition {
        /// Current phase.
        from: BettingPhase,
        /// Requested phase.
        to: BettingPhase,
    },

    /// Session state change not allowed from the current state.
    #[error("session cannot move from {from:?} to {to:?}")]
    InvalidSessionTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// Wagers for this session were already settled.
    #[error("session already settled")]
    AlreadySettled,

    /// Roster cannot change while a session runs.
    #[error("roster is locked while a session is running")]
    RosterLocked,

    /// Player is already on the roster.
    #[error("{0} is already registered")]
    AlreadyRegistered(PlayerId),

    /// Unequip with nothing worn.
    #[error("{0} has nothing equipped")]
    NothingEquipped(PlayerId),

    /// Cash is short for the requested debit.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount required.
        needed: i64,
        /// Amount available.
        available: i64,
    },

    /// Named item missing from an inventory.
    #[error("{owner} has no item named {name}")]
    ItemNotFound {
        /// Inventory owner.
        owner: PlayerId,
        /// Item name looked up.
        name: String,
    },

    /// Item id missing from an inventory.
    #[error("{owner} has no item {id}")]
    ItemIdNotFound {
        /// Inventory owner.
        owner: PlayerId,
        /// Item id looked up.
        id: ItemId,
    },

    /// Victim has no cosmetic to steal.
    #[error("{0} has no nameplates")]
    NoCosmetics(PlayerId),

    /// Player is not on the roster.
    #[error("unknown participant {0}")]
    UnknownParticipant(PlayerId),

    /// Shop has no listing with this number.
    #[error("no shop listing {0}")]
    UnknownListing(usize),

    /// Catalog has no entries of the tier.
    #[error("no prize of rarity {0}")]
    NoPrizeForRarity(Rarity),

    /// Store refused the operation.
    #[error("persistence unavailable: {0}")]
    Persistence(#[from] StoreError),
}

impl GameError {
    /// Classification for user-facing reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::NonPositiveAmount(_)
            | GameError::UnknownSlot { .. }
            | GameError::SelfTarget(_)
            | GameError::InvalidArgument(_)
            | GameError::UnknownListing(_) => ErrorKind::Validation,

            GameError::SessionAlreadyRunning
            | GameError::NoSessionRunning
            | GameError::InsufficientParticipants { .. }
            | GameError::BettingClosed(_)
            | GameError::AlreadyBet { .. }
            | GameError::InvalidPhaseTransition { .. }
            | GameError::InvalidSessionTransition { .. }
            | GameError::AlreadySettled
            | GameError::RosterLocked
            | GameError::AlreadyRegistered(_)
            | GameError::NothingEquipped(_) => ErrorKind::StateConflict,

            GameError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,

            GameError::ItemNotFound { .. }
            | GameError::ItemIdNotFound { .. }
            | GameError::NoCosmetics(_)
            | GameError::UnknownParticipant(_)
            | GameError::NoPrizeForRarity(_) => ErrorKind::NotFound,

            GameError::Persistence(_) => ErrorKind::PersistenceUnavailable,
        }
    }
}

/// Result type for engine operations.
pub type GameResult<T> = Result<T, GameError>;
