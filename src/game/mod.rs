//! Game Logic Module
//!
//! The elimination game itself.
//!
//! ## Module Structure
//!
//! - `roster`: Registered participants and betting order
//! - `betting`: Wager book, phases and settlement
//! - `session`: Session state machine and draws
//! - `events`: Structured events and their chat lines
//! - `engine`: Scheduler task and the public operations

pub mod betting;
pub mod engine;
pub mod events;
pub mod roster;
pub mod session;

// Re-export key types
pub use betting::{BettingBook, BettingPhase, Payout, Settlement, Wager};
pub use engine::GameEngine;
pub use events::{GameEvent, GameEventData};
pub use roster::{betting_order, Participant, Roster};
pub use session::{Session, SessionOutcome, SessionState, SessionStatus};
