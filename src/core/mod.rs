//! Core primitives.
//!
//! Identifiers, random sources, hashing and time. Everything above this
//! layer receives its randomness and clock through these traits.

pub mod clock;
pub mod hash;
pub mod id;
pub mod rng;

// Re-export core types
pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{ChatId, ItemId, MessageId, PlayerId, SessionId};
pub use rng::{DeterministicRng, RandomSource, ScriptedRng, SecureRng, SeededRng};
