//! # Nameplate Game Server
//!
//! Elimination game with wagering, a persistent player economy and
//! cosmetic nameplates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    NAMEPLATE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── id.rs       - Player, item and session identifiers      │
//! │  ├── rng.rs      - Secure, seeded and scripted draws         │
//! │  ├── hash.rs     - Item ids and participant fingerprints     │
//! │  └── clock.rs    - Wall clock (fine accrual)                 │
//! │                                                              │
//! │  economy/        - Player economy                            │
//! │  ├── ledger.rs   - Cash, bank and compounding fines          │
//! │  ├── inventory.rs- Items, equip state, consumable gear       │
//! │  ├── shop.rs     - Equipment purchases and sale prices       │
//! │  ├── robbery.rs  - Robbery, plate robbery, scouting          │
//! │  ├── reward.rs   - Prize rarity roll and catalog pick        │
//! │  └── coin.rs     - Coin toss gamble                          │
//! │                                                              │
//! │  game/           - Elimination game                          │
//! │  ├── roster.rs   - Participants and betting order            │
//! │  ├── betting.rs  - Wagers and settlement                     │
//! │  ├── session.rs  - Session state machine                     │
//! │  ├── events.rs   - Game events                               │
//! │  └── engine.rs   - Scheduler and public operations           │
//! │                                                              │
//! │  store/          - Persistence (memory, JSON file)           │
//! │  chat/           - Message emission                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - No balance is ever negative; every debit checks first.
//! - Mutations fail closed: if the store refuses a write, the change is
//!   not applied in memory either.
//! - At most one session runs at a time.
//! - An equipped reference always points at an item its owner holds.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod chat;
pub mod config;
pub mod core;
pub mod economy;
pub mod error;
pub mod game;
pub mod store;

// Re-export commonly used types
pub use crate::chat::{ChannelNotifier, LogNotifier, Notifier};
pub use crate::config::EngineConfig;
pub use crate::core::{PlayerId, SessionId};
pub use crate::economy::{CatalogEntry, Ledger, Rarity};
pub use crate::error::{ErrorKind, GameError, GameResult};
pub use crate::game::{GameEngine, Participant, SessionOutcome, SessionState};
pub use crate::store::{JsonFileStore, MemoryStore, Store};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
