//! # Game Engine
//!
//! Owns the roster, the running session and the economy services, and
//! runs the scheduler task that drives a session from opening bets to
//! settlement.
//!
//! Command handlers call the async operations on a cloned [`GameEngine`]
//! concurrently with the scheduler. Session state sits behind one tokio
//! `RwLock`; balances are serialized per player inside the [`Ledger`].
//! A bet accepted in the instant before the scheduler closes betting is
//! still honoured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::betting::{BettingPhase, Wager};
use super::events::{GameEvent, GameEventData};
use super::roster::{Participant, Roster};
use super::session::{Session, SessionOutcome, SessionState, SessionStatus};
use crate::chat::Notifier;
use crate::config::EngineConfig;
use crate::core::{ChatId, Clock, MessageId, PlayerId, RandomSource, SecureRng, SessionId, SystemClock};
use crate::economy::{CoinToss, Heists, Inventory, Ledger, RewardTable};
use crate::error::{GameError, GameResult};
use crate::store::Store;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why the scheduler stopped early.
#[derive(Debug)]
enum Interrupt {
    Cancelled,
    Failed(GameError),
}

impl From<GameError> for Interrupt {
    fn from(e: GameError) -> Self {
        Interrupt::Failed(e)
    }
}

/// How a chat line is delivered.
#[derive(Clone, Copy)]
enum Delivery {
    Send,
    Edit(Option<MessageId>),
}

/// What the next round does.
enum Step {
    Continue,
    Final,
    Winner(Participant),
}

#[derive(Default)]
struct EngineState {
    roster: Roster,
    session: Option<Session>,
    last_outcome: Option<SessionOutcome>,
    task: Option<JoinHandle<()>>,
}

impl EngineState {
    fn session_mut(&mut self) -> Result<&mut Session, Interrupt> {
        self.session.as_mut().ok_or(Interrupt::Cancelled)
    }
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    ledger: Arc<Ledger>,
    inventory: Arc<Inventory>,
    heists: Heists,
    coin: CoinToss,
    rewards: RewardTable,
    notifier: Arc<dyn Notifier>,
    state: RwLock<EngineState>,
    events: broadcast::Sender<GameEvent>,
}

/// The elimination game.
///
/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct GameEngine {
    inner: Arc<EngineInner>,
}

impl GameEngine {
    /// Engine with OS randomness and the system clock.
    pub fn new(config: EngineConfig, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_parts(config, store, notifier, Arc::new(SecureRng), Arc::new(SystemClock))
    }

    /// Engine with an explicit random source and clock.
    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        rng: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(store.clone(), clock.clone(), config.economy.clone()));
        let inventory = Arc::new(Inventory::new(store.clone(), ledger.clone(), config.shop.clone()));
        let heists = Heists::new(inventory.clone(), rng.clone(), config.economy.clone());
        let coin = CoinToss::new(ledger.clone(), rng.clone(), config.economy.coin.clone());
        let rewards = RewardTable::new(
            store.clone(),
            rng.clone(),
            config.rewards.clone(),
            config.default_prize.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                clock,
                rng,
                ledger,
                inventory,
                heists,
                coin,
                rewards,
                notifier,
                state: RwLock::new(EngineState::default()),
                events,
            }),
        }
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Balances.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.inner.ledger
    }

    /// Items, equipment and the shop.
    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inner.inventory
    }

    /// Robbery and scouting.
    pub fn heists(&self) -> &Heists {
        &self.inner.heists
    }

    /// Coin toss gamble.
    pub fn coin(&self) -> &CoinToss {
        &self.inner.coin
    }

    /// Players with an outstanding fine, largest first.
    pub fn shame_board(&self) -> GameResult<Vec<(PlayerId, i64)>> {
        self.inner.ledger.debtors()
    }

    /// Receive every game event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Roster
    // =========================================================================

    /// Register a participant.
    pub async fn add_participant(&self, participant: Participant) -> GameResult<()> {
        let mut state = self.inner.state.write().await;
        if state.session.is_some() {
            return Err(GameError::RosterLocked);
        }
        let (id, name) = (participant.id.clone(), participant.display_name.clone());
        state.roster.add(participant)?;
        info!(participant = %id, %name, "Participant added");
        Ok(())
    }

    /// Unregister a participant.
    pub async fn remove_participant(&self, id: &PlayerId) -> GameResult<Participant> {
        let mut state = self.inner.state.write().await;
        if state.session.is_some() {
            return Err(GameError::RosterLocked);
        }
        let removed = state.roster.remove(id)?;
        info!(participant = %id, "Participant removed");
        Ok(removed)
    }

    /// Bring every registered participant back, in shuffled order.
    pub async fn reset_roster(&self) -> GameResult<usize> {
        let mut state = self.inner.state.write().await;
        if state.session.is_some() {
            return Err(GameError::RosterLocked);
        }
        state.roster.reset(self.inner.rng.as_ref());
        Ok(state.roster.len())
    }

    /// Active participants in roster order.
    pub async fn participants(&self) -> Vec<Participant> {
        self.inner.state.read().await.roster.active()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Start a session in `chat` and spawn its scheduler.
    #[instrument(skip(self))]
    pub async fn start_session(&self, chat: ChatId) -> GameResult<SessionId> {
        let mut state = self.inner.state.write().await;
        if state.session.is_some() {
            return Err(GameError::SessionAlreadyRunning);
        }
        let participants = state.roster.active();
        let required = self.inner.config.betting.min_participants;
        if participants.len() < required {
            return Err(GameError::InsufficientParticipants {
                required,
                have: participants.len(),
            });
        }

        let reward = self.inner.rewards.select()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut session = Session::new(
            chat,
            participants,
            reward.clone(),
            self.inner.config.betting.clone(),
            cancel_tx,
            self.inner.clock.now(),
        );
        session.advance(SessionState::BettingInitial)?;
        let slots = session.slots().to_vec();
        session.book.open_initial(slots)?;

        let id = session.id();
        info!(
            session = %id.short(),
            participants = session.remaining().len(),
            rarity = %reward.rarity,
            prize = %reward.prize.name,
            "Session started"
        );
        self.emit(
            &session,
            Delivery::Send,
            GameEventData::SessionStarted {
                participants: session.remaining().len(),
                rarity: reward.rarity,
                prize: reward.prize,
            },
        );
        self.emit(
            &session,
            Delivery::Send,
            GameEventData::BettingOpened {
                phase: BettingPhase::Initial,
                slots: session.slots().to_vec(),
            },
        );

        state.session = Some(session);
        let engine = self.clone();
        state.task = Some(tokio::spawn(async move {
            engine.run_session(id, cancel_rx).await;
        }));
        Ok(id)
    }

    /// Place a wager in the open phase of the running session.
    pub async fn place_bet(&self, bettor: &PlayerId, slot: usize, amount: i64) -> GameResult<Wager> {
        let mut state = self.inner.state.write().await;
        let session = state
            .session
            .as_mut()
            .ok_or(GameError::BettingClosed(BettingPhase::None))?;
        let wager = session
            .book
            .place(&self.inner.ledger, self.inner.store.as_ref(), bettor, slot, amount)?;
        self.emit(
            session,
            Delivery::Send,
            GameEventData::BetPlaced {
                bettor: wager.bettor.clone(),
                target: wager.target.id.clone(),
                amount: wager.amount,
                phase: wager.phase,
            },
        );
        Ok(wager)
    }

    /// Ask the running session to stop at its next wait.
    pub async fn cancel(&self) -> GameResult<()> {
        let state = self.inner.state.read().await;
        let session = state.session.as_ref().ok_or(GameError::NoSessionRunning)?;
        info!(session = %session.id().short(), "Cancellation requested");
        session.request_cancel();
        Ok(())
    }

    /// Wait for the scheduler task to finish.
    pub async fn join(&self) {
        let task = self.inner.state.write().await.task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Session task panicked");
            }
        }
    }

    /// Snapshot of the running session.
    pub async fn status(&self) -> SessionStatus {
        let state = self.inner.state.read().await;
        state
            .session
            .as_ref()
            .map(Session::status)
            .unwrap_or_else(SessionStatus::idle)
    }

    /// Result of the most recently finished session.
    pub async fn last_outcome(&self) -> Option<SessionOutcome> {
        self.inner.state.read().await.last_outcome.clone()
    }

    // =========================================================================
    // Scheduler
    // =========================================================================

    #[instrument(skip(self, cancel), fields(session = %id.short()))]
    async fn run_session(self, id: SessionId, mut cancel: watch::Receiver<bool>) {
        match self.drive(&mut cancel).await {
            Ok(outcome) => {
                info!(winner = %outcome.winner.id, paid = outcome.settlement.total_paid, "Session finished");
            }
            Err(Interrupt::Cancelled) => self.finish_cancelled().await,
            Err(Interrupt::Failed(e)) => self.finish_failed(e).await,
        }
    }

    async fn drive(&self, cancel: &mut watch::Receiver<bool>) -> Result<SessionOutcome, Interrupt> {
        let timings = self.inner.config.timings.clone();

        // Initial betting window
        self.pause(timings.initial_betting, cancel).await?;
        {
            let mut state = self.inner.state.write().await;
            let session = state.session_mut()?;
            session.book.close()?;
            session.advance(SessionState::EliminationRounds)?;
            let wagers = session.book.wagers(BettingPhase::Initial).len();
            self.emit(
                session,
                Delivery::Send,
                GameEventData::BettingClosed {
                    phase: BettingPhase::Initial,
                    wagers,
                },
            );
            let chat = session.chat();
            session.game_message = self.send_line(chat, "The game begins!");
        }
        self.pause(timings.start_delay, cancel).await?;

        // Elimination rounds
        let winner = loop {
            let step = {
                let mut state = self.inner.state.write().await;
                let EngineState { roster, session, .. } = &mut *state;
                let session = session.as_mut().ok_or(Interrupt::Cancelled)?;
                match session.remaining().len() {
                    0 => {
                        return Err(Interrupt::Failed(GameError::InvalidArgument(
                            "session has no participants".into(),
                        )))
                    }
                    1 => Step::Winner(session.remaining()[0].clone()),
                    2 => Step::Final,
                    _ => {
                        let out = session.eliminate(self.inner.rng.as_ref())?;
                        roster.deactivate(&out.id);
                        let (round, total_rounds) = session.progress();
                        let event = GameEvent::eliminated(
                            session.id(),
                            self.inner.clock.now(),
                            round,
                            total_rounds,
                            out,
                            session.remaining().len(),
                        );
                        self.publish(session, Delivery::Edit(session.game_message), event);
                        Step::Continue
                    }
                }
            };
            match step {
                Step::Continue => self.pause(timings.round_delay + timings.round_pause, cancel).await?,
                Step::Final => break self.final_duo(cancel).await?,
                Step::Winner(winner) => break (winner, None),
            }
        };

        self.settle(winner.0, winner.1).await
    }

    async fn final_duo(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(Participant, Option<Participant>), Interrupt> {
        let timings = &self.inner.config.timings;

        let finalists = {
            let mut state = self.inner.state.write().await;
            let session = state.session_mut()?;
            session.advance(SessionState::FinalDuoPrep)?;
            let finalists = session.finalists().ok_or_else(|| {
                GameError::InvalidArgument(format!(
                    "final needs two participants, have {}",
                    session.remaining().len()
                ))
            })?;
            self.emit(
                session,
                Delivery::Send,
                GameEventData::FinalistsAnnounced {
                    finalists: finalists.clone(),
                },
            );
            finalists
        };
        self.pause(timings.pre_final_delay, cancel).await?;

        {
            let mut state = self.inner.state.write().await;
            let session = state.session_mut()?;
            session.advance(SessionState::FinalDuoBetting)?;
            session.book.open_final(finalists.clone())?;
            self.emit(
                session,
                Delivery::Send,
                GameEventData::BettingOpened {
                    phase: BettingPhase::Final,
                    slots: finalists.to_vec(),
                },
            );
        }
        self.pause(timings.final_betting, cancel).await?;

        let mut state = self.inner.state.write().await;
        let EngineState { roster, session, .. } = &mut *state;
        let session = session.as_mut().ok_or(Interrupt::Cancelled)?;
        session.book.close()?;
        let wagers = session.book.wagers(BettingPhase::Final).len();
        self.emit(
            session,
            Delivery::Send,
            GameEventData::BettingClosed {
                phase: BettingPhase::Final,
                wagers,
            },
        );
        session.advance(SessionState::FinalDuoResolve)?;
        let (winner, loser) = session.resolve_final(self.inner.rng.as_ref())?;
        roster.deactivate(&loser.id);
        Ok((winner, Some(loser)))
    }

    async fn settle(&self, winner: Participant, runner_up: Option<Participant>) -> Result<SessionOutcome, Interrupt> {
        let mut state = self.inner.state.write().await;
        let session = state.session_mut()?;
        session.advance(SessionState::Settlement)?;

        let event = GameEvent::winner(session.id(), self.inner.clock.now(), winner.clone(), runner_up.clone());
        self.publish(session, Delivery::Send, event);

        let settlement = session
            .book
            .settle(&self.inner.ledger, self.inner.store.as_ref(), &winner.id)?;
        self.emit(
            session,
            Delivery::Send,
            GameEventData::Settled {
                winning_wagers: settlement.winners().count(),
                total_paid: settlement.total_paid,
            },
        );

        let reward = session.reward().clone();
        let prize = match self.inner.inventory.grant_prize(&winner.id, &reward.prize) {
            Ok(item) => {
                self.emit(
                    session,
                    Delivery::Send,
                    GameEventData::PrizeAwarded {
                        winner: winner.id.clone(),
                        prize: reward.prize.clone(),
                    },
                );
                Some(item)
            }
            Err(e) => {
                error!(winner = %winner.id, prize = %reward.prize.name, error = %e, "Prize grant failed");
                None
            }
        };

        let outcome = SessionOutcome {
            session: session.id(),
            winner,
            runner_up,
            eliminated: session.eliminated().to_vec(),
            reward,
            prize,
            settlement,
            started_at: session.started_at(),
            finished_at: self.inner.clock.now(),
        };
        session.advance(SessionState::Idle)?;
        session.book.reset();

        state.session = None;
        state.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    async fn finish_cancelled(&self) {
        let mut state = self.inner.state.write().await;
        let Some(mut session) = state.session.take() else {
            return;
        };
        let refunded = if self.inner.config.betting.refund_on_cancel {
            session.book.refund_all(&self.inner.ledger, self.inner.store.as_ref())
        } else {
            0
        };
        if let Err(e) = session
            .advance(SessionState::Cancelled)
            .and_then(|_| session.advance(SessionState::Idle))
        {
            warn!(error = %e, "Cancelled from unexpected state");
        }
        session.book.reset();
        info!(refunded, "Session cancelled");
        self.emit(&session, Delivery::Send, GameEventData::SessionCancelled { refunded });
    }

    async fn finish_failed(&self, e: GameError) {
        error!(error = %e, kind = ?e.kind(), "Session aborted");
        let mut state = self.inner.state.write().await;
        if let Some(mut session) = state.session.take() {
            let open = session.book.wagers(BettingPhase::Initial).len()
                + session.book.wagers(BettingPhase::Final).len();
            if open > 0 {
                warn!(session = %session.id().short(), open, "Unsettled wagers left in the store");
            }
            session.book.reset();
            self.emit(
                &session,
                Delivery::Send,
                GameEventData::SessionFailed { reason: e.to_string() },
            );
        }
    }

    /// Sleep for `duration` unless the session is cancelled first.
    async fn pause(&self, duration: Duration, cancel: &mut watch::Receiver<bool>) -> Result<(), Interrupt> {
        if *cancel.borrow() {
            return Err(Interrupt::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = cancelled(cancel) => Err(Interrupt::Cancelled),
        }
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn emit(&self, session: &Session, delivery: Delivery, data: GameEventData) -> Option<MessageId> {
        let event = GameEvent::new(session.id(), self.inner.clock.now(), data);
        self.publish(session, delivery, event)
    }

    fn publish(&self, session: &Session, delivery: Delivery, event: GameEvent) -> Option<MessageId> {
        let text = event.summary();
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
        match delivery {
            Delivery::Send => self.send_line(session.chat(), &text),
            Delivery::Edit(Some(message)) => {
                if let Err(e) = self.inner.notifier.edit(session.chat(), message, &text) {
                    warn!(chat = session.chat(), message, error = %e, "Edit failed");
                }
                Some(message)
            }
            Delivery::Edit(None) => self.send_line(session.chat(), &text),
        }
    }

    fn send_line(&self, chat: ChatId, text: &str) -> Option<MessageId> {
        match self.inner.notifier.send(chat, text) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(chat, error = %e, "Send failed");
                None
            }
        }
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
