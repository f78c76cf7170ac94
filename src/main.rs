//! Nameplate Game Server
//!
//! Demo driver: runs one accelerated elimination session against the
//! configured store and logs every chat line and the resulting balances.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nameplate::{
    config::SessionTimings,
    economy::CoinSide,
    CatalogEntry, EngineConfig, GameEngine, JsonFileStore, LogNotifier, MemoryStore, Participant, PlayerId, Rarity,
    Store, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Nameplate Server v{}", VERSION);

    let mut config = EngineConfig::from_env();
    config.validate().context("invalid configuration")?;
    // Demo pace
    config.timings = SessionTimings::uniform(Duration::from_millis(250));

    let catalog = demo_catalog();
    let store: Arc<dyn Store> = match std::env::var("NAMEPLATE_STORE") {
        Ok(path) => {
            let store = JsonFileStore::open(&path).with_context(|| format!("opening store {}", path))?;
            store.set_catalog(catalog)?;
            info!(path = %path, "Using JSON file store");
            Arc::new(store)
        }
        Err(_) => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::with_catalog(catalog))
        }
    };

    let engine = GameEngine::new(config, store, Arc::new(LogNotifier::new()));
    demo_session(&engine).await?;
    demo_economy(&engine)?;
    Ok(())
}

fn demo_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("Rookie", Rarity::Common, 100),
        CatalogEntry::new("Regular", Rarity::Common, 150),
        CatalogEntry::new("Veteran", Rarity::Rare, 750),
        CatalogEntry::new("Champion", Rarity::Legendary, 5000),
    ]
}

/// Demo: five participants, two punters.
async fn demo_session(engine: &GameEngine) -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    for (handle, name) in [
        ("ann", "Ann Adams"),
        ("bob", "Bob Brown"),
        ("cat", "Cat Clark"),
        ("dan", "Dan Davis"),
        ("eve", "Eve Evans"),
    ] {
        engine.add_participant(Participant::new(handle, name)).await?;
    }

    let session = engine.start_session(1).await?;
    info!(session = %session.short(), "Session scheduled");

    let alice = PlayerId::new("alice");
    let carol = PlayerId::new("carol");
    engine.place_bet(&alice, 2, 100).await?;
    engine.place_bet(&carol, 4, 300).await?;

    engine.join().await;

    match engine.last_outcome().await {
        Some(outcome) => {
            info!("=== Session Results ===");
            for (i, p) in outcome.eliminated.iter().enumerate() {
                info!("Out #{}: {}", i + 1, p.label());
            }
            info!("Winner: {}", outcome.winner.label());
            info!(
                "Prize: {} ({}, worth {})",
                outcome.reward.prize.name, outcome.reward.rarity, outcome.reward.prize.value
            );
            info!("Paid out: {}", outcome.settlement.total_paid);
        }
        None => warn!("Session ended without a winner"),
    }
    Ok(())
}

/// Demo: shop, robbery and a coin toss.
fn demo_economy(engine: &GameEngine) -> anyhow::Result<()> {
    info!("=== Economy ===");
    let alice = PlayerId::new("alice");
    let carol = PlayerId::new("carol");

    let purchase = engine.inventory().purchase(&alice, 1, 1)?;
    info!("{} bought {} for {}", alice, purchase.item.name, purchase.total);

    match engine.heists().rob(&alice, &carol) {
        Ok(outcome) => info!("Robbery: {:?}", outcome),
        Err(e) => warn!(error = %e, "Robbery refused"),
    }

    match engine.coin().toss(&carol, CoinSide::Heads, 50) {
        Ok(result) => info!("Coin landed {} (payout {})", result.landed, result.payout),
        Err(e) => warn!(error = %e, "Coin toss refused"),
    }

    for (player, balances) in engine.ledger().all_balances()? {
        info!(
            "{}: cash {} bank {} fine {}",
            player, balances.cash, balances.bank, balances.fine
        );
    }
    for (player, fine) in engine.shame_board()? {
        info!("Shame board: {} owes {}", player, fine);
    }
    Ok(())
}
