// Auction room entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr)
// 2. Load config
// 3. Open database
// 4. Load the player dataset
// 5. Build the coordinator, replay persisted state
// 6. Spawn coordinator and WebSocket server tasks
// 7. Wait for Ctrl+C, then shut down

use std::path::Path;

use anyhow::Context;
use tracing::{error, info};

use auction_room::config;
use auction_room::coordinator::Coordinator;
use auction_room::db::Database;
use auction_room::notify::NotificationBus;
use auction_room::player;
use auction_room::ws_server;

const SNAPSHOT_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("auction room starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "config loaded: budget {} lakh, roster cap {}, port {}",
        config.budget, config.roster_cap, config.ws_port
    );

    // 3. Open database
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("database opened at {}", config.db_path);

    // 4. Load the player dataset
    let pool = player::load_players(Path::new(&config.players_path), config.base_prices)
        .context("failed to load player dataset")?;
    info!("loaded {} players from {}", pool.len(), config.players_path);

    // 5. Build the coordinator and replay any persisted state
    let bus = NotificationBus::new(SNAPSHOT_BUFFER);
    let (mut coordinator, handle) = Coordinator::new(&config, pool, db, bus);
    coordinator.recover().context("crash recovery failed")?;

    // 6. Spawn the coordinator and the WebSocket server
    let coordinator_handle = tokio::spawn(coordinator.run());

    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(ws_port, handle).await {
            error!("websocket server error: {e:#}");
        }
    });

    info!("ready; websocket server on 127.0.0.1:{ws_port}");

    // 7. Run until interrupted
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    // The server loops forever; the coordinator drains once all handles
    // are gone.
    ws_handle.abort();
    coordinator_handle.abort();

    info!("auction room shut down cleanly");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("auction_room=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
