// Integration tests for the auction room.
//
// These tests exercise the full system end-to-end using the library crate's
// public API: the coordinator task behind its handle, the websocket layer
// over in-memory transports, dataset loading from a fixture file, and crash
// recovery through a real database file.

use std::collections::BTreeMap;
use std::path::Path;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use auction_room::config::Config;
use auction_room::coordinator::{Coordinator, CoordinatorHandle};
use auction_room::db::Database;
use auction_room::error::{AuctionError, RejectReason};
use auction_room::lineup::LineupRules;
use auction_room::notify::{NotificationBus, SnapshotState};
use auction_room::player::{self, BasePrices, Player, PlayerId, Role};
use auction_room::protocol::ServerMessage;
use auction_room::ws_server;

// ===========================================================================
// Test helpers
// ===========================================================================

const FIXTURES: &str = "tests/fixtures";

fn test_config() -> Config {
    Config {
        budget: 10_000,
        roster_cap: 13,
        base_prices: BasePrices {
            capped: 200,
            uncapped: 50,
        },
        lineup: LineupRules::default(),
        ws_port: 0,
        db_path: ":memory:".into(),
        players_path: "players.json".into(),
    }
}

fn make_player(id: &str, role: Role, capped: bool, rating: f64) -> Player {
    Player {
        id: id.to_string(),
        name: format!("Player {id}"),
        role,
        rating,
        capped,
        base_price: if capped { 200 } else { 50 },
        stats: serde_json::Value::Null,
    }
}

fn batsman_pool(ids: &[&str]) -> BTreeMap<PlayerId, Player> {
    ids.iter()
        .map(|id| (id.to_string(), make_player(id, Role::Batsman, true, 80.0)))
        .collect()
}

/// A pool that exactly fields a legal final XI: five batsmen (one a
/// keeper), four bowlers, two allrounders, with two uncapped.
fn squad_pool() -> BTreeMap<PlayerId, Player> {
    let mut pool = BTreeMap::new();
    for i in 0..4 {
        let p = make_player(&format!("bat{i}"), Role::Batsman, true, 85.0);
        pool.insert(p.id.clone(), p);
    }
    let keeper = make_player("wk0", Role::WicketkeeperBatter, true, 90.0);
    pool.insert(keeper.id.clone(), keeper);
    for i in 0..4 {
        let p = make_player(&format!("bowl{i}"), Role::Bowler, i > 1, 80.0);
        pool.insert(p.id.clone(), p);
    }
    for i in 0..2 {
        let p = make_player(&format!("ar{i}"), Role::Allrounder, true, 88.0);
        pool.insert(p.id.clone(), p);
    }
    pool
}

fn spawn_coordinator(pool: BTreeMap<PlayerId, Player>) -> CoordinatorHandle {
    let db = Database::open(":memory:").unwrap();
    let bus = NotificationBus::new(64);
    let (coordinator, handle) = Coordinator::new(&test_config(), pool, db, bus);
    tokio::spawn(coordinator.run());
    handle
}

fn temp_db_path(tag: &str) -> String {
    let dir = std::env::temp_dir().join("auction-room-integration");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{tag}-{}.db", std::process::id()))
        .to_string_lossy()
        .into_owned()
}

// ===========================================================================
// Auction flow
// ===========================================================================

#[tokio::test]
async fn full_auction_round_trip() {
    let handle = spawn_coordinator(batsman_pool(&["p1", "p2"]));
    handle.create_team("CSK", "dhoni").await.unwrap();
    handle.create_team("MI", "rohit").await.unwrap();

    handle.start_auction("p1", Some(100)).await.unwrap();
    let (outcome, _) = handle.place_bid("MI", 150).await.unwrap();
    assert!(outcome.is_accepted());
    let (outcome, _) = handle.place_bid("CSK", 200).await.unwrap();
    assert!(outcome.is_accepted());

    let sale = handle.resolve_auction(None, None).await.unwrap();
    assert_eq!(sale.team, "CSK");
    assert_eq!(sale.price, 200);
    assert!(matches!(sale.snapshot.state, SnapshotState::Idle));

    let csk = handle.get_team("CSK").await.unwrap();
    assert_eq!(csk.budget, 9_800);
    assert_eq!(csk.spent, 200);
    assert_eq!(csk.roster.len(), 1);
    assert_eq!(csk.roster[0].player_id, "p1");

    // The loser's budget is untouched.
    let mi = handle.get_team("MI").await.unwrap();
    assert_eq!(mi.budget, 10_000);

    // The sold player cannot be auctioned again.
    assert!(matches!(
        handle.start_auction("p1", None).await.unwrap_err(),
        AuctionError::AlreadyAuctioned(_)
    ));
}

#[tokio::test]
async fn concurrent_equal_bids_have_exactly_one_winner() {
    let handle = spawn_coordinator(batsman_pool(&["p1"]));
    for i in 0..8 {
        handle
            .create_team(&format!("team_{i}"), &format!("owner_{i}"))
            .await
            .unwrap();
    }
    handle.start_auction("p1", Some(100)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.place_bid(&format!("team_{i}"), 500).await.unwrap().0
        }));
    }
    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap().is_accepted() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    let snapshot = handle.snapshot().await.unwrap();
    match snapshot.state {
        SnapshotState::Active {
            current_bid,
            highest_bidder,
            ..
        } => {
            assert_eq!(current_bid, 500);
            assert!(highest_bidder.is_some());
        }
        other => panic!("expected active auction, got {other:?}"),
    }
}

#[tokio::test]
async fn budgets_are_enforced_across_auctions() {
    let handle = spawn_coordinator(batsman_pool(&["p1", "p2"]));
    handle.create_team("CSK", "dhoni").await.unwrap();

    handle.start_auction("p1", Some(100)).await.unwrap();
    handle.place_bid("CSK", 9_900).await.unwrap();
    handle.resolve_auction(None, None).await.unwrap();

    handle.start_auction("p2", Some(100)).await.unwrap();
    let (outcome, _) = handle.place_bid("CSK", 200).await.unwrap();
    assert_eq!(outcome.into_rejection(), Some(RejectReason::BudgetExceeded));
    let (outcome, _) = handle.place_bid("CSK", 100).await.unwrap();
    // 100 equals the starting bid, so it is not a raise either.
    assert_eq!(outcome.into_rejection(), Some(RejectReason::NotHighEnough));

    let csk = handle.get_team("CSK").await.unwrap();
    assert_eq!(csk.budget, 100);
    assert_eq!(csk.spent, 9_900);
}

#[tokio::test]
async fn mark_unsold_keeps_budgets_intact() {
    let handle = spawn_coordinator(batsman_pool(&["p1", "p2"]));
    handle.create_team("CSK", "dhoni").await.unwrap();

    handle.start_auction("p1", None).await.unwrap();
    handle.place_bid("CSK", 300).await.unwrap();
    let snapshot = handle.mark_unsold().await.unwrap();
    assert!(matches!(snapshot.state, SnapshotState::Idle));

    let csk = handle.get_team("CSK").await.unwrap();
    assert_eq!(csk.budget, 10_000);
    assert!(csk.roster.is_empty());

    // Unsold players never return to the pool.
    let players = handle.list_players().await.unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].id, "p2");
}

#[tokio::test]
async fn start_while_active_is_rejected() {
    let handle = spawn_coordinator(batsman_pool(&["p1", "p2"]));
    handle.start_auction("p1", Some(100)).await.unwrap();
    assert_eq!(
        handle.start_auction("p2", Some(100)).await.unwrap_err(),
        AuctionError::AuctionAlreadyActive
    );
    // p2 is still available once p1 completes.
    handle.mark_unsold().await.unwrap();
    handle.start_auction("p2", Some(100)).await.unwrap();
}

#[tokio::test]
async fn subscribers_observe_monotonic_bid_seq() {
    let handle = spawn_coordinator(batsman_pool(&["p1"]));
    handle.create_team("CSK", "dhoni").await.unwrap();
    handle.create_team("MI", "rohit").await.unwrap();
    let mut sub = handle.subscribe();

    handle.start_auction("p1", Some(100)).await.unwrap();
    handle.place_bid("CSK", 200).await.unwrap();
    handle.place_bid("MI", 150).await.unwrap(); // rejected, not published
    handle.place_bid("MI", 300).await.unwrap();
    handle.resolve_auction(None, None).await.unwrap();

    let mut last = 0;
    for _ in 0..4 {
        let snap = sub.recv().await.unwrap();
        assert!(snap.bid_seq > last, "bid_seq went backwards");
        last = snap.bid_seq;
    }
}

// ===========================================================================
// Dataset loading
// ===========================================================================

#[test]
fn fixture_dataset_loads_with_defaults() {
    let prices = BasePrices {
        capped: 200,
        uncapped: 50,
    };
    let players = player::load_players(
        &Path::new(FIXTURES).join("players.json"),
        prices,
    )
    .unwrap();
    assert_eq!(players.len(), 6);

    let kohli = &players["v_kohli"];
    assert_eq!(kohli.role, Role::Batsman);
    assert!(kohli.capped);
    assert_eq!(kohli.base_price, 200);
    assert_eq!(kohli.stats["runs"], 7263);

    // Numeric capped flag and a missing id (defaults to the name).
    let bumrah = &players["j_bumrah"];
    assert!(bumrah.capped);
    let parag = &players["Riyan Parag"];
    assert!(!parag.capped);
    assert_eq!(parag.base_price, 50);

    // Explicit base price wins over the default.
    assert_eq!(players["r_jadeja"].base_price, 150);
    assert_eq!(players["s_samson"].role, Role::WicketkeeperBatter);
}

// ===========================================================================
// Websocket layer over an in-memory transport
// ===========================================================================

#[tokio::test]
async fn websocket_round_trip_over_duplex() {
    let handle = spawn_coordinator(batsman_pool(&["p1"]));

    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let ws = tokio_tungstenite::accept_async(server_io).await.unwrap();
        ws_server::serve_connection(ws, handle).await.unwrap();
    });

    let (mut client, _) = tokio_tungstenite::client_async("ws://test/", client_io)
        .await
        .unwrap();

    client
        .send(Message::text(
            r#"{"type":"create_team","team":"CSK","member":"dhoni"}"#,
        ))
        .await
        .unwrap();
    let reply: ServerMessage = match client.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(reply, ServerMessage::TeamCreated { team: "CSK".into() });

    client
        .send(Message::text(
            r#"{"type":"start_auction","player_id":"p1","starting_bid":100}"#,
        ))
        .await
        .unwrap();
    let reply: ServerMessage = match client.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    match reply {
        ServerMessage::Session { snapshot } => {
            assert!(matches!(snapshot.state, SnapshotState::Active { .. }))
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    client.close(None).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn subscriber_connection_receives_broadcasts() {
    let handle = spawn_coordinator(batsman_pool(&["p1"]));
    let admin = handle.clone();

    let (client_io, server_io) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let ws = tokio_tungstenite::accept_async(server_io).await.unwrap();
        let _ = ws_server::serve_connection(ws, handle).await;
    });
    let (mut client, _) = tokio_tungstenite::client_async("ws://test/", client_io)
        .await
        .unwrap();

    client
        .send(Message::text(r#"{"type":"subscribe"}"#))
        .await
        .unwrap();
    // Initial snapshot reply.
    let reply: ServerMessage = match client.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert!(matches!(reply, ServerMessage::Snapshot { .. }));

    // A transition made elsewhere reaches this connection.
    admin.start_auction("p1", Some(100)).await.unwrap();
    let pushed: ServerMessage = match client.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    match pushed {
        ServerMessage::Snapshot { snapshot } => {
            assert!(matches!(snapshot.state, SnapshotState::Active { .. }))
        }
        other => panic!("unexpected push: {other:?}"),
    }
}

// ===========================================================================
// Lineup submission
// ===========================================================================

#[tokio::test]
async fn winning_squad_submits_final_eleven() {
    let pool = squad_pool();
    let ids: Vec<String> = pool.keys().cloned().collect();
    let handle = spawn_coordinator(pool);
    handle.create_team("CSK", "dhoni").await.unwrap();

    for id in &ids {
        handle.start_auction(id, Some(100)).await.unwrap();
        handle.resolve_auction(Some("CSK".into()), None).await.unwrap();
    }

    let submission = handle.submit_lineup("CSK", ids.clone()).await.unwrap();
    assert_eq!(submission.players.len(), 11);
    assert_eq!(submission.closing_budget, 10_000 - 11 * 100);

    let submissions = handle.list_submissions().await.unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0], submission);

    // Dropping the keeper breaks the composition rules.
    let short: Vec<String> = ids.iter().filter(|id| *id != "wk0").cloned().collect();
    assert!(matches!(
        handle.submit_lineup("CSK", short).await.unwrap_err(),
        AuctionError::InvalidLineup(_)
    ));
}

// ===========================================================================
// Crash recovery
// ===========================================================================

#[tokio::test]
async fn restart_replays_persisted_state() {
    let db_path = temp_db_path("restart");
    let _ = std::fs::remove_file(&db_path);

    {
        let db = Database::open(&db_path).unwrap();
        let bus = NotificationBus::new(64);
        let (coordinator, handle) =
            Coordinator::new(&test_config(), batsman_pool(&["p1", "p2", "p3"]), db, bus);
        let task = tokio::spawn(coordinator.run());

        handle.create_team("CSK", "dhoni").await.unwrap();
        handle.create_team("MI", "rohit").await.unwrap();
        handle.start_auction("p1", Some(100)).await.unwrap();
        handle.place_bid("MI", 700).await.unwrap();
        handle.resolve_auction(None, None).await.unwrap();
        handle.start_auction("p2", Some(100)).await.unwrap();
        handle.mark_unsold().await.unwrap();

        drop(handle);
        task.await.unwrap();
    }

    // Same dataset, fresh process.
    let db = Database::open(&db_path).unwrap();
    let bus = NotificationBus::new(64);
    let (mut coordinator, handle) =
        Coordinator::new(&test_config(), batsman_pool(&["p1", "p2", "p3"]), db, bus);
    coordinator.recover().unwrap();
    tokio::spawn(coordinator.run());

    let mi = handle.get_team("MI").await.unwrap();
    assert_eq!(mi.budget, 9_300);
    assert_eq!(mi.roster.len(), 1);
    assert_eq!(mi.roster[0].player_id, "p1");
    assert_eq!(handle.get_team("CSK").await.unwrap().budget, 10_000);

    // Completed players stay completed; only p3 remains biddable.
    let players = handle.list_players().await.unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].id, "p3");
    assert!(matches!(
        handle.start_auction("p2", None).await.unwrap_err(),
        AuctionError::AlreadyAuctioned(_)
    ));
    handle.start_auction("p3", None).await.unwrap();

    let _ = std::fs::remove_file(&db_path);
}
