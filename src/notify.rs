// Notification bus: fan-out of immutable auction snapshots to read-only
// viewers (slideshow, bidder screens). Publishing never blocks the
// coordinator; slow subscribers lag and skip ahead rather than stalling
// the auction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::directory::AuctionDirectory;
use crate::ledger::TeamLedger;
use crate::player::{Amount, Player};
use crate::session::{AuctionSession, Phase};

/// Remaining budget of one team at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBudget {
    pub team: String,
    pub budget: Amount,
}

/// State of the live auction within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SnapshotState {
    Idle,
    Active {
        player: Player,
        current_bid: Amount,
        highest_bidder: Option<String>,
    },
}

/// An immutable, self-contained view of the auction, safe to hand to any
/// number of subscribers. `bid_seq` totally orders snapshots; a subscriber
/// never observes a lower sequence after a higher one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    #[serde(flatten)]
    pub state: SnapshotState,
    pub bid_seq: u64,
    pub budgets: Vec<TeamBudget>,
    /// Players still in the pool (excludes the one on the block).
    pub players_remaining: usize,
}

impl AuctionSnapshot {
    /// Capture the current state. Runs inside the coordinator task, so the
    /// three sources are mutually consistent.
    pub fn capture(
        session: &AuctionSession,
        ledger: &TeamLedger,
        directory: &AuctionDirectory,
    ) -> Self {
        let state = match session.phase() {
            Phase::Idle => SnapshotState::Idle,
            Phase::Active {
                player,
                current_bid,
                highest_bidder,
            } => SnapshotState::Active {
                player: player.clone(),
                current_bid: *current_bid,
                highest_bidder: highest_bidder.clone(),
            },
        };
        AuctionSnapshot {
            state,
            bid_seq: session.bid_seq(),
            budgets: ledger
                .budgets()
                .into_iter()
                .map(|(team, budget)| TeamBudget { team, budget })
                .collect(),
            players_remaining: directory.pool_len(),
        }
    }
}

/// Broadcast fan-out of snapshots. Cheap to clone; each clone publishes to
/// the same set of subscribers.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Arc<AuctionSnapshot>>,
}

impl NotificationBus {
    /// `capacity` bounds how far a slow subscriber may fall behind before
    /// it starts skipping snapshots.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        NotificationBus { tx }
    }

    /// Publish a snapshot to all current subscribers. A send with no
    /// subscribers is not an error; the snapshot is simply dropped.
    pub fn publish(&self, snapshot: AuctionSnapshot) {
        let _ = self.tx.send(Arc::new(snapshot));
    }

    /// Open a new subscription. Delivery starts with the next published
    /// snapshot; dropping the subscription cancels it with no further
    /// side effects.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A cancellable stream of snapshots for one viewer.
pub struct Subscription {
    rx: broadcast::Receiver<Arc<AuctionSnapshot>>,
}

impl Subscription {
    /// Receive the next snapshot. Returns `None` once the bus is closed.
    /// A subscriber that lagged past the buffer skips ahead to the oldest
    /// retained snapshot; order by `bid_seq` is still preserved.
    pub async fn recv(&mut self) -> Option<Arc<AuctionSnapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
