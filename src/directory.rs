// Auction directory: which players are still in the pool, which one is on
// the block, and which are done. Maintains the pool / in-flight / completed
// partition so each player is auctioned at most once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AuctionError;
use crate::player::{Amount, Player, PlayerId};

/// How a completed player left the auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Sold { team: String, price: Amount },
    Unsold,
}

/// Tracks every player's position in the pool → in-flight → completed
/// lifecycle. A double completion is an internal bug, not a user error: it
/// is logged and poisons the directory, failing all further operations
/// until an operator intervenes.
#[derive(Debug)]
pub struct AuctionDirectory {
    pool: BTreeMap<PlayerId, Player>,
    in_flight: Option<(PlayerId, Player)>,
    completed: BTreeMap<PlayerId, Disposition>,
    poisoned: bool,
}

impl AuctionDirectory {
    pub fn new(pool: BTreeMap<PlayerId, Player>) -> Self {
        AuctionDirectory {
            pool,
            in_flight: None,
            completed: BTreeMap::new(),
            poisoned: false,
        }
    }

    fn check_poisoned(&self) -> Result<(), AuctionError> {
        if self.poisoned {
            Err(AuctionError::DirectoryPoisoned)
        } else {
            Ok(())
        }
    }

    /// Take a player out of the pool for auctioning. The player is
    /// in-flight (neither pool nor completed) until `mark_completed` or
    /// `abort_in_flight`. Fails `AlreadyAuctioned` for anything not
    /// currently in the pool.
    pub fn reserve_for_auction(&mut self, player_id: &str) -> Result<Player, AuctionError> {
        self.check_poisoned()?;
        match self.pool.remove(player_id) {
            Some(player) => {
                self.in_flight = Some((player_id.to_string(), player.clone()));
                Ok(player)
            }
            None => Err(AuctionError::AlreadyAuctioned(player_id.to_string())),
        }
    }

    /// Return an in-flight player to the pool. Used when starting the
    /// session fails after the reservation, keeping the partition intact.
    pub fn abort_in_flight(&mut self, player_id: &str) {
        if let Some((id, player)) = self.in_flight.take() {
            if id == player_id {
                self.pool.insert(id, player);
            } else {
                self.in_flight = Some((id, player));
            }
        }
    }

    /// Record a player's final disposition. Accepts the in-flight player
    /// (the normal path) or a player still in the pool (startup replay of
    /// persisted completions). Completing the same player twice is an
    /// invariant violation that halts the directory.
    pub fn mark_completed(
        &mut self,
        player_id: &str,
        disposition: Disposition,
    ) -> Result<(), AuctionError> {
        self.check_poisoned()?;
        if self.completed.contains_key(player_id) {
            error!(
                player_id,
                "invariant violation: player completed twice; halting directory"
            );
            self.poisoned = true;
            return Err(AuctionError::DirectoryPoisoned);
        }
        match self.in_flight.take() {
            Some((id, _)) if id == player_id => {}
            other => {
                self.in_flight = other;
                // Replay path: completion recorded straight from the pool.
                if self.pool.remove(player_id).is_none() {
                    error!(
                        player_id,
                        "invariant violation: completed a player that was never tracked"
                    );
                    self.poisoned = true;
                    return Err(AuctionError::DirectoryPoisoned);
                }
            }
        }
        self.completed.insert(player_id.to_string(), disposition);
        Ok(())
    }

    /// Players still available for auction, in id order. Restartable and
    /// finite; excludes the in-flight player.
    pub fn list_available(&self) -> impl Iterator<Item = &Player> {
        self.pool.values()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn in_pool(&self, player_id: &str) -> bool {
        self.pool.contains_key(player_id)
    }

    pub fn is_completed(&self, player_id: &str) -> bool {
        self.completed.contains_key(player_id)
    }

    pub fn disposition(&self, player_id: &str) -> Option<&Disposition> {
        self.completed.get(player_id)
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    pub fn in_flight_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}
