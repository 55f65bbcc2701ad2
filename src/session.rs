// Auction session: the lifecycle state machine for the player currently
// under the hammer. Exactly one instance exists, owned by the coordinator
// task; every mutation below runs inside that task, so transitions never
// interleave.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AuctionError;
use crate::player::{Amount, Player};

/// Lifecycle phase. `Resolved` from the abstract model is transient: the
/// session returns straight to `Idle` once a resolution commits, so it
/// never appears as a stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Active {
        player: Player,
        /// Current high bid in lakhs. Starts at the starting bid.
        current_bid: Amount,
        /// Team holding the high bid; `None` until the first accepted bid.
        highest_bidder: Option<String>,
    },
}

/// Read-only view of an active auction, borrowed from the session.
#[derive(Debug, Clone, Copy)]
pub struct ActiveView<'a> {
    pub player: &'a Player,
    pub current_bid: Amount,
    pub highest_bidder: Option<&'a str>,
}

/// The live auction state machine.
#[derive(Debug)]
pub struct AuctionSession {
    phase: Phase,
    /// Monotonic version counter. Bumps by exactly 1 per accepted bid and
    /// on every lifecycle transition, so published snapshots are totally
    /// ordered and observers can detect missed updates.
    bid_seq: u64,
}

impl AuctionSession {
    pub fn new() -> Self {
        AuctionSession {
            phase: Phase::Idle,
            bid_seq: 0,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn bid_seq(&self) -> u64 {
        self.bid_seq
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active { .. })
    }

    /// Begin auctioning a player. Legal only from `Idle`.
    pub fn start(&mut self, player: Player, starting_bid: Amount) -> Result<(), AuctionError> {
        if self.is_active() {
            return Err(AuctionError::AuctionAlreadyActive);
        }
        info!(
            player = %player.name,
            starting_bid,
            "auction started"
        );
        self.phase = Phase::Active {
            player,
            current_bid: starting_bid,
            highest_bidder: None,
        };
        self.bid_seq += 1;
        Ok(())
    }

    /// Borrow the active auction, or fail `InvalidTransition` while idle.
    pub fn active(&self) -> Result<ActiveView<'_>, AuctionError> {
        match &self.phase {
            Phase::Active {
                player,
                current_bid,
                highest_bidder,
            } => Ok(ActiveView {
                player,
                current_bid: *current_bid,
                highest_bidder: highest_bidder.as_deref(),
            }),
            Phase::Idle => Err(AuctionError::InvalidTransition("no active auction")),
        }
    }

    /// Record an arbiter-approved bid. Callers must have already validated
    /// the bid against the current state; this only applies it.
    pub(crate) fn apply_accepted_bid(&mut self, amount: Amount, bidder: &str) {
        if let Phase::Active {
            current_bid,
            highest_bidder,
            ..
        } = &mut self.phase
        {
            *current_bid = amount;
            *highest_bidder = Some(bidder.to_string());
            self.bid_seq += 1;
        }
    }

    /// Close the active auction and return to `Idle`, yielding the player
    /// that was on the block. Legal only while `Active`.
    ///
    /// Callers run their side effects (ledger debit) *before* this, so a
    /// failed resolution leaves the session untouched and still active.
    pub fn finish(&mut self) -> Result<Player, AuctionError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active { player, .. } => {
                self.bid_seq += 1;
                Ok(player)
            }
            Phase::Idle => Err(AuctionError::InvalidTransition("no active auction")),
        }
    }
}

impl Default for AuctionSession {
    fn default() -> Self {
        Self::new()
    }
}
