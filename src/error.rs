// Domain error taxonomy. Every recoverable failure a caller can trigger
// maps onto exactly one variant here, and each variant has a stable wire
// code used by the websocket protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::Amount;

/// Recoverable auction errors, reported synchronously to the caller that
/// issued the offending command. None of these leave shared state partially
/// modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    #[error("team `{0}` already exists")]
    DuplicateTeam(String),

    #[error("team `{0}` not found")]
    TeamNotFound(String),

    #[error("insufficient budget for team `{team}`: price {price} exceeds remaining {budget}")]
    InsufficientBudget {
        team: String,
        price: Amount,
        budget: Amount,
    },

    #[error("an auction is already active")]
    AuctionAlreadyActive,

    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    #[error("player `{0}` has already been auctioned")]
    AlreadyAuctioned(String),

    #[error("bid is not higher than the current bid")]
    NotHighEnough,

    #[error("bid exceeds the bidding team's remaining budget")]
    BudgetExceeded,

    #[error("roster for team `{0}` is full")]
    RosterFull(String),

    #[error("invalid lineup: {0}")]
    InvalidLineup(String),

    /// The directory detected an internal invariant violation (a player
    /// completed twice) and refuses further operations until an operator
    /// intervenes. Not caused by any single client command.
    #[error("auction directory halted after an invariant violation")]
    DirectoryPoisoned,

    /// In-memory state committed but the persistence write failed. The
    /// operation stands; restarting before the next successful write may
    /// lose it.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The coordinator task has shut down.
    #[error("coordinator is unavailable")]
    Unavailable,
}

impl AuctionError {
    /// Stable code for the wire protocol. One code per variant.
    pub fn code(&self) -> &'static str {
        match self {
            AuctionError::DuplicateTeam(_) => "DuplicateTeam",
            AuctionError::TeamNotFound(_) => "TeamNotFound",
            AuctionError::InsufficientBudget { .. } => "InsufficientBudget",
            AuctionError::AuctionAlreadyActive => "AuctionAlreadyActive",
            AuctionError::InvalidTransition(_) => "InvalidTransition",
            AuctionError::AlreadyAuctioned(_) => "AlreadyAuctioned",
            AuctionError::NotHighEnough => "NotHighEnough",
            AuctionError::BudgetExceeded => "BudgetExceeded",
            AuctionError::RosterFull(_) => "RosterFull",
            AuctionError::InvalidLineup(_) => "InvalidLineup",
            AuctionError::DirectoryPoisoned => "DirectoryPoisoned",
            AuctionError::Persistence(_) => "Persistence",
            AuctionError::Unavailable => "Unavailable",
        }
    }
}

/// Why a bid was turned down. Rejections are private to the submitter and
/// never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The bid did not strictly exceed the current bid. Ties always lose.
    NotHighEnough,
    /// The bid exceeds the bidding team's own remaining budget.
    BudgetExceeded,
}

impl From<RejectReason> for AuctionError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::NotHighEnough => AuctionError::NotHighEnough,
            RejectReason::BudgetExceeded => AuctionError::BudgetExceeded,
        }
    }
}
