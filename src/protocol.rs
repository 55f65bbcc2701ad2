// Wire protocol: JSON messages exchanged with websocket clients. Requests
// carry a `type` tag; every request gets exactly one reply, and subscribers
// additionally receive a stream of `snapshot` messages.

use serde::{Deserialize, Serialize};

use crate::error::{AuctionError, RejectReason};
use crate::ledger::{PurchaseRecord, Team};
use crate::lineup::LineupSubmission;
use crate::notify::AuctionSnapshot;
use crate::player::{Amount, Player};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateTeam {
        team: String,
        member: String,
    },
    JoinTeam {
        team: String,
        member: String,
    },
    GetTeam {
        team: String,
    },
    StartAuction {
        player_id: String,
        /// Defaults to the player's base price when omitted.
        starting_bid: Option<Amount>,
    },
    PlaceBid {
        team: String,
        amount: Amount,
    },
    ResolveAuction {
        /// Defaults to the highest bidder when omitted.
        team: Option<String>,
        /// Defaults to the current bid when omitted.
        price: Option<Amount>,
    },
    MarkUnsold,
    ListPlayers,
    SubmitLineup {
        team: String,
        player_ids: Vec<String>,
    },
    ListSubmissions,
    Subscribe,
}

/// A team as reported over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamView {
    pub name: String,
    pub members: Vec<String>,
    pub budget: Amount,
    pub spent: Amount,
    pub roster: Vec<PurchaseRecord>,
}

impl From<&Team> for TeamView {
    fn from(team: &Team) -> Self {
        TeamView {
            name: team.name.clone(),
            members: team.members.iter().cloned().collect(),
            budget: team.budget,
            spent: team.spent(),
            roster: team.roster.clone(),
        }
    }
}

/// Messages the server sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    TeamCreated {
        team: String,
    },
    TeamJoined {
        team: String,
    },
    Team {
        team: TeamView,
    },
    Session {
        snapshot: AuctionSnapshot,
    },
    BidResult {
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<RejectReason>,
        snapshot: AuctionSnapshot,
    },
    Sold {
        team: String,
        price: Amount,
        snapshot: AuctionSnapshot,
    },
    Players {
        players: Vec<Player>,
    },
    LineupAccepted {
        submission: LineupSubmission,
    },
    Submissions {
        submissions: Vec<LineupSubmission>,
    },
    /// Reply to `subscribe` (the current state) and every pushed update
    /// thereafter.
    Snapshot {
        snapshot: AuctionSnapshot,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(err: &AuctionError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Malformed or unparseable request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: "BadRequest".to_string(),
            message: message.into(),
        }
    }
}
