// Team ledger: authoritative budgets, rosters, and membership.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AuctionError;
use crate::player::{Amount, Player, PlayerId, Role};

/// A committed purchase. Appended to exactly one team's roster and never
/// mutated or removed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub player_id: PlayerId,
    pub player_name: String,
    pub role: Role,
    pub capped: bool,
    pub rating: f64,
    /// Final price in lakhs.
    pub price: Amount,
}

impl PurchaseRecord {
    pub fn new(player: &Player, price: Amount) -> Self {
        PurchaseRecord {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            role: player.role,
            capped: player.capped,
            rating: player.rating,
            price,
        }
    }
}

/// The state of a single bidding team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Team name, the unique identifier (case-sensitive).
    pub name: String,
    /// Display names of the users who joined this team.
    pub members: BTreeSet<String>,
    /// Remaining budget in lakhs. Only decreases, via committed purchases.
    pub budget: Amount,
    /// Purchased players in acquisition order.
    pub roster: Vec<PurchaseRecord>,
}

impl Team {
    /// Total spent so far, in lakhs.
    pub fn spent(&self) -> Amount {
        self.roster.iter().map(|p| p.price).sum()
    }

    /// Whether the roster already contains the given player.
    pub fn owns(&self, player_id: &str) -> bool {
        self.roster.iter().any(|p| p.player_id == player_id)
    }
}

/// Authoritative record of every team. All mutation goes through the
/// coordinator task, and `debit_and_add_player` performs its budget check
/// and roster append in one synchronous step, so two resolutions can never
/// both pass a check against a stale balance.
#[derive(Debug)]
pub struct TeamLedger {
    teams: BTreeMap<String, Team>,
    initial_budget: Amount,
    roster_cap: usize,
}

impl TeamLedger {
    pub fn new(initial_budget: Amount, roster_cap: usize) -> Self {
        TeamLedger {
            teams: BTreeMap::new(),
            initial_budget,
            roster_cap,
        }
    }

    /// Create a team with its first member. Team names are unique and
    /// case-sensitive; a clash fails with `DuplicateTeam`.
    pub fn create_team(
        &mut self,
        name: &str,
        first_member: &str,
    ) -> Result<&Team, AuctionError> {
        if self.teams.contains_key(name) {
            return Err(AuctionError::DuplicateTeam(name.to_string()));
        }
        let team = Team {
            name: name.to_string(),
            members: BTreeSet::from([first_member.to_string()]),
            budget: self.initial_budget,
            roster: Vec::new(),
        };
        info!(team = name, member = first_member, "team created");
        Ok(self.teams.entry(name.to_string()).or_insert(team))
    }

    /// Add a member to an existing team. Re-adding an existing member is an
    /// idempotent no-op.
    pub fn join_team(&mut self, name: &str, member: &str) -> Result<(), AuctionError> {
        let team = self
            .teams
            .get_mut(name)
            .ok_or_else(|| AuctionError::TeamNotFound(name.to_string()))?;
        if team.members.insert(member.to_string()) {
            info!(team = name, member, "member joined team");
        }
        Ok(())
    }

    /// Atomically check budget and roster capacity, then append the
    /// purchase and debit. Fails with no partial change when the price
    /// exceeds the remaining budget or the roster is at the cap.
    pub fn debit_and_add_player(
        &mut self,
        team_name: &str,
        player: &Player,
        price: Amount,
    ) -> Result<&Team, AuctionError> {
        let team = self
            .teams
            .get_mut(team_name)
            .ok_or_else(|| AuctionError::TeamNotFound(team_name.to_string()))?;
        if price > team.budget {
            return Err(AuctionError::InsufficientBudget {
                team: team_name.to_string(),
                price,
                budget: team.budget,
            });
        }
        if team.roster.len() >= self.roster_cap {
            return Err(AuctionError::RosterFull(team_name.to_string()));
        }
        team.budget -= price;
        team.roster.push(PurchaseRecord::new(player, price));
        info!(
            team = team_name,
            player = %player.name,
            price,
            remaining = team.budget,
            "purchase committed"
        );
        Ok(&self.teams[team_name])
    }

    pub fn get_team(&self, name: &str) -> Result<&Team, AuctionError> {
        self.teams
            .get(name)
            .ok_or_else(|| AuctionError::TeamNotFound(name.to_string()))
    }

    /// The team (if any) whose member list contains `member`.
    pub fn team_of_member(&self, member: &str) -> Option<&Team> {
        self.teams.values().find(|t| t.members.contains(member))
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    /// (name, remaining budget) pairs for snapshot publication.
    pub fn budgets(&self) -> Vec<(String, Amount)> {
        self.teams
            .values()
            .map(|t| (t.name.clone(), t.budget))
            .collect()
    }
}
