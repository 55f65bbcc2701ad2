// Final-XI lineup submission: each team picks a playing eleven from its
// roster, validated against role-composition rules before it is stored.

use serde::{Deserialize, Serialize};

use crate::error::AuctionError;
use crate::ledger::{PurchaseRecord, Team};
use crate::player::{Amount, Role};

/// Role-composition rules for a valid lineup. Wicketkeeper-batters count
/// toward both the batsman quota and the wicketkeeper quota.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LineupRules {
    pub size: usize,
    /// Batsmen including wicketkeeper-batters.
    pub batsmen: usize,
    pub wicketkeepers: usize,
    pub bowlers: usize,
    pub allrounders: usize,
    /// Minimum number of uncapped players.
    pub min_uncapped: usize,
}

impl Default for LineupRules {
    fn default() -> Self {
        LineupRules {
            size: 11,
            batsmen: 5,
            wicketkeepers: 1,
            bowlers: 4,
            allrounders: 2,
            min_uncapped: 2,
        }
    }
}

/// A validated, stored lineup submission. Re-submitting overwrites the
/// team's previous entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupSubmission {
    pub team: String,
    pub players: Vec<PurchaseRecord>,
    pub average_rating: f64,
    /// Budget remaining at submission time, in lakhs.
    pub closing_budget: Amount,
}

/// Validate a lineup selection against the team's roster and the
/// composition rules, producing the submission record.
pub fn build_submission(
    team: &Team,
    player_ids: &[String],
    rules: &LineupRules,
) -> Result<LineupSubmission, AuctionError> {
    let invalid = |msg: String| AuctionError::InvalidLineup(msg);

    if player_ids.len() != rules.size {
        return Err(invalid(format!(
            "expected {} players, got {}",
            rules.size,
            player_ids.len()
        )));
    }

    let mut players: Vec<PurchaseRecord> = Vec::with_capacity(player_ids.len());
    for id in player_ids {
        if players.iter().any(|p| &p.player_id == id) {
            return Err(invalid(format!("player `{id}` selected twice")));
        }
        let record = team
            .roster
            .iter()
            .find(|p| &p.player_id == id)
            .ok_or_else(|| invalid(format!("player `{id}` is not on team `{}`", team.name)))?;
        players.push(record.clone());
    }

    let batsmen = players
        .iter()
        .filter(|p| matches!(p.role, Role::Batsman | Role::WicketkeeperBatter))
        .count();
    let wicketkeepers = players
        .iter()
        .filter(|p| p.role == Role::WicketkeeperBatter)
        .count();
    let bowlers = players.iter().filter(|p| p.role == Role::Bowler).count();
    let allrounders = players.iter().filter(|p| p.role == Role::Allrounder).count();
    let uncapped = players.iter().filter(|p| !p.capped).count();

    if batsmen != rules.batsmen {
        return Err(invalid(format!(
            "expected {} batsmen (incl. wicketkeeper-batters), got {batsmen}",
            rules.batsmen
        )));
    }
    if wicketkeepers != rules.wicketkeepers {
        return Err(invalid(format!(
            "expected {} wicketkeeper(s), got {wicketkeepers}",
            rules.wicketkeepers
        )));
    }
    if bowlers != rules.bowlers {
        return Err(invalid(format!(
            "expected {} bowlers, got {bowlers}",
            rules.bowlers
        )));
    }
    if allrounders != rules.allrounders {
        return Err(invalid(format!(
            "expected {} allrounders, got {allrounders}",
            rules.allrounders
        )));
    }
    if uncapped < rules.min_uncapped {
        return Err(invalid(format!(
            "expected at least {} uncapped players, got {uncapped}",
            rules.min_uncapped
        )));
    }

    let average_rating = if players.is_empty() {
        0.0
    } else {
        players.iter().map(|p| p.rating).sum::<f64>() / players.len() as f64
    };

    Ok(LineupSubmission {
        team: team.name.clone(),
        players,
        average_rating,
        closing_budget: team.budget,
    })
}
