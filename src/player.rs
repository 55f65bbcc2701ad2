// Player reference data: roles, ratings, base prices, and dataset loading.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Money amount in lakhs (1 crore = 100 lakh). Integer arithmetic keeps
/// budget checks exact; display formatting converts to crores at the edge.
pub type Amount = u64;

/// Lakhs per crore, for constructing amounts from crore-denominated config.
pub const LAKHS_PER_CRORE: Amount = 100;

pub type PlayerId = String;

#[derive(Debug, Error)]
pub enum PlayerLoadError {
    #[error("failed to read player dataset at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse player dataset at {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("player `{name}` has unknown role `{role}`")]
    UnknownRole { name: String, role: String },

    #[error("duplicate player id `{0}` in dataset")]
    DuplicateId(String),
}

/// Closed set of player roles. The raw dataset is sloppy about casing and
/// spelling ("bowler" vs "Bowler", "Wicketkeeper Batter", "All-rounder"),
/// so parsing normalizes before matching and loading fails fast on anything
/// that doesn't land in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Batsman,
    Bowler,
    Allrounder,
    WicketkeeperBatter,
}

impl Role {
    /// Parse a raw role string. Lowercases and strips spaces/hyphens first,
    /// so "All-Rounder", "allrounder" and "Wicketkeeper Batter" all resolve.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "batsman" | "batter" => Some(Role::Batsman),
            "bowler" => Some(Role::Bowler),
            "allrounder" => Some(Role::Allrounder),
            "wicketkeeperbatter" | "wicketkeeperbatsman" | "wicketkeeper" => {
                Some(Role::WicketkeeperBatter)
            }
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Role::Batsman => "Batsman",
            Role::Bowler => "Bowler",
            Role::Allrounder => "Allrounder",
            Role::WicketkeeperBatter => "Wicketkeeper Batter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

/// Immutable player record, shared by all components and never mutated
/// after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub rating: f64,
    pub capped: bool,
    /// Starting price in lakhs when the admin does not override it.
    pub base_price: Amount,
    /// Role-dependent career stats (matches, runs, wickets, ...). Opaque to
    /// the coordinator; passed through to viewers unchanged.
    #[serde(default)]
    pub stats: serde_json::Value,
}

/// Per-capped-status default base prices, in lakhs.
#[derive(Debug, Clone, Copy)]
pub struct BasePrices {
    pub capped: Amount,
    pub uncapped: Amount,
}

impl BasePrices {
    pub fn for_player(&self, capped: bool) -> Amount {
        if capped {
            self.capped
        } else {
            self.uncapped
        }
    }
}

/// Raw dataset record, before role validation and base-price defaulting.
#[derive(Debug, Deserialize)]
struct RawPlayer {
    /// Player id; defaults to the name when the dataset omits it (the
    /// upstream dataset relied on store-assigned ids).
    #[serde(default)]
    id: Option<String>,
    name: String,
    role: String,
    #[serde(default)]
    rating: f64,
    /// Sloppy in the source data: sometimes a bool, sometimes 0/1.
    #[serde(default, deserialize_with = "de_capped")]
    capped: bool,
    #[serde(default)]
    base_price: Option<Amount>,
    #[serde(default)]
    stats: serde_json::Value,
}

/// Accept `true`/`false`, `0`/`1`, or null for the `capped` field.
fn de_capped<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CappedRepr {
        Bool(bool),
        Num(i64),
        Null,
    }
    Ok(match CappedRepr::deserialize(deserializer)? {
        CappedRepr::Bool(b) => b,
        CappedRepr::Num(n) => n != 0,
        CappedRepr::Null => false,
    })
}

/// Load and validate the player dataset from a JSON file.
///
/// Validation is fail-fast: an unknown role or duplicate id aborts the load
/// rather than silently miscategorizing a player. Returns players keyed by
/// id in a deterministic order.
pub fn load_players(
    path: &Path,
    base_prices: BasePrices,
) -> Result<BTreeMap<PlayerId, Player>, PlayerLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| PlayerLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let raw: Vec<RawPlayer> =
        serde_json::from_str(&text).map_err(|source| PlayerLoadError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    players_from_raw(raw, base_prices)
}

fn players_from_raw(
    raw: Vec<RawPlayer>,
    base_prices: BasePrices,
) -> Result<BTreeMap<PlayerId, Player>, PlayerLoadError> {
    let mut players = BTreeMap::new();
    for record in raw {
        let role = Role::parse(&record.role).ok_or_else(|| PlayerLoadError::UnknownRole {
            name: record.name.clone(),
            role: record.role.clone(),
        })?;
        let id = record.id.unwrap_or_else(|| record.name.clone());
        let player = Player {
            id: id.clone(),
            name: record.name,
            role,
            rating: record.rating,
            capped: record.capped,
            base_price: record
                .base_price
                .unwrap_or_else(|| base_prices.for_player(record.capped)),
            stats: record.stats,
        };
        if players.insert(id.clone(), player).is_some() {
            return Err(PlayerLoadError::DuplicateId(id));
        }
    }
    Ok(players)
}
