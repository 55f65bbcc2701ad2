// Configuration loading and parsing (auction.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::lineup::LineupRules;
use crate::player::{Amount, BasePrices, LAKHS_PER_CRORE};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// auction.toml structs
// ---------------------------------------------------------------------------

/// Top-level table layout of auction.toml.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    auction: AuctionSection,
    server: ServerSection,
}

#[derive(Debug, Clone, Deserialize)]
struct AuctionSection {
    /// Per-team budget, in crores.
    budget_crores: u64,
    roster_cap: usize,
    base_prices: BasePricesSection,
    #[serde(default)]
    lineup: Option<LineupRules>,
}

#[derive(Debug, Clone, Deserialize)]
struct BasePricesSection {
    /// Default starting bid for capped players, in lakhs.
    capped_lakhs: Amount,
    /// Default starting bid for uncapped players, in lakhs.
    uncapped_lakhs: Amount,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    ws_port: u16,
    db_path: String,
    players_path: String,
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// Per-team budget in lakhs.
    pub budget: Amount,
    pub roster_cap: usize,
    pub base_prices: BasePrices,
    pub lineup: LineupRules,
    pub ws_port: u16,
    pub db_path: String,
    pub players_path: String,
}

/// Load and validate configuration from `auction.toml` in the working
/// directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("auction.toml"))
}

/// Load and validate configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    assemble(file)
}

fn assemble(file: ConfigFile) -> Result<Config, ConfigError> {
    let config = Config {
        budget: file.auction.budget_crores * LAKHS_PER_CRORE,
        roster_cap: file.auction.roster_cap,
        base_prices: BasePrices {
            capped: file.auction.base_prices.capped_lakhs,
            uncapped: file.auction.base_prices.uncapped_lakhs,
        },
        lineup: file.auction.lineup.unwrap_or_default(),
        ws_port: file.server.ws_port,
        db_path: file.server.db_path,
        players_path: file.server.players_path,
    };
    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    fn fail(field: &str, message: String) -> Result<(), ConfigError> {
        Err(ConfigError::ValidationError {
            field: field.to_string(),
            message,
        })
    }

    if config.budget == 0 {
        return fail("auction.budget_crores", "budget must be positive".into());
    }
    if config.roster_cap == 0 {
        return fail("auction.roster_cap", "roster cap must be positive".into());
    }
    if config.roster_cap < config.lineup.size {
        return fail(
            "auction.roster_cap",
            format!(
                "roster cap {} is smaller than the lineup size {}",
                config.roster_cap, config.lineup.size
            ),
        );
    }
    if config.base_prices.capped == 0 || config.base_prices.uncapped == 0 {
        return fail("auction.base_prices", "base prices must be positive".into());
    }
    if config.base_prices.capped > config.budget || config.base_prices.uncapped > config.budget {
        return fail(
            "auction.base_prices",
            "base price exceeds the per-team budget".into(),
        );
    }

    // Role quotas must exactly fill the lineup. The uncapped minimum cuts
    // across roles, so it is not part of the sum.
    let quota_sum = config.lineup.batsmen + config.lineup.bowlers + config.lineup.allrounders;
    if quota_sum != config.lineup.size {
        return fail(
            "auction.lineup",
            format!(
                "role quotas sum to {quota_sum} but lineup size is {}",
                config.lineup.size
            ),
        );
    }
    if config.lineup.wicketkeepers > config.lineup.batsmen {
        return fail(
            "auction.lineup",
            "wicketkeeper quota exceeds the batsman quota".into(),
        );
    }
    if config.lineup.min_uncapped > config.lineup.size {
        return fail(
            "auction.lineup",
            "uncapped minimum exceeds the lineup size".into(),
        );
    }

    Ok(())
}
