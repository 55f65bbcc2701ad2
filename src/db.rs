// SQLite persistence for auction state: teams, purchases, completed
// players, and lineup submissions. The coordinator writes through this on
// every committed transition; on startup the same data is replayed to
// rebuild in-memory state (crash recovery).

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::ledger::PurchaseRecord;
use crate::lineup::LineupSubmission;
use crate::player::Role;

/// Everything needed to rebuild coordinator state after a restart.
#[derive(Debug, Default)]
pub struct RecoveryData {
    /// (team name, members) in creation order.
    pub teams: Vec<(String, Vec<String>)>,
    /// (winning team, purchase) in commit order.
    pub sales: Vec<(String, PurchaseRecord)>,
    /// Players marked unsold, in commit order.
    pub unsold: Vec<String>,
}

/// SQLite-backed persistence. The connection sits behind a mutex; all
/// access goes through the coordinator task anyway, the lock just keeps
/// the handle `Sync`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral database in tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS teams (
                name       TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS team_members (
                team   TEXT NOT NULL REFERENCES teams(name),
                member TEXT NOT NULL,
                PRIMARY KEY (team, member)
            );

            CREATE TABLE IF NOT EXISTS completed_players (
                player_id   TEXT PRIMARY KEY,
                player_name TEXT NOT NULL,
                role        TEXT NOT NULL,
                capped      INTEGER NOT NULL,
                rating      REAL NOT NULL,
                outcome     TEXT NOT NULL CHECK (outcome IN ('sold', 'unsold')),
                team        TEXT REFERENCES teams(name),
                price       INTEGER,
                committed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS lineup_submissions (
                team         TEXT PRIMARY KEY REFERENCES teams(name),
                payload      TEXT NOT NULL,
                submitted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    pub fn record_team(&self, name: &str, first_member: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO teams (name) VALUES (?1)",
            params![name],
        )
        .context("failed to insert team")?;
        conn.execute(
            "INSERT OR IGNORE INTO team_members (team, member) VALUES (?1, ?2)",
            params![name, first_member],
        )
        .context("failed to insert team member")?;
        Ok(())
    }

    pub fn record_member(&self, team: &str, member: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO team_members (team, member) VALUES (?1, ?2)",
                params![team, member],
            )
            .context("failed to insert team member")?;
        Ok(())
    }

    /// Record a committed sale. The primary key on player_id backs the
    /// one-purchase-per-player invariant at the durable layer too.
    pub fn record_sale(&self, team: &str, purchase: &PurchaseRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO completed_players
                     (player_id, player_name, role, capped, rating, outcome, team, price)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'sold', ?6, ?7)",
                params![
                    purchase.player_id,
                    purchase.player_name,
                    purchase.role.display_str(),
                    purchase.capped as i64,
                    purchase.rating,
                    team,
                    purchase.price as i64,
                ],
            )
            .context("failed to record sale")?;
        Ok(())
    }

    pub fn record_unsold(&self, purchase_shape: &PurchaseRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO completed_players
                     (player_id, player_name, role, capped, rating, outcome)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'unsold')",
                params![
                    purchase_shape.player_id,
                    purchase_shape.player_name,
                    purchase_shape.role.display_str(),
                    purchase_shape.capped as i64,
                    purchase_shape.rating,
                ],
            )
            .context("failed to record unsold player")?;
        Ok(())
    }

    /// Load everything needed to rebuild in-memory state by replay.
    pub fn load_recovery(&self) -> Result<RecoveryData> {
        let conn = self.conn();
        let mut data = RecoveryData::default();

        let mut stmt = conn
            .prepare("SELECT name FROM teams ORDER BY created_at, name")
            .context("failed to prepare team query")?;
        let team_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .context("failed to query teams")?
            .collect::<std::result::Result<_, _>>()?;

        for name in team_names {
            let mut stmt = conn
                .prepare("SELECT member FROM team_members WHERE team = ?1 ORDER BY member")
                .context("failed to prepare member query")?;
            let members: Vec<String> = stmt
                .query_map(params![name], |row| row.get(0))
                .context("failed to query members")?
                .collect::<std::result::Result<_, _>>()?;
            data.teams.push((name, members));
        }

        let mut stmt = conn
            .prepare(
                "SELECT player_id, player_name, role, capped, rating, outcome, team, price
                 FROM completed_players ORDER BY committed_at, rowid",
            )
            .context("failed to prepare completion query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? != 0,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                ))
            })
            .context("failed to query completed players")?;

        for row in rows {
            let (player_id, player_name, role_str, capped, rating, outcome, team, price) = row?;
            let role = Role::parse(&role_str)
                .with_context(|| format!("corrupt role `{role_str}` for player `{player_id}`"))?;
            let purchase = PurchaseRecord {
                player_id: player_id.clone(),
                player_name,
                role,
                capped,
                rating,
                price: price.unwrap_or(0) as u64,
            };
            match outcome.as_str() {
                "sold" => {
                    let team = team.with_context(|| {
                        format!("sold player `{player_id}` has no winning team")
                    })?;
                    data.sales.push((team, purchase));
                }
                "unsold" => data.unsold.push(player_id),
                other => anyhow::bail!("corrupt outcome `{other}` for player `{player_id}`"),
            }
        }

        Ok(data)
    }

    /// Store a lineup submission, overwriting the team's previous one.
    pub fn save_submission(&self, submission: &LineupSubmission) -> Result<()> {
        let payload =
            serde_json::to_string(submission).context("failed to serialize submission")?;
        self.conn()
            .execute(
                "INSERT INTO lineup_submissions (team, payload) VALUES (?1, ?2)
                 ON CONFLICT(team) DO UPDATE SET
                     payload = excluded.payload,
                     submitted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![submission.team, payload],
            )
            .context("failed to save lineup submission")?;
        Ok(())
    }

    pub fn load_submission(&self, team: &str) -> Result<Option<LineupSubmission>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM lineup_submissions WHERE team = ?1",
                params![team],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load lineup submission")?;
        payload
            .map(|p| serde_json::from_str(&p).context("corrupt lineup submission payload"))
            .transpose()
    }

    pub fn load_submissions(&self) -> Result<Vec<LineupSubmission>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT payload FROM lineup_submissions ORDER BY team")
            .context("failed to prepare submission query")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query submissions")?;
        let mut submissions = Vec::new();
        for payload in payloads {
            submissions.push(
                serde_json::from_str(&payload?).context("corrupt lineup submission payload")?,
            );
        }
        Ok(submissions)
    }
}
