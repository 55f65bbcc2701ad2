// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod arbiter;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod lineup;
pub mod notify;
pub mod player;
pub mod protocol;
pub mod session;
pub mod ws_server;
