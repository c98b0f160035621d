//! SQLite persistence for Intervet.
//!
//! One database file holds the catalog (roles, scenarios, corpora, SQL
//! sandbox definitions) and the per-session data (sessions, transcript
//! messages, score ledger). All tables are created on startup with
//! `CREATE TABLE IF NOT EXISTS` migrations.

mod seed;
mod sqlite;

pub use seed::seed_defaults;
pub use sqlite::SqliteStore;
