use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sessions and inbound_turns tables.
///
/// Safe to call on every open; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            session_key   TEXT NOT NULL UNIQUE,
            account_id    TEXT NOT NULL,
            peer_id       TEXT NOT NULL,
            sender_name   TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS inbound_turns (
            id          TEXT PRIMARY KEY,
            session_key TEXT NOT NULL,
            provider    TEXT NOT NULL,
            body        TEXT NOT NULL,
            context     TEXT NOT NULL,
            received_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_session
            ON inbound_turns(session_key, received_at DESC);",
    )?;
    Ok(())
}
