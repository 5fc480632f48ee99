use crate::StoreError;
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT UNIQUE NOT NULL,
    created_at  TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    last_access TEXT
);

CREATE TABLE IF NOT EXISTS access_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id   INTEGER REFERENCES identities(id) ON DELETE SET NULL,
    declared_name TEXT NOT NULL,
    outcome       TEXT NOT NULL CHECK (outcome IN ('ADMITTED', 'DENIED')),
    occurred_at   TEXT NOT NULL,
    similarity    REAL NOT NULL,
    evidence_ref  TEXT
);

CREATE INDEX IF NOT EXISTS idx_access_events_declared_name
    ON access_events(declared_name);
";

/// Create tables if absent. Safe to run on every startup.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    tracing::debug!("schema ready");
    Ok(())
}
