use crate::StoreError;
use rusqlite::Connection;

/// What a bulk cleanup removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    /// Access events only.
    Events,
    /// Access events, then identities.
    All,
}

impl PurgeScope {
    /// Parse the admin form value (`accesos` / `todo`).
    pub fn from_form(value: &str) -> Option<Self> {
        match value {
            "accesos" => Some(Self::Events),
            "todo" => Some(Self::All),
            _ => None,
        }
    }
}

/// Clear history as a single unit.
///
/// Foreign-key enforcement is switched off for the duration (the pragma is a
/// no-op inside a transaction, so it wraps it) and switched back on whether
/// the transaction commits or not. Id sequences of the cleared tables restart.
pub fn purge(conn: &mut Connection, scope: PurgeScope) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let result = purge_tables(conn, scope);
    let restored = conn.execute_batch("PRAGMA foreign_keys = ON;");
    result?;
    restored?;
    tracing::info!(?scope, "history purged");
    Ok(())
}

fn purge_tables(conn: &mut Connection, scope: PurgeScope) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM access_events", [])?;
    tx.execute("DELETE FROM sqlite_sequence WHERE name = 'access_events'", [])?;
    if scope == PurgeScope::All {
        tx.execute("DELETE FROM identities", [])?;
        tx.execute("DELETE FROM sqlite_sequence WHERE name = 'identities'", [])?;
    }
    tx.commit()?;
    Ok(())
}
