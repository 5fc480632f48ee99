//! vigil-store — Persistent identity and access-event history.
//!
//! Plain synchronous rusqlite functions over a borrowed [`Connection`], so the
//! same code runs on the CLI thread and inside `tokio_rusqlite::Connection::call`
//! in the daemon.

pub mod events;
pub mod identities;
pub mod mirror;
pub mod purge;
pub mod schema;

use chrono::Local;
pub use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use events::{all_events, events_for, record_event, recent_events, stats, EventRecord, Stats};
pub use identities::{ensure_identity, list_identities, remove_identity, set_active, IdentityRecord};
pub use mirror::{SqliteEventSink, SqliteMirror};
pub use purge::{purge, PurgeScope};
pub use schema::migrate;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot open database {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Stored timestamp format (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open (creating if needed) the database at `path` and configure it.
pub fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(|source| StoreError::Unavailable {
        path: path.to_path_buf(),
        source,
    })?;
    configure(&conn)?;
    Ok(conn)
}

/// Apply connection pragmas: busy timeout, WAL journaling, foreign keys.
pub fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};
         PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;"
    ))?;
    Ok(())
}

pub(crate) fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
