//! Adapters from the core traits onto the database.
//!
//! Each call opens its own connection and drops it before returning.

use crate::{events, identities, open, StoreError};
use std::path::{Path, PathBuf};
use vigil_core::{AccessDecision, EventSink, IdentityMirror, MirrorError, SinkError};

/// Keeps the `identities` table in step with the enrollment catalog.
#[derive(Debug, Clone)]
pub struct SqliteMirror {
    db_path: PathBuf,
}

impl SqliteMirror {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }
}

impl IdentityMirror for SqliteMirror {
    fn ensure(&self, name: &str) -> Result<bool, MirrorError> {
        let conn = open(&self.db_path).map_err(mirror_err)?;
        identities::ensure_identity(&conn, name).map_err(mirror_err)
    }

    fn forget(&self, name: &str) -> Result<(), MirrorError> {
        let conn = open(&self.db_path).map_err(mirror_err)?;
        identities::remove_identity(&conn, name).map_err(mirror_err)?;
        Ok(())
    }
}

fn mirror_err(e: StoreError) -> MirrorError {
    MirrorError(e.to_string())
}

/// Records each decision as one `access_events` row.
#[derive(Debug, Clone)]
pub struct SqliteEventSink {
    db_path: PathBuf,
}

impl SqliteEventSink {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }
}

impl EventSink for SqliteEventSink {
    fn record(&self, decision: &AccessDecision, evidence: Option<&Path>) -> Result<(), SinkError> {
        let mut conn = open(&self.db_path).map_err(|e| SinkError(e.to_string()))?;
        events::record_event(&mut conn, decision, evidence).map_err(|e| SinkError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fresh;
    use crate::{all_events, list_identities};
    use vigil_core::Outcome;

    #[test]
    fn test_mirror_ensure_and_forget() {
        let (tmp, conn) = fresh();
        let mirror = SqliteMirror::new(tmp.path().join("vigil.db"));

        assert!(mirror.ensure("alice").unwrap());
        assert!(!mirror.ensure("alice").unwrap());
        assert_eq!(list_identities(&conn).unwrap().len(), 1);

        mirror.forget("alice").unwrap();
        mirror.forget("alice").unwrap();
        assert!(list_identities(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_sink_records_one_row_per_decision() {
        let (tmp, conn) = fresh();
        let sink = SqliteEventSink::new(tmp.path().join("vigil.db"));
        SqliteMirror::new(tmp.path().join("vigil.db")).ensure("bob").unwrap();

        let decision = AccessDecision {
            outcome: Outcome::Admitted,
            matched_name: "bob".into(),
            similarity: 0.93,
        };
        sink.record(&decision, None).unwrap();
        sink.record(&AccessDecision::denied(0.2), None).unwrap();

        let events = all_events(&conn).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].declared_name, "bob");
        assert!(events[1].identity_id.is_some());
    }

    #[test]
    fn test_sink_unavailable_database() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let sink = SqliteEventSink::new(blocker.join("vigil.db"));
        assert!(sink.record(&AccessDecision::denied(0.0), None).is_err());
    }
}
