use crate::{now_stamp, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use vigil_core::{AccessDecision, Outcome};

/// Persisted access event row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub identity_id: Option<i64>,
    pub declared_name: String,
    pub outcome: Outcome,
    pub occurred_at: String,
    pub similarity: f64,
    pub evidence_ref: Option<String>,
}

const EVENT_COLUMNS: &str =
    "id, identity_id, declared_name, outcome, occurred_at, similarity, evidence_ref";

impl EventRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let outcome: String = row.get(3)?;
        let outcome = Outcome::parse(&outcome).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown outcome {outcome:?}").into(),
            )
        })?;
        Ok(Self {
            id: row.get(0)?,
            identity_id: row.get(1)?,
            declared_name: row.get(2)?,
            outcome,
            occurred_at: row.get(4)?,
            similarity: row.get(5)?,
            evidence_ref: row.get(6)?,
        })
    }
}

/// Aggregate counts for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stats {
    pub total_identities: i64,
    pub total_events: i64,
    pub admitted: i64,
    pub denied: i64,
}

/// Append one event for `decision` and, when admitted, bump the matched
/// identity's `last_access`. Both writes commit together.
///
/// `identity_id` is set only when the decision is admitted and a row for the
/// matched name exists.
pub fn record_event(
    conn: &mut Connection,
    decision: &AccessDecision,
    evidence: Option<&Path>,
) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;
    let now = now_stamp();

    let identity_id: Option<i64> = if decision.is_admitted() {
        tx.query_row(
            "SELECT id FROM identities WHERE name = ?1",
            params![decision.matched_name],
            |r| r.get(0),
        )
        .optional()?
    } else {
        None
    };

    tx.execute(
        "INSERT INTO access_events(identity_id, declared_name, outcome, occurred_at, similarity, evidence_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            identity_id,
            decision.matched_name,
            decision.outcome.as_str(),
            now,
            stored_similarity(decision.similarity),
            evidence.map(|p| p.display().to_string()),
        ],
    )?;
    let event_id = tx.last_insert_rowid();

    if let Some(id) = identity_id {
        tx.execute(
            "UPDATE identities SET last_access = ?1 WHERE id = ?2",
            params![now, id],
        )?;
    }

    tx.commit()?;
    tracing::debug!(event_id, outcome = %decision.outcome, "access event recorded");
    Ok(event_id)
}

/// Similarity as persisted: clamped to [0,1] and rounded to six decimals so
/// the f32 widening does not leak digits like `0.9100000262260437`.
fn stored_similarity(similarity: f32) -> f64 {
    let clamped = f64::from(similarity.clamp(0.0, 1.0));
    (clamped * 1e6).round() / 1e6
}

/// Most recent `limit` events, newest first.
pub fn recent_events(conn: &Connection, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
    query_events(
        conn,
        &format!("SELECT {EVENT_COLUMNS} FROM access_events ORDER BY id DESC LIMIT ?1"),
        params![limit as i64],
    )
}

/// Every event, newest first.
pub fn all_events(conn: &Connection) -> Result<Vec<EventRecord>, StoreError> {
    query_events(
        conn,
        &format!("SELECT {EVENT_COLUMNS} FROM access_events ORDER BY id DESC"),
        params![],
    )
}

/// Most recent `limit` events whose declared name is `name`, newest first.
pub fn events_for(conn: &Connection, name: &str, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
    query_events(
        conn,
        &format!(
            "SELECT {EVENT_COLUMNS} FROM access_events WHERE declared_name = ?1 ORDER BY id DESC LIMIT ?2"
        ),
        params![name, limit as i64],
    )
}

fn query_events(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<EventRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, EventRecord::from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn stats(conn: &Connection) -> Result<Stats, StoreError> {
    let total_identities = conn.query_row("SELECT COUNT(*) FROM identities", [], |r| r.get(0))?;
    let (total_events, admitted, denied) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(outcome = 'ADMITTED'), 0),
                COALESCE(SUM(outcome = 'DENIED'), 0)
         FROM access_events",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(Stats {
        total_identities,
        total_events,
        admitted,
        denied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identities::{ensure_identity, list_identities, remove_identity};
    use crate::testutil::fresh;

    fn admitted(name: &str, similarity: f32) -> AccessDecision {
        AccessDecision {
            outcome: Outcome::Admitted,
            matched_name: name.into(),
            similarity,
        }
    }

    #[test]
    fn test_admitted_event_links_identity_and_updates_last_access() {
        let (_tmp, mut conn) = fresh();
        ensure_identity(&conn, "alice").unwrap();

        record_event(&mut conn, &admitted("alice", 0.9), None).unwrap();

        let events = all_events(&conn).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].identity_id.is_some());
        assert_eq!(events[0].outcome, Outcome::Admitted);
        assert!((events[0].similarity - 0.9).abs() < 1e-6);
        assert!(list_identities(&conn).unwrap()[0].last_access.is_some());
    }

    #[test]
    fn test_similarity_stored_without_widening_noise() {
        let (_tmp, mut conn) = fresh();
        record_event(&mut conn, &admitted("alice", 0.91), None).unwrap();
        record_event(&mut conn, &AccessDecision::denied(1.5), None).unwrap();

        let events = all_events(&conn).unwrap();
        assert_eq!(events[1].similarity, 0.91);
        assert_eq!(events[1].similarity.to_string(), "0.91");
        assert_eq!(events[0].similarity, 1.0);
    }

    #[test]
    fn test_denied_event_has_null_identity() {
        let (_tmp, mut conn) = fresh();
        ensure_identity(&conn, "unknown").unwrap();

        record_event(&mut conn, &AccessDecision::denied(0.4), Some(Path::new("/tmp/probe.jpg"))).unwrap();

        let events = all_events(&conn).unwrap();
        assert_eq!(events[0].identity_id, None);
        assert_eq!(events[0].declared_name, "unknown");
        assert_eq!(events[0].evidence_ref.as_deref(), Some("/tmp/probe.jpg"));
        assert!(list_identities(&conn).unwrap()[0].last_access.is_none());
    }

    #[test]
    fn test_admitted_without_row_still_recorded() {
        let (_tmp, mut conn) = fresh();
        record_event(&mut conn, &admitted("ghost", 0.8), None).unwrap();
        let events = all_events(&conn).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity_id, None);
    }

    #[test]
    fn test_removal_nulls_event_reference() {
        let (_tmp, mut conn) = fresh();
        ensure_identity(&conn, "alice").unwrap();
        record_event(&mut conn, &admitted("alice", 0.9), None).unwrap();

        remove_identity(&conn, "alice").unwrap();

        let events = all_events(&conn).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity_id, None);
        assert_eq!(events[0].declared_name, "alice");
    }

    #[test]
    fn test_recent_and_per_name_queries() {
        let (_tmp, mut conn) = fresh();
        ensure_identity(&conn, "alice").unwrap();
        for i in 0..5 {
            record_event(&mut conn, &admitted("alice", 0.7 + i as f32 * 0.01), None).unwrap();
        }
        record_event(&mut conn, &AccessDecision::denied(0.1), None).unwrap();

        let recent = recent_events(&conn, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].declared_name, "unknown");
        assert!(recent[0].id > recent[1].id);

        let alice = events_for(&conn, "alice", 50).unwrap();
        assert_eq!(alice.len(), 5);
        assert!(alice.iter().all(|e| e.outcome == Outcome::Admitted));
    }

    #[test]
    fn test_stats() {
        let (_tmp, mut conn) = fresh();
        assert_eq!(stats(&conn).unwrap(), Stats::default());

        ensure_identity(&conn, "alice").unwrap();
        ensure_identity(&conn, "bob").unwrap();
        record_event(&mut conn, &admitted("alice", 0.9), None).unwrap();
        record_event(&mut conn, &AccessDecision::denied(0.2), None).unwrap();
        record_event(&mut conn, &AccessDecision::denied(0.3), None).unwrap();

        assert_eq!(
            stats(&conn).unwrap(),
            Stats {
                total_identities: 2,
                total_events: 3,
                admitted: 1,
                denied: 2,
            }
        );
    }
}
