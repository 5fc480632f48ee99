use crate::{now_stamp, StoreError};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

/// Persisted identity row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityRecord {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub active: bool,
    pub last_access: Option<String>,
}

impl IdentityRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
            active: row.get::<_, i64>(3)? != 0,
            last_access: row.get(4)?,
        })
    }
}

/// Insert `name` if no row exists for it. Returns true when a row was created.
pub fn ensure_identity(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO identities(name, created_at) VALUES (?1, ?2)",
        params![name, now_stamp()],
    )?;
    if inserted > 0 {
        tracing::debug!(name, "identity row created");
    }
    Ok(inserted > 0)
}

/// Delete the row for `name`. Events that referenced it keep their rows with
/// a null `identity_id`.
pub fn remove_identity(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let removed = conn.execute("DELETE FROM identities WHERE name = ?1", params![name])?;
    Ok(removed > 0)
}

/// Mark `name` active or inactive. Returns false when no row exists.
///
/// The flag is administrative: it is listed and exported, and access
/// decisions do not consult it.
pub fn set_active(conn: &Connection, name: &str, active: bool) -> Result<bool, StoreError> {
    let updated = conn.execute(
        "UPDATE identities SET active = ?1 WHERE name = ?2",
        params![i64::from(active), name],
    )?;
    if updated > 0 {
        tracing::info!(name, active, "identity status changed");
    }
    Ok(updated > 0)
}

/// All identities ordered by name.
pub fn list_identities(conn: &Connection) -> Result<Vec<IdentityRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, created_at, active, last_access FROM identities ORDER BY name",
    )?;
    let rows = stmt.query_map([], IdentityRecord::from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fresh;

    #[test]
    fn test_ensure_identity_once() {
        let (_tmp, conn) = fresh();
        assert!(ensure_identity(&conn, "alice").unwrap());
        assert!(!ensure_identity(&conn, "alice").unwrap());
        let all = list_identities(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].active);
        assert!(all[0].last_access.is_none());
    }

    #[test]
    fn test_list_identities_ordered_by_name() {
        let (_tmp, conn) = fresh();
        for name in ["carol", "alice", "bob"] {
            ensure_identity(&conn, name).unwrap();
        }
        let names: Vec<_> = list_identities(&conn).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let (_tmp, conn) = fresh();
        assert!(ensure_identity(&conn, "Alice").unwrap());
        assert!(ensure_identity(&conn, "alice").unwrap());
        assert_eq!(list_identities(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_set_active() {
        let (_tmp, conn) = fresh();
        ensure_identity(&conn, "alice").unwrap();
        ensure_identity(&conn, "bob").unwrap();

        assert!(set_active(&conn, "alice", false).unwrap());
        let all = list_identities(&conn).unwrap();
        assert!(!all[0].active);
        assert!(all[1].active);

        assert!(set_active(&conn, "alice", true).unwrap());
        assert!(list_identities(&conn).unwrap()[0].active);

        assert!(!set_active(&conn, "nobody", false).unwrap());
    }

    #[test]
    fn test_remove_identity() {
        let (_tmp, conn) = fresh();
        ensure_identity(&conn, "alice").unwrap();
        assert!(remove_identity(&conn, "alice").unwrap());
        assert!(!remove_identity(&conn, "alice").unwrap());
        assert!(list_identities(&conn).unwrap().is_empty());
    }
}
