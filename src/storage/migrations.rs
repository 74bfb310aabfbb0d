//! Schema migrations, tracked through `PRAGMA user_version`.

use rusqlite::Connection;

use crate::error::{LabError, Result};

const MIGRATIONS: [&str; 2] = [
    include_str!("../../migrations/001_initial_schema.sql"),
    include_str!("../../migrations/002_add_events.sql"),
];

#[allow(clippy::cast_possible_truncation)]
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

fn user_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| LabError::StorageUnavailable(format!("read user_version: {err}")))
}

/// Apply every migration newer than the database's recorded version.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let current_version = user_version(conn)?;

    for (target_version, sql) in (1u32..).zip(MIGRATIONS.iter()) {
        if current_version >= target_version {
            continue;
        }

        tracing::debug!(target_version, "applying migration");
        conn.execute_batch(sql).map_err(|err| {
            LabError::StorageUnavailable(format!("migration {target_version} failed: {err}"))
        })?;
        conn.pragma_update(None, "user_version", target_version)
            .map_err(|err| {
                LabError::StorageUnavailable(format!(
                    "failed to set user_version {target_version}: {err}"
                ))
            })?;
    }

    Ok(SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_user_version(conn: &Connection) -> u32 {
        conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn migrations_are_not_empty() {
        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            assert!(
                sql.to_lowercase().contains("create table"),
                "Migration {} creates no table",
                idx + 1
            );
        }
    }

    #[test]
    fn run_migrations_on_empty_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_user_version(&conn), 0);

        let result = run_migrations(&conn).unwrap();
        assert_eq!(result, SCHEMA_VERSION);
        assert_eq!(get_user_version(&conn), SCHEMA_VERSION);
        for table in ["experiments", "variants", "assignments", "events"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        for _ in 0..3 {
            assert_eq!(run_migrations(&conn).unwrap(), SCHEMA_VERSION);
        }
        assert_eq!(get_user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn partial_database_is_brought_forward() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0]).unwrap();
        conn.pragma_update(None, "user_version", 1u32).unwrap();
        assert!(!table_exists(&conn, "events"));

        run_migrations(&conn).unwrap();
        assert!(table_exists(&conn, "events"));
        assert_eq!(get_user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn assignment_pair_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO experiments (id, name, start_time, primary_metric_name, updated_at)
             VALUES ('e1', 'exp', '2026-01-01T00:00:00Z', 'purchase', '2026-01-01T00:00:00Z');
             INSERT INTO assignments VALUES ('e1', 'u1', 'v1', '2026-01-01T00:00:00Z');",
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO assignments VALUES ('e1', 'u1', 'v2', '2026-01-01T00:00:01Z')",
            [],
        );
        assert!(dup.is_err());
    }
}
