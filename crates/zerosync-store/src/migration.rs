//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "store schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: tracked files and the change log.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per tracked path; never deleted individually
        CREATE TABLE files (
            path TEXT PRIMARY KEY,            -- relative to the synchronized root
            timestamp INTEGER NOT NULL,       -- mtime of known-good content (Unix ms)
            checksum TEXT NOT NULL,           -- hex Blake3 digest, '0' if unknown
            size INTEGER NOT NULL,
            new_path TEXT,                    -- pending rename target
            reference INTEGER NOT NULL DEFAULT 0,
            changed INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            renamed INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            changed_self INTEGER NOT NULL DEFAULT 0
        );

        -- Append-only change log; seq preserves append order within a state
        CREATE TABLE file_index (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            state INTEGER NOT NULL,
            path TEXT NOT NULL,
            operation TEXT NOT NULL,          -- 'UPD' | 'REN' | 'DEL'
            timestamp INTEGER NOT NULL,
            size INTEGER,                     -- UPD only
            new_path TEXT,                    -- REN only
            checksum TEXT,                    -- UPD only
            changed_self INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_files_checksum ON files(checksum);
        CREATE INDEX idx_files_changed ON files(changed);
        CREATE INDEX idx_index_state ON file_index(state);
        CREATE INDEX idx_index_state_self ON file_index(state, changed_self);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
