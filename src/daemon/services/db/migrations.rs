//! Schema migrations.
//!
//! `schema_version` holds a single row with the applied version; each
//! migration step runs once, in order.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

const SCHEMA_VERSION: i32 = 1;

pub(super) fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .context("Failed to create schema_version table")?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version != SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .context("Failed to read schema version")?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v1: initial schema");

    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS shared_files (
            file_id TEXT PRIMARY KEY,
            owner_token TEXT NOT NULL UNIQUE,
            storage_key TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL DEFAULT '',
            media_type TEXT NOT NULL DEFAULT '',
            recipient_email TEXT,
            initial_count INTEGER NOT NULL CHECK (initial_count >= 1),
            remaining_count INTEGER NOT NULL
                CHECK (remaining_count >= 0 AND remaining_count <= initial_count),
            expiry_days INTEGER NOT NULL,
            available_after INTEGER NOT NULL,
            only_eea INTEGER NOT NULL DEFAULT 0,
            include_other_european INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            state TEXT NOT NULL DEFAULT 'creating'
        );

        CREATE INDEX IF NOT EXISTS idx_shared_files_created ON shared_files(created_at);

        CREATE TABLE IF NOT EXISTS clients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id TEXT NOT NULL REFERENCES shared_files(file_id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            addr TEXT NOT NULL DEFAULT '',
            user_agent TEXT NOT NULL DEFAULT '',
            tls_version TEXT NOT NULL DEFAULT '',
            tls_cipher_suite TEXT NOT NULL DEFAULT '',
            location TEXT,
            recorded_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_clients_file_role ON clients(file_id, role);

        CREATE TABLE IF NOT EXISTS stats_visits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            client TEXT,
            recorded_at INTEGER NOT NULL
        );
    ",
    )
    .context("Failed to apply migration v1")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let rows: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_remaining_count_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO shared_files (file_id, owner_token, storage_key, initial_count, \
             remaining_count, expiry_days, available_after, created_at) \
             VALUES ('f', 't', 'k', 1, 2, 1, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
