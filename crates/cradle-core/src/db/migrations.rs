//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Schema steps, index `n` holds version `n + 1`
const MIGRATIONS: &[&str] = &[MIGRATION_V1, MIGRATION_V2];

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    for (target, statements) in (1..=CURRENT_VERSION).zip(MIGRATIONS.iter()) {
        if version < target {
            apply(conn, target, statements)?;
        }
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Apply one migration atomically and record its version
fn apply(conn: &Connection, version: i32, statements: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(statements)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Version 1: outbox table
const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS sync_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        entity_ref TEXT,
        payload TEXT NOT NULL,
        priority INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status);
    CREATE INDEX IF NOT EXISTS idx_sync_queue_priority ON sync_queue(priority, id);
    CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at);
";

/// Version 2: domain record tables mirrored by the outbox
const MIGRATION_V2: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        operator_id INTEGER NOT NULL,
        baby_ref TEXT NOT NULL,
        state TEXT NOT NULL,
        sync_status TEXT NOT NULL DEFAULT 'PENDING',
        created_at INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_operator ON sessions(operator_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_sync_status ON sessions(sync_status);

    CREATE TABLE IF NOT EXISTS finger_captures (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        sync_status TEXT NOT NULL DEFAULT 'PENDING',
        created_at INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_finger_captures_session ON finger_captures(session_id);

    CREATE TABLE IF NOT EXISTS forms (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        sync_status TEXT NOT NULL DEFAULT 'PENDING',
        created_at INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_forms_session ON forms(session_id);

    CREATE TABLE IF NOT EXISTS audit_entries (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        entity TEXT NOT NULL,
        sync_status TEXT NOT NULL DEFAULT 'PENDING',
        created_at INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_audit_entries_user ON audit_entries(user_id);
    CREATE INDEX IF NOT EXISTS idx_audit_entries_sync_status ON audit_entries(sync_status);

    CREATE TABLE IF NOT EXISTS login_events (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        success INTEGER NOT NULL,
        sync_status TEXT NOT NULL DEFAULT 'PENDING',
        created_at INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_login_events_email ON login_events(email);
";
