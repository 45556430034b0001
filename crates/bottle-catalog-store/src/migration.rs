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
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

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
                rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Deduplicated content, keyed by the canonical digest
        CREATE TABLE contents (
            id INTEGER PRIMARY KEY,
            canonical_digest TEXT NOT NULL UNIQUE,
            raw_bytes BLOB NOT NULL,
            created_at INTEGER NOT NULL           -- unix nanos
        );

        -- Every digest a client has used to name content
        CREATE TABLE digests (
            id INTEGER PRIMARY KEY,
            content_id INTEGER NOT NULL REFERENCES contents(id),
            digest TEXT NOT NULL UNIQUE,          -- <alg>:<hex>
            algorithm TEXT NOT NULL
        );
        CREATE INDEX idx_digests_content ON digests(content_id);

        -- Processed objects, one row per content record per kind
        CREATE TABLE blobs (
            id INTEGER PRIMARY KEY,
            content_id INTEGER NOT NULL UNIQUE REFERENCES contents(id),
            processor_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL UNIQUE,   -- unix nanos, strictly increasing
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE bottles (
            id INTEGER PRIMARY KEY,
            content_id INTEGER NOT NULL UNIQUE REFERENCES contents(id),
            processor_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL UNIQUE,
            updated_at INTEGER NOT NULL,
            api_version TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE bottle_sources (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            location INTEGER NOT NULL,
            name TEXT NOT NULL,
            uri TEXT NOT NULL,
            bottle_digest TEXT,
            part_selectors TEXT NOT NULL,         -- JSON array
            UNIQUE(bottle_id, location)
        );

        CREATE TABLE bottle_authors (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            location INTEGER NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            email TEXT NOT NULL,
            UNIQUE(bottle_id, location)
        );

        CREATE TABLE bottle_metrics (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            location INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            value REAL,
            UNIQUE(bottle_id, location)
        );

        CREATE TABLE bottle_public_artifacts (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            location INTEGER NOT NULL,
            name TEXT NOT NULL,
            media_type TEXT NOT NULL,
            path TEXT NOT NULL,
            digest TEXT NOT NULL,
            content_id INTEGER NOT NULL REFERENCES contents(id),
            UNIQUE(bottle_id, location)
        );

        CREATE TABLE bottle_labels (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            numeric_value REAL,                   -- NULL when the value is not a number
            UNIQUE(bottle_id, key)
        );

        CREATE TABLE bottle_annotations (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(bottle_id, key)
        );

        CREATE TABLE bottle_deprecates (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            location INTEGER NOT NULL,
            deprecated_digest TEXT NOT NULL,
            UNIQUE(bottle_id, location)
        );

        CREATE TABLE bottle_parts (
            id INTEGER PRIMARY KEY,
            bottle_id INTEGER NOT NULL REFERENCES bottles(id),
            location INTEGER NOT NULL,
            name TEXT NOT NULL,
            size INTEGER NOT NULL,
            digest TEXT NOT NULL,
            labels TEXT NOT NULL,                 -- JSON object
            UNIQUE(bottle_id, location)
        );

        CREATE TABLE manifests (
            id INTEGER PRIMARY KEY,
            content_id INTEGER NOT NULL UNIQUE REFERENCES contents(id),
            processor_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL UNIQUE,
            updated_at INTEGER NOT NULL,
            bottle_id INTEGER REFERENCES bottles(id),
            bottle_digest TEXT NOT NULL DEFAULT '',
            media_type TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE manifest_layers (
            id INTEGER PRIMARY KEY,
            manifest_id INTEGER NOT NULL REFERENCES manifests(id),
            location INTEGER NOT NULL,
            digest TEXT NOT NULL,
            UNIQUE(manifest_id, location)
        );

        CREATE TABLE events (
            id INTEGER PRIMARY KEY,
            content_id INTEGER NOT NULL UNIQUE REFERENCES contents(id),
            processor_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL UNIQUE,
            updated_at INTEGER NOT NULL,
            manifest_id INTEGER REFERENCES manifests(id),
            manifest_digest TEXT NOT NULL DEFAULT '',
            bottle_id INTEGER REFERENCES bottles(id),
            bottle_digest TEXT NOT NULL DEFAULT '',
            action TEXT,
            repository TEXT NOT NULL DEFAULT '',
            tag TEXT NOT NULL DEFAULT '',
            auth_required INTEGER NOT NULL DEFAULT 0,
            bandwidth INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL DEFAULT '',
            username TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE signatures (
            id INTEGER PRIMARY KEY,
            content_id INTEGER NOT NULL UNIQUE REFERENCES contents(id),
            processor_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL UNIQUE,
            updated_at INTEGER NOT NULL,
            manifest_id INTEGER REFERENCES manifests(id),
            manifest_digest TEXT NOT NULL DEFAULT '',
            bottle_id INTEGER REFERENCES bottles(id),
            bottle_digest TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE signature_details (
            id INTEGER PRIMARY KEY,
            signature_id INTEGER NOT NULL REFERENCES signatures(id),
            location INTEGER NOT NULL,
            signature_type TEXT NOT NULL,
            signature BLOB NOT NULL,
            public_key TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            valid INTEGER NOT NULL,
            annotations TEXT NOT NULL,            -- JSON object
            UNIQUE(signature_id, location)
        );

        CREATE INDEX idx_manifests_bottle ON manifests(bottle_id);
        CREATE INDEX idx_events_manifest ON events(manifest_id);
        CREATE INDEX idx_signatures_bottle ON signatures(bottle_id);
        CREATE INDEX idx_deprecates_digest ON bottle_deprecates(deprecated_digest);
        "#,
    )?;

    Ok(())
}
