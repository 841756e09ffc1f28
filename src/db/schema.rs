// Database schema: table creation and migrations.
//
// A `schema_version` table tracks which migrations have run, and each
// migration is a function that executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// Idempotent; runs on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Imported forum posts; the input to every clustering run
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            author TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            top_comments TEXT,
            created_at TEXT NOT NULL,          -- RFC 3339, UTC
            source TEXT,                       -- subreddit / forum name
            score INTEGER NOT NULL DEFAULT 0,
            num_comments INTEGER NOT NULL DEFAULT 0,
            flair TEXT,
            tags TEXT NOT NULL DEFAULT '[]',   -- JSON array of tag names
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per completed clustering run
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            generated_at TEXT NOT NULL,
            total_records INTEGER NOT NULL,
            noise_records INTEGER NOT NULL,
            cluster_count INTEGER NOT NULL,
            flagged_clusters INTEGER NOT NULL,
            report_json TEXT NOT NULL           -- the full RunReport
        );

        -- Label each run gave each record (-1 = noise)
        CREATE TABLE IF NOT EXISTS cluster_labels (
            run_id INTEGER NOT NULL REFERENCES runs(id),
            record_id TEXT NOT NULL REFERENCES records(id),
            label INTEGER,
            PRIMARY KEY (run_id, record_id)
        );

        CREATE INDEX IF NOT EXISTS idx_records_author
            ON records(author);

        CREATE INDEX IF NOT EXISTS idx_labels_record
            ON cluster_labels(record_id);
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: the cache file a run's embeddings came from, so a report
    // can be traced back to the matrix it was computed on.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE runs ADD COLUMN embedding_cache TEXT;")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
