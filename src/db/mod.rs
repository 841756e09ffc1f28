// Database layer: SQLite storage for imported records, clustering runs and
// the labels each run assigned.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever MURMUR_DB_PATH points
// (defaults to ./murmur.db).

pub mod models;
pub mod queries;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the database and run migrations.
///
/// Called by `murmur init` and `murmur import`.
pub fn initialize(db_path: &str) -> Result<Connection> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `murmur init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.db");
        let err = open(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("murmur init"));
    }

    #[test]
    fn test_initialize_creates_parent_dirs_then_open_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("murmur.db");
        let path = path.to_str().unwrap();

        initialize(path).unwrap();
        let conn = open(path).unwrap();
        assert_eq!(schema::table_count(&conn).unwrap(), 4);
    }
}
