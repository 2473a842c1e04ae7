// src/db/mod.rs

//! Database layer
//!
//! Handles SQLite connection bootstrap and schema migration. The actual
//! table definitions live in [`schema`]; CRUD lives alongside each domain
//! type in [`crate::model`].

pub mod schema;

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Initialize a new data store at the specified path.
///
/// Creates the database file, sets the reliability pragmas, and runs all
/// pending migrations. Idempotent: calling it on an existing, up-to-date
/// database is a no-op beyond opening the file.
pub fn init(db_path: &str) -> Result<Connection> {
    debug!("Initializing database at: {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::InitError(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    let conn = Connection::open(db_path)?;
    apply_pragmas(&conn, true)?;
    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(conn)
}

/// Open an existing data store.
///
/// Returns [`Error::DatabaseNotFound`] if the file does not exist. Does not
/// run migrations; callers that expect a stale database should call
/// [`schema::migrate`] explicitly.
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open(db_path)?;
    apply_pragmas(&conn, false)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, with_wal: bool) -> Result<()> {
    if with_wal {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    }
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
    Ok(())
}
