// src/model/user.rs

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// An operator identity, keyed by an opaque string such as an email address.
/// Referenced by every other audited table's `create_user_id`/`modify_user_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub key: String,
    pub title: Option<String>,
    pub create_date: Option<DateTime<Utc>>,
    pub modify_date: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            title: None,
            create_date: None,
            modify_date: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO user (key, title) VALUES (?1, ?2)",
            params![self.key, self.title],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
        conn.query_row("SELECT * FROM user WHERE id = ?1", [id], from_row)
            .optional()
            .map_err(Error::from)
    }

    pub fn find_by_key(conn: &Connection, key: &str) -> Result<Option<User>> {
        conn.query_row("SELECT * FROM user WHERE key = ?1", [key], from_row)
            .optional()
            .map_err(Error::from)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<User>> {
        let mut stmt = conn.prepare("SELECT * FROM user ORDER BY id")?;
        let rows = stmt.query_map([], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM user WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        create_date: row.get("create_date")?,
        modify_date: row.get("modify_date")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        db::schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_insert_and_find_by_key() {
        let (_temp, conn) = create_test_db();
        let mut user = User::new("jane@example.com");
        user.insert(&conn).unwrap();

        let found = User::find_by_key(&conn, "jane@example.com").unwrap().unwrap();
        assert_eq!(found.key, "jane@example.com");
        assert_eq!(found.id, user.id);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (_temp, conn) = create_test_db();
        User::new("jane@example.com").insert(&conn).unwrap();
        let result = User::new("jane@example.com").insert(&conn);
        assert!(result.is_err());
    }

    #[test]
    fn test_find_by_id_missing_returns_none() {
        let (_temp, conn) = create_test_db();
        assert!(User::find_by_id(&conn, 999).unwrap().is_none());
    }
}
