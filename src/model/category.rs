// src/model/category.rs

use crate::audit;
use crate::error::{Error, Result};
use crate::metadata::{CurrentUser, Metadata};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A free-form tag attached to schemata via `schema_category`.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub meta: Metadata,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub revision: i64,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: Metadata::new(),
            name: name.into(),
            title: None,
            description: None,
            revision: 1,
        }
    }

    pub fn insert(&mut self, conn: &Connection, user: &dyn CurrentUser) -> Result<i64> {
        let user_id = resolve_user_id(conn, user)?;
        conn.execute(
            "INSERT INTO category (name, title, description, create_user_id, modify_user_id)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![self.name, self.title, self.description, user_id],
        )?;
        let id = conn.last_insert_rowid();
        self.meta.id = Some(id);
        self.revision = 1;
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Category>> {
        conn.query_row("SELECT * FROM category WHERE id = ?1", [id], from_row)
            .optional()
            .map_err(Error::from)
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
        conn.query_row("SELECT * FROM category WHERE name = ?1", [name], from_row)
            .optional()
            .map_err(Error::from)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Category>> {
        let mut stmt = conn.prepare("SELECT * FROM category ORDER BY name")?;
        let rows = stmt.query_map([], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Updates title/description, writing a `category_audit` pre-image row
    /// only if a column actually changed. A write that would produce an
    /// audit row requires a resolvable current user; an unbound user
    /// (`CurrentUser::current() == None`) fails with
    /// `Error::NonExistentUser` before either the live row or the audit row
    /// is touched.
    pub fn update(&mut self, conn: &Connection, user: &dyn CurrentUser) -> Result<()> {
        let id = self.meta.id.ok_or_else(|| Error::MissingKey("category id".into()))?;
        let before = Category::find_by_id(conn, id)?
            .ok_or_else(|| Error::NotFound(format!("category#{id}")))?;

        let old_columns = category_columns(&before);
        let new_columns = category_columns(self);
        let will_audit = !audit::diff_columns(&old_columns, &new_columns).is_empty();

        let user_id = if will_audit {
            Some(require_user_id(conn, user)?)
        } else {
            resolve_user_id(conn, user)?
        };
        conn.execute(
            "UPDATE category SET title = ?1, description = ?2, modify_user_id = ?3,
             modify_date = CURRENT_TIMESTAMP WHERE id = ?4",
            params![self.title, self.description, user_id, id],
        )?;

        if let Some(rev) = audit::record_change(
            conn,
            "category",
            id,
            before.revision,
            &new_columns,
            &old_columns,
            false,
        )? {
            self.revision = rev;
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let before = Category::find_by_id(conn, id)?
            .ok_or_else(|| Error::NotFound(format!("category#{id}")))?;
        let columns = category_columns(&before);
        audit::record_change(conn, "category", id, before.revision, &columns, &columns, true)?;
        conn.execute("DELETE FROM category WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn category_columns(c: &Category) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(c.name.clone())),
        (
            "title",
            c.title.clone().map(Value::Text).unwrap_or(Value::Null),
        ),
        (
            "description",
            c.description.clone().map(Value::Text).unwrap_or(Value::Null),
        ),
    ]
}

pub(crate) fn resolve_user_id(conn: &Connection, user: &dyn CurrentUser) -> Result<Option<i64>> {
    match user.current() {
        None => Ok(None),
        Some(key) => super::user::User::find_by_key(conn, key)?
            .and_then(|u| u.id)
            .map(Some)
            .ok_or_else(|| Error::NonExistentUser),
    }
}

/// Like [`resolve_user_id`], but an unbound user is itself an error rather
/// than `Ok(None)`. Call sites that are about to write an audit row must use
/// this: per spec, attempting an audited write with no current user bound
/// fails with `Error::NonExistentUser` rather than silently stamping the
/// audit row with no user.
pub(crate) fn require_user_id(conn: &Connection, user: &dyn CurrentUser) -> Result<i64> {
    resolve_user_id(conn, user)?.ok_or(Error::NonExistentUser)
}

fn from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        meta: Metadata {
            id: row.get("id")?,
            create_date: row.get::<_, Option<DateTime<Utc>>>("create_date")?,
            modify_date: row.get::<_, Option<DateTime<Utc>>>("modify_date")?,
            create_user: None,
            modify_user: None,
        },
        name: row.get("name")?,
        title: row.get("title")?,
        description: row.get("description")?,
        revision: row.get("revision")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::metadata::{NoUser, StaticUser};
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        db::schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_insert_and_find() {
        let (_temp, conn) = create_test_db();
        let mut cat = Category::new("demographics");
        cat.title = Some("Demographics".into());
        cat.insert(&conn, &NoUser).unwrap();

        let found = Category::find_by_name(&conn, "demographics").unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("Demographics"));
        assert_eq!(found.revision, 1);
    }

    #[test]
    fn test_update_writes_audit_row_and_bumps_revision() {
        let (_temp, conn) = create_test_db();
        let mut editor = crate::model::user::User::new("jane@example.com");
        editor.insert(&conn).unwrap();

        let mut cat = Category::new("demographics");
        cat.title = Some("Demographics".into());
        cat.insert(&conn, &NoUser).unwrap();

        cat.title = Some("Demo".into());
        cat.update(&conn, &StaticUser::new("jane@example.com")).unwrap();
        assert_eq!(cat.revision, 2);

        let audit_title: String = conn
            .query_row(
                "SELECT title FROM category_audit WHERE id = ?1 AND revision = 1",
                [cat.meta.id.unwrap()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(audit_title, "Demographics");
    }

    #[test]
    fn test_update_with_unbound_user_fails_when_change_would_be_audited() {
        let (_temp, conn) = create_test_db();
        let mut cat = Category::new("demographics");
        cat.title = Some("Demographics".into());
        cat.insert(&conn, &NoUser).unwrap();

        cat.title = Some("Demo".into());
        let result = cat.update(&conn, &NoUser);
        assert!(matches!(result, Err(Error::NonExistentUser)));

        // Neither the live row nor an audit row was written.
        let reloaded = Category::find_by_id(&conn, cat.meta.id.unwrap()).unwrap().unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("Demographics"));
        assert_eq!(reloaded.revision, 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM category_audit", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_update_noop_does_not_write_audit_row() {
        let (_temp, conn) = create_test_db();
        let mut cat = Category::new("demographics");
        cat.insert(&conn, &NoUser).unwrap();

        cat.update(&conn, &NoUser).unwrap();
        assert_eq!(cat.revision, 1);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM category_audit", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_update_with_unbound_user_fails() {
        let (_temp, conn) = create_test_db();
        let mut cat = Category::new("demographics");
        cat.insert(&conn, &NoUser).unwrap();

        cat.title = Some("Demo".into());
        let result = cat.update(&conn, &StaticUser::new("ghost@example.com"));
        assert!(matches!(result, Err(Error::NonExistentUser)));
    }
}
