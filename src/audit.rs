// src/audit.rs

//! Generic audit engine.
//!
//! Adapted from `createRevision` in the original's SQLAlchemy-session-hook
//! form into an explicit call site: there is no ORM unit-of-work to install
//! a `before_flush` listener on, so each model's `update`/`delete` method
//! calls [`record_change`] itself with the pre-image it already has in hand.

use crate::error::{Error, Result};
use rusqlite::types::Value;
use rusqlite::Connection;

/// One column's value, named, for building a dynamic `INSERT` into a shadow
/// table. Using `rusqlite::types::Value` lets every per-type model share one
/// diffing and audit-row-writing routine instead of one per struct.
pub type Column<'a> = (&'a str, Value);

/// Compares two column snapshots of the same row and returns the subset that
/// changed (by name, holding the *old* value -- the audit row is always a
/// pre-image). Mirrors the original's three-way history (added/unchanged/
/// deleted) collapsed to "did this column's value change".
pub fn diff_columns<'a>(old: &'a [Column<'a>], new: &'a [Column<'a>]) -> Vec<Column<'a>> {
    old.iter()
        .zip(new.iter())
        .filter(|((_, ov), (_, nv))| ov != nv)
        .map(|((name, ov), _)| (*name, ov.clone()))
        .collect()
}

/// Writes a pre-image audit row and bumps the live row's revision, inside
/// the caller's transaction. No-ops (and leaves `revision` untouched) when
/// `old` and `new` report no column differences and `is_delete` is false --
/// this is invariant 5 from the testable properties.
///
/// `all_columns` must be the *full* column set of the live row (not just the
/// changed ones): the shadow row always carries the complete pre-image, with
/// changed columns taking the old value and unchanged columns taking the
/// current (= old, since it didn't change) value.
pub fn record_change(
    conn: &Connection,
    table: &str,
    id: i64,
    current_revision: i64,
    all_columns: &[Column<'_>],
    old_columns: &[Column<'_>],
    is_delete: bool,
) -> Result<Option<i64>> {
    let changed = diff_columns(old_columns, all_columns);
    if changed.is_empty() && !is_delete {
        return Ok(None);
    }

    let mut names: Vec<&str> = vec!["id", "revision"];
    let mut values: Vec<Value> = vec![Value::Integer(id), Value::Integer(current_revision)];
    for (name, value) in all_columns {
        names.push(name);
        values.push(value.clone());
    }

    let placeholders = (1..=values.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let column_list = names.join(", ");
    let sql = format!(
        "INSERT INTO {table}_audit ({column_list}) VALUES ({placeholders})",
        table = table,
    );

    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    conn.execute(&sql, params.as_slice())?;

    if !is_delete {
        let updated = conn.execute(
            &format!("UPDATE {table} SET revision = revision + 1 WHERE id = ?1"),
            [id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("{table}#{id}")));
        }
    }

    Ok(Some(current_revision + 1))
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
    fn test_diff_columns_detects_changes() {
        let old: Vec<Column> = vec![("value", Value::Text("x".into()))];
        let new: Vec<Column> = vec![("value", Value::Text("y".into()))];
        let diff = diff_columns(&old, &new);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].1, Value::Text("x".into()));
    }

    #[test]
    fn test_diff_columns_no_change() {
        let old: Vec<Column> = vec![("value", Value::Text("x".into()))];
        let new: Vec<Column> = vec![("value", Value::Text("x".into()))];
        assert!(diff_columns(&old, &new).is_empty());
    }

    #[test]
    fn test_record_change_writes_audit_row_and_bumps_revision() {
        let (_temp, conn) = create_test_db();

        conn.execute(
            "INSERT INTO category (name, title) VALUES ('demographics', 'Demographics')",
            [],
        )
        .unwrap();

        let old_columns: Vec<Column> = vec![
            ("name", Value::Text("demographics".into())),
            ("title", Value::Text("Demographics".into())),
        ];
        let new_columns: Vec<Column> = vec![
            ("name", Value::Text("demographics".into())),
            ("title", Value::Text("Demo".into())),
        ];

        conn.execute("UPDATE category SET title = 'Demo' WHERE id = 1", [])
            .unwrap();

        let result = record_change(&conn, "category", 1, 1, &new_columns, &old_columns, false)
            .unwrap();
        assert_eq!(result, Some(2));

        let revision: i64 = conn
            .query_row("SELECT revision FROM category WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(revision, 2);

        let audit_title: String = conn
            .query_row(
                "SELECT title FROM category_audit WHERE id = 1 AND revision = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(audit_title, "Demographics");
    }

    #[test]
    fn test_record_change_noop_when_unchanged() {
        let (_temp, conn) = create_test_db();

        conn.execute(
            "INSERT INTO category (name, title) VALUES ('demographics', 'Demographics')",
            [],
        )
        .unwrap();

        let columns: Vec<Column> = vec![
            ("name", Value::Text("demographics".into())),
            ("title", Value::Text("Demographics".into())),
        ];

        let result = record_change(&conn, "category", 1, 1, &columns, &columns, false).unwrap();
        assert_eq!(result, None);

        let revision: i64 = conn
            .query_row("SELECT revision FROM category WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(revision, 1);
    }
}
