// src/manager.rs

//! Narrow key-addressed CRUD interfaces over the schema graph and the
//! as-of-date resolution logic layered on top of them.

use crate::error::{Error, Result};
use crate::metadata::CurrentUser;
use crate::model::schema::Schema;
use chrono::NaiveDate;
use rusqlite::Connection;

/// A narrow interface over a session: list keys, check/get/put/purge a
/// single item. Implementors own what "key" and "item" mean.
pub trait Manager<T> {
    fn keys(&self, conn: &Connection) -> Result<Vec<String>>;
    fn has(&self, conn: &Connection, key: &str) -> Result<bool>;
    fn get(&self, conn: &Connection, key: &str) -> Result<T>;
    fn put(&self, conn: &Connection, item: T, user: &dyn CurrentUser) -> Result<i64>;
    fn purge(&self, conn: &Connection, key: &str) -> Result<usize>;
}

/// Manages schema *names*, each of which may have many versions. `get`
/// resolves the latest published version; `get_on` resolves the version in
/// effect as of a given date.
pub struct SchemaManager;

impl SchemaManager {
    /// The version of `name` whose `publish_date` is the latest with
    /// `publish_date <= on` and `state = published`; when `on` is `None`,
    /// the latest published version regardless of date.
    pub fn get_on(&self, conn: &Connection, name: &str, on: Option<NaiveDate>) -> Result<Option<Schema>> {
        Schema::get_on(conn, name, on)
    }
}

impl Manager<Schema> for SchemaManager {
    fn keys(&self, conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT DISTINCT name FROM schema ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    fn has(&self, conn: &Connection, name: &str) -> Result<bool> {
        Ok(self.get_on(conn, name, None)?.is_some())
    }

    /// Latest published, non-retracted version of `name`.
    fn get(&self, conn: &Connection, name: &str) -> Result<Schema> {
        self.get_on(conn, name, None)?
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// A draft of an existing name is allowed; a second row with the same
    /// `(name, publish_date)` is rejected by the database's unique index.
    fn put(&self, conn: &Connection, mut item: Schema, user: &dyn CurrentUser) -> Result<i64> {
        item.insert(conn, user)
    }

    fn purge(&self, conn: &Connection, name: &str) -> Result<usize> {
        let versions = Schema::list_versions(conn, name)?;
        if versions.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }
        let mut removed = 0;
        for version in versions {
            Schema::delete(conn, version.meta.id.unwrap())?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Walks the `object_schema` sub-form graph from a resolved schema version.
pub struct Hierarchy;

impl Hierarchy {
    /// Direct child schemata reachable from `object`-typed attributes of the
    /// version of `name` selected by `(name, on)`. Does not descend into
    /// `section` attributes (those are part of the same schema, not a
    /// sub-form) nor recurse past the first level.
    pub fn children(conn: &Connection, name: &str, on: Option<NaiveDate>) -> Result<Vec<Schema>> {
        let manager = SchemaManager;
        let schema = manager
            .get_on(conn, name, on)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let mut out = Vec::new();
        for attr in &schema.attributes {
            if let Some(object_schema_id) = attr.object_schema_id {
                if let Some(child) = Schema::find_by_id(conn, object_schema_id)? {
                    out.push(child);
                }
            }
        }
        Ok(out)
    }

    pub fn children_names(conn: &Connection, name: &str, on: Option<NaiveDate>) -> Result<Vec<String>> {
        Ok(Self::children(conn, name, on)?.into_iter().map(|s| s.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::metadata::NoUser;
    use crate::model::attribute::Attribute;
    use crate::types::{AttrType, SchemaState, Storage};
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        db::schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_schema_manager_get_missing_raises_not_found() {
        let (_temp, conn) = create_test_db();
        let manager = SchemaManager;
        let result = manager.get(&conn, "Missing");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_schema_manager_purge_removes_all_versions() {
        let (_temp, conn) = create_test_db();
        let manager = SchemaManager;

        let mut v1 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v1.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        manager.put(&conn, v1, &NoUser).unwrap();

        let mut v2 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v2.publish_date = Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        manager.put(&conn, v2, &NoUser).unwrap();

        let removed = manager.purge(&conn, "A").unwrap();
        assert_eq!(removed, 2);
        assert!(!manager.has(&conn, "A").unwrap());
    }

    #[test]
    fn test_hierarchy_children_resolves_object_attributes() {
        let (_temp, conn) = create_test_db();
        let manager = SchemaManager;

        let mut child = Schema::new("Address", SchemaState::Published, Storage::Eav);
        child.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let child_id = manager.put(&conn, child, &NoUser).unwrap();

        let mut parent = Schema::new("Person", SchemaState::Published, Storage::Eav);
        parent.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let mut object_attr = Attribute::new("address", AttrType::Object, 0);
        object_attr.object_schema_id = Some(child_id);
        parent.attributes.push(object_attr);
        manager.put(&conn, parent, &NoUser).unwrap();

        let children = Hierarchy::children_names(&conn, "Person", None).unwrap();
        assert_eq!(children, vec!["Address".to_string()]);
    }
}
