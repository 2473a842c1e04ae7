// src/model/schema.rs

use crate::error::{Error, Result};
use crate::metadata::{CurrentUser, Metadata};
use crate::model::attribute::Attribute;
use crate::model::category;
use crate::types::{SchemaState, Storage};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

/// A versioned form definition: an ordered tree of attributes plus the
/// publication lifecycle that governs when a draft becomes an immutable,
/// entity-bindable version.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub meta: Metadata,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub state: SchemaState,
    pub storage: Storage,
    pub publish_date: Option<NaiveDate>,
    pub is_association: bool,
    pub is_inline: bool,
    pub base_schema_id: Option<i64>,
    pub attributes: Vec<Attribute>,
    pub revision: i64,
}

impl Schema {
    pub fn new(name: impl Into<String>, state: SchemaState, storage: Storage) -> Self {
        Self {
            meta: Metadata::new(),
            name: name.into(),
            title: None,
            description: None,
            state,
            storage,
            publish_date: None,
            is_association: false,
            is_inline: false,
            base_schema_id: None,
            attributes: Vec::new(),
            revision: 1,
        }
    }

    /// Produces a new draft with the same `name`/`title`/`description`/
    /// `storage`/`is_inline`, a freshly deep-copied attribute tree, no
    /// `publish_date`, and `state = draft`. This is how a new version is
    /// authored without mutating the live one.
    pub fn deep_copy(&self) -> Schema {
        Schema {
            meta: Metadata::new(),
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            state: SchemaState::Draft,
            storage: self.storage,
            publish_date: None,
            is_association: self.is_association,
            is_inline: self.is_inline,
            base_schema_id: None,
            attributes: self.attributes.iter().map(Attribute::deep_copy).collect(),
            revision: 1,
        }
    }

    /// Transitions to `next`, validating against the allowed state machine
    /// and auto-assigning `publish_date = today` on entering `published`
    /// when not already set.
    pub fn transition(&mut self, next: SchemaState, today: NaiveDate) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::constraint(
                self.name.clone(),
                "state",
                format!("cannot transition from {} to {}", self.state, next),
            ));
        }
        if next.requires_publish_date() && self.publish_date.is_none() {
            self.publish_date = Some(today);
        }
        if !next.requires_publish_date() {
            self.publish_date = None;
        }
        self.state = next;
        Ok(())
    }

    pub fn insert(&mut self, conn: &Connection, user: &dyn CurrentUser) -> Result<i64> {
        let user_id = category::resolve_user_id(conn, user)?;
        conn.execute(
            "INSERT INTO schema (
                name, title, description, state, storage, publish_date,
                is_association, is_inline, base_schema_id, create_user_id, modify_user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                self.name,
                self.title,
                self.description,
                self.state.as_str(),
                self.storage.as_str(),
                self.publish_date,
                self.is_association,
                self.is_inline,
                self.base_schema_id,
                user_id,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.meta.id = Some(id);

        for attr in &mut self.attributes {
            attr.insert(conn, id, user)?;
        }
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Schema>> {
        let schema = conn
            .query_row("SELECT * FROM schema WHERE id = ?1", [id], from_row)
            .optional()?;
        match schema {
            None => Ok(None),
            Some(mut s) => {
                s.attributes = Attribute::list_for_schema(conn, id)?;
                Ok(Some(s))
            }
        }
    }

    /// All versions (of every state) sharing `name`, ordered by
    /// `publish_date` (drafts, which are null, sort first).
    pub fn list_versions(conn: &Connection, name: &str) -> Result<Vec<Schema>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM schema WHERE name = ?1 ORDER BY publish_date IS NULL DESC, publish_date",
        )?;
        let rows = stmt.query_map([name], from_row)?;
        let mut schemas = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for schema in &mut schemas {
            let id = schema.meta.id.unwrap();
            schema.attributes = Attribute::list_for_schema(conn, id)?;
        }
        Ok(schemas)
    }

    /// The published, non-retracted version of `name` in effect `on` a given
    /// date (or the latest published version when `on` is `None`).
    pub fn get_on(conn: &Connection, name: &str, on: Option<NaiveDate>) -> Result<Option<Schema>> {
        let row = match on {
            Some(date) => conn
                .query_row(
                    "SELECT * FROM schema WHERE name = ?1 AND state = 'published'
                     AND publish_date <= ?2 ORDER BY publish_date DESC LIMIT 1",
                    params![name, date],
                    from_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT * FROM schema WHERE name = ?1 AND state = 'published'
                     ORDER BY publish_date DESC LIMIT 1",
                    params![name],
                    from_row,
                )
                .optional()?,
        };
        match row {
            None => Ok(None),
            Some(mut s) => {
                let id = s.meta.id.unwrap();
                s.attributes = Attribute::list_for_schema(conn, id)?;
                Ok(Some(s))
            }
        }
    }

    /// Persists a `transition()` already applied in memory, writing a
    /// `schema_audit` pre-image of `state`/`publish_date` if either changed.
    /// A write that would produce an audit row requires a resolvable current
    /// user; an unbound user fails with `Error::NonExistentUser` before
    /// either the live row or the audit row is touched.
    pub fn update_state(&mut self, conn: &Connection, user: &dyn CurrentUser) -> Result<()> {
        let id = self.meta.id.ok_or_else(|| Error::MissingKey("schema id".into()))?;
        let before = Schema::find_by_id(conn, id)?.ok_or_else(|| Error::NotFound(format!("schema#{id}")))?;
        let old_columns = state_columns(&before);
        let new_columns = state_columns(self);
        let will_audit = !crate::audit::diff_columns(&old_columns, &new_columns).is_empty();

        let user_id = if will_audit {
            Some(category::require_user_id(conn, user)?)
        } else {
            category::resolve_user_id(conn, user)?
        };
        conn.execute(
            "UPDATE schema SET state = ?1, publish_date = ?2, modify_user_id = ?3,
             modify_date = CURRENT_TIMESTAMP WHERE id = ?4",
            params![self.state.as_str(), self.publish_date, user_id, id],
        )?;

        if let Some(rev) = crate::audit::record_change(
            conn,
            "schema",
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
        conn.execute("DELETE FROM schema WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn state_columns(s: &Schema) -> Vec<(&'static str, rusqlite::types::Value)> {
    use rusqlite::types::Value;
    vec![
        ("name", Value::Text(s.name.clone())),
        ("title", s.title.clone().map(Value::Text).unwrap_or(Value::Null)),
        ("description", s.description.clone().map(Value::Text).unwrap_or(Value::Null)),
        ("state", Value::Text(s.state.as_str().to_string())),
        ("storage", Value::Text(s.storage.as_str().to_string())),
        ("publish_date", s.publish_date.map(|d| Value::Text(d.to_string())).unwrap_or(Value::Null)),
        ("is_association", Value::Integer(s.is_association as i64)),
        ("is_inline", Value::Integer(s.is_inline as i64)),
        ("base_schema_id", s.base_schema_id.map(Value::Integer).unwrap_or(Value::Null)),
    ]
}

fn from_row(row: &Row) -> rusqlite::Result<Schema> {
    let state_str: String = row.get("state")?;
    let storage_str: String = row.get("storage")?;
    Ok(Schema {
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
        state: SchemaState::from_str(&state_str).unwrap_or(SchemaState::Draft),
        storage: Storage::from_str(&storage_str).unwrap_or(Storage::Eav),
        publish_date: row.get("publish_date")?,
        is_association: row.get("is_association")?,
        is_inline: row.get("is_inline")?,
        base_schema_id: row.get("base_schema_id")?,
        attributes: Vec::new(),
        revision: row.get("revision")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::metadata::{NoUser, StaticUser};
    use crate::types::AttrType;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        db::schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_transition_draft_to_published_sets_publish_date() {
        let mut schema = Schema::new("A", SchemaState::Draft, Storage::Eav);
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        schema.transition(SchemaState::Published, today).unwrap();
        assert_eq!(schema.state, SchemaState::Published);
        assert_eq!(schema.publish_date, Some(today));
    }

    #[test]
    fn test_transition_rejects_invalid_edge() {
        let mut schema = Schema::new("A", SchemaState::Published, Storage::Eav);
        schema.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let result = schema.transition(SchemaState::Draft, NaiveDate::from_ymd_opt(2026, 7, 28).unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_retracted_requires_publish_date_already_set() {
        let mut schema = Schema::new("A", SchemaState::Published, Storage::Eav);
        schema.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        schema.transition(SchemaState::Retracted, NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()).unwrap();
        assert_eq!(schema.publish_date, Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }

    #[test]
    fn test_deep_copy_round_trip() {
        let mut schema = Schema::new("A", SchemaState::Published, Storage::Eav);
        schema.title = Some("Form A".into());
        schema.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        schema.attributes.push(Attribute::new("name", AttrType::String, 0));
        schema.meta.id = Some(7);

        let copy = schema.deep_copy();
        assert_eq!(copy.name, schema.name);
        assert_eq!(copy.title, schema.title);
        assert_eq!(copy.state, SchemaState::Draft);
        assert_eq!(copy.publish_date, None);
        assert_eq!(copy.meta.id, None);
        assert_eq!(copy.attributes.len(), 1);
        assert_eq!(copy.attributes[0].name, "name");
    }

    #[test]
    fn test_insert_and_second_publication_requires_distinct_date() {
        let (_temp, conn) = create_test_db();

        let mut v1 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v1.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        v1.insert(&conn, &NoUser).unwrap();

        let mut v2 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v2.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let result = v2.insert(&conn, &NoUser);
        assert!(result.is_err());

        let mut v3 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v3.publish_date = Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert!(v3.insert(&conn, &NoUser).is_ok());
    }

    #[test]
    fn test_two_drafts_coexist() {
        let (_temp, conn) = create_test_db();
        Schema::new("A", SchemaState::Draft, Storage::Eav).insert(&conn, &NoUser).unwrap();
        let result = Schema::new("A", SchemaState::Draft, Storage::Eav).insert(&conn, &NoUser);
        assert!(result.is_ok());
    }

    #[test]
    fn test_get_on_resolves_as_of_date() {
        let (_temp, conn) = create_test_db();
        let mut v1 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v1.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        v1.insert(&conn, &NoUser).unwrap();

        let mut v2 = Schema::new("A", SchemaState::Published, Storage::Eav);
        v2.publish_date = Some(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        v2.insert(&conn, &NoUser).unwrap();

        let resolved = Schema::get_on(&conn, "A", Some(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.publish_date, Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));

        let latest = Schema::get_on(&conn, "A", None).unwrap().unwrap();
        assert_eq!(latest.publish_date, Some(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()));
    }

    #[test]
    fn test_update_state_writes_audit_row_with_resolvable_user() {
        let (_temp, conn) = create_test_db();
        let mut editor = crate::model::user::User::new("jane@example.com");
        editor.insert(&conn).unwrap();

        let mut schema = Schema::new("A", SchemaState::Draft, Storage::Eav);
        schema.insert(&conn, &NoUser).unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        schema.transition(SchemaState::Published, today).unwrap();
        schema.update_state(&conn, &StaticUser::new("jane@example.com")).unwrap();
        assert_eq!(schema.revision, 2);

        let audit_state: String = conn
            .query_row(
                "SELECT state FROM schema_audit WHERE id = ?1 AND revision = 1",
                [schema.meta.id.unwrap()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(audit_state, "draft");
    }

    #[test]
    fn test_update_state_with_unbound_user_fails_when_change_would_be_audited() {
        let (_temp, conn) = create_test_db();
        let mut schema = Schema::new("A", SchemaState::Draft, Storage::Eav);
        schema.insert(&conn, &NoUser).unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        schema.transition(SchemaState::Published, today).unwrap();
        let result = schema.update_state(&conn, &NoUser);
        assert!(matches!(result, Err(Error::NonExistentUser)));

        let reloaded = Schema::find_by_id(&conn, schema.meta.id.unwrap()).unwrap().unwrap();
        assert_eq!(reloaded.state, SchemaState::Draft, "live row must not be mutated");
        assert_eq!(reloaded.revision, 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_audit", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
