// src/model/choice.rs

use crate::audit;
use crate::error::{Error, Result};
use crate::metadata::{CurrentUser, Metadata};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A constrained option under an Attribute. Not independently versioned --
/// changing a choice requires re-publishing the owning schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub meta: Metadata,
    pub attribute_id: Option<i64>,
    pub name: String,
    pub title: Option<String>,
    pub value: String,
    pub order: i64,
    pub revision: i64,
}

impl Choice {
    pub fn new(name: impl Into<String>, value: impl Into<String>, order: i64) -> Self {
        Self {
            meta: Metadata::new(),
            attribute_id: None,
            name: name.into(),
            title: None,
            value: value.into(),
            order,
            revision: 1,
        }
    }

    /// Shallow field copy for use from `Attribute::deep_copy` -- per the
    /// spec, choice deep-copy is just a field copy, not recursive (choices
    /// have no children of their own).
    pub fn shallow_copy(&self) -> Choice {
        Choice {
            meta: Metadata::new(),
            attribute_id: None,
            name: self.name.clone(),
            title: self.title.clone(),
            value: self.value.clone(),
            order: self.order,
            revision: 1,
        }
    }

    pub fn insert(&mut self, conn: &Connection, attribute_id: i64, user: &dyn CurrentUser) -> Result<i64> {
        let user_id = super::category::resolve_user_id(conn, user)?;
        conn.execute(
            "INSERT INTO choice (attribute_id, name, title, value, order_index, create_user_id, modify_user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![attribute_id, self.name, self.title, self.value, self.order, user_id],
        )?;
        let id = conn.last_insert_rowid();
        self.meta.id = Some(id);
        self.attribute_id = Some(attribute_id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Choice>> {
        conn.query_row("SELECT * FROM choice WHERE id = ?1", [id], from_row)
            .optional()
            .map_err(Error::from)
    }

    pub fn list_for_attribute(conn: &Connection, attribute_id: i64) -> Result<Vec<Choice>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM choice WHERE attribute_id = ?1 ORDER BY order_index",
        )?;
        let rows = stmt.query_map([attribute_id], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }
}

pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Choice> {
    Ok(Choice {
        meta: Metadata {
            id: row.get("id")?,
            create_date: row.get::<_, Option<DateTime<Utc>>>("create_date")?,
            modify_date: row.get::<_, Option<DateTime<Utc>>>("modify_date")?,
            create_user: None,
            modify_user: None,
        },
        attribute_id: row.get("attribute_id")?,
        name: row.get("name")?,
        title: row.get("title")?,
        value: row.get("value")?,
        order: row.get("order_index")?,
        revision: row.get("revision")?,
    })
}

pub(crate) fn columns(c: &Choice) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(c.name.clone())),
        ("title", c.title.clone().map(Value::Text).unwrap_or(Value::Null)),
        ("value", Value::Text(c.value.clone())),
        ("order_index", Value::Integer(c.order)),
    ]
}

/// Deletes a choice, writing a `choice_audit` pre-image row first. Used from
/// `Attribute::delete` so a choice's removal is audited even though it would
/// otherwise cascade silently via the attribute's FK.
pub(crate) fn delete_with_audit(conn: &Connection, id: i64) -> Result<()> {
    let before = Choice::find_by_id(conn, id)?.ok_or_else(|| Error::NotFound(format!("choice#{id}")))?;
    let cols = columns(&before);
    audit::record_change(conn, "choice", id, before.revision, &cols, &cols, true)?;
    conn.execute("DELETE FROM choice WHERE id = ?1", [id])?;
    Ok(())
}
