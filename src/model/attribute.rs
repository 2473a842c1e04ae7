// src/model/attribute.rs

use crate::audit;
use crate::error::{Error, Result};
use crate::metadata::{CurrentUser, Metadata};
use crate::model::category;
use crate::model::choice;
use crate::model::choice::Choice;
use crate::types::{AttrType, IS_COLLECTION_DEFAULT, IS_REQUIRED_DEFAULT};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

/// A typed slot inside a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub meta: Metadata,
    pub schema_id: Option<i64>,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub attr_type: AttrType,
    pub is_collection: Option<bool>,
    pub is_required: Option<bool>,
    pub is_private: bool,
    pub object_schema_id: Option<i64>,
    /// Owning `section`-typed attribute, for attributes nested under a
    /// section. `None` for top-level attributes.
    pub section_id: Option<i64>,
    /// Bound compared against `comparable_magnitude` -- string/choice length,
    /// the numeric value itself for integer/decimal/number, 0/1 for boolean,
    /// and UNIX epoch seconds for date/datetime. Stored as `REAL` rather than
    /// truncated to an integer so decimal bounds are not rounded away.
    pub value_min: Option<Decimal>,
    pub value_max: Option<Decimal>,
    pub collection_min: Option<i64>,
    pub collection_max: Option<i64>,
    pub validator: Option<String>,
    pub order: i64,
    pub checksum: Option<String>,
    pub choices: Vec<Choice>,
    pub revision: i64,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attr_type: AttrType, order: i64) -> Self {
        Self {
            meta: Metadata::new(),
            schema_id: None,
            name: name.into(),
            title: None,
            description: None,
            attr_type,
            is_collection: None,
            is_required: None,
            is_private: false,
            object_schema_id: None,
            section_id: None,
            value_min: None,
            value_max: None,
            collection_min: None,
            collection_max: None,
            validator: None,
            order,
            checksum: None,
            choices: Vec::new(),
            revision: 1,
        }
    }

    /// Content-addressed fingerprint of this attribute, per the checksum
    /// algorithm in the schema graph design notes: whitespace-normalized
    /// newline join of schema name, attribute name/title/description/type,
    /// is_collection/is_required (substituting documented defaults when
    /// unset), and each choice's `(order, title, value)` in declared order.
    /// `object_schema_id` and the owning schema's `description` are
    /// deliberately excluded.
    pub fn compute_checksum(&self, schema_name: &str) -> String {
        let mut parts: Vec<String> = vec![
            normalize(schema_name),
            normalize(&self.name),
            normalize(self.title.as_deref().unwrap_or("")),
            normalize(self.description.as_deref().unwrap_or("")),
            normalize(self.attr_type.as_str()),
            normalize(&bool_str(self.is_collection.unwrap_or(IS_COLLECTION_DEFAULT))),
            normalize(&bool_str(self.is_required.unwrap_or(IS_REQUIRED_DEFAULT))),
        ];
        for choice in &self.choices {
            parts.push(normalize(&format!(
                "{}|{}|{}",
                choice.order,
                choice.title.as_deref().unwrap_or(""),
                choice.value
            )));
        }

        let joined = parts.join("\n");
        let mut hasher = Md5::new();
        hasher.update(joined.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn refresh_checksum(&mut self, schema_name: &str) {
        self.checksum = Some(self.compute_checksum(schema_name));
    }

    /// Recursive deep copy used when a schema is versioned: duplicates the
    /// attribute's scalar fields plus its choices, resetting ids and
    /// checksum (the caller re-stamps the checksum once it knows the new
    /// owning schema's name). `object_schema_id` is left for the caller to
    /// repoint at the deep-copied sub-schema, if any.
    pub fn deep_copy(&self) -> Attribute {
        Attribute {
            meta: Metadata::new(),
            schema_id: None,
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            attr_type: self.attr_type,
            is_collection: self.is_collection,
            is_required: self.is_required,
            is_private: self.is_private,
            object_schema_id: None,
            section_id: None,
            value_min: self.value_min,
            value_max: self.value_max,
            collection_min: self.collection_min,
            collection_max: self.collection_max,
            validator: self.validator.clone(),
            order: self.order,
            checksum: None,
            choices: self.choices.iter().map(Choice::shallow_copy).collect(),
            revision: 1,
        }
    }

    pub fn insert(&mut self, conn: &Connection, schema_id: i64, user: &dyn CurrentUser) -> Result<i64> {
        let schema_name: String = conn.query_row(
            "SELECT name FROM schema WHERE id = ?1",
            [schema_id],
            |r| r.get(0),
        )?;
        self.refresh_checksum(&schema_name);

        let user_id = category::resolve_user_id(conn, user)?;
        conn.execute(
            "INSERT INTO attribute (
                schema_id, name, title, description, type, is_collection, is_required,
                is_private, object_schema_id, section_id, value_min, value_max, collection_min,
                collection_max, validator, order_index, checksum, create_user_id, modify_user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
            params![
                schema_id,
                self.name,
                self.title,
                self.description,
                self.attr_type.as_str(),
                self.is_collection.unwrap_or(IS_COLLECTION_DEFAULT),
                self.is_required.unwrap_or(IS_REQUIRED_DEFAULT),
                self.is_private,
                self.object_schema_id,
                self.section_id,
                decimal_to_sql(self.value_min),
                decimal_to_sql(self.value_max),
                self.collection_min,
                self.collection_max,
                self.validator,
                self.order,
                self.checksum,
                user_id,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.meta.id = Some(id);
        self.schema_id = Some(schema_id);

        for choice in &mut self.choices {
            choice.insert(conn, id, user)?;
        }
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Attribute>> {
        let attr = conn
            .query_row("SELECT * FROM attribute WHERE id = ?1", [id], from_row)
            .optional()?;
        match attr {
            None => Ok(None),
            Some(mut a) => {
                a.choices = Choice::list_for_attribute(conn, id)?;
                Ok(Some(a))
            }
        }
    }

    pub fn list_for_schema(conn: &Connection, schema_id: i64) -> Result<Vec<Attribute>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM attribute WHERE schema_id = ?1 ORDER BY order_index",
        )?;
        let rows = stmt.query_map([schema_id], from_row)?;
        let mut attrs = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for attr in &mut attrs {
            let id = attr.meta.id.unwrap();
            attr.choices = Choice::list_for_attribute(conn, id)?;
        }
        Ok(attrs)
    }

    /// Verifies the stored checksum against a freshly recomputed one,
    /// raising `Error::CorruptAttribute` on mismatch -- invariant 4.
    pub fn verify_checksum(&self, schema_name: &str) -> Result<()> {
        let recomputed = self.compute_checksum(schema_name);
        match &self.checksum {
            Some(stored) if stored == &recomputed => Ok(()),
            Some(stored) => Err(Error::CorruptAttribute {
                attribute: self.name.clone(),
                stored: stored.clone(),
                recomputed,
            }),
            None => Err(Error::CorruptAttribute {
                attribute: self.name.clone(),
                stored: String::new(),
                recomputed,
            }),
        }
    }

    /// Deletes the attribute and, first, each of its choices via
    /// [`choice::delete_with_audit`] -- choice rows cascade on the attribute's
    /// FK regardless, but going through the audited path means their deletion
    /// leaves a `choice_audit` pre-image row instead of vanishing silently.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let before = Attribute::find_by_id(conn, id)?
            .ok_or_else(|| Error::NotFound(format!("attribute#{id}")))?;
        for choice in &before.choices {
            choice::delete_with_audit(conn, choice.meta.id.unwrap())?;
        }
        let cols = columns(&before);
        audit::record_change(conn, "attribute", id, before.revision, &cols, &cols, true)?;
        conn.execute("DELETE FROM attribute WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn bool_str(b: bool) -> String {
    if b { "true".to_string() } else { "false".to_string() }
}

fn decimal_to_sql(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|d| d.to_f64())
}

fn decimal_from_sql(f: Option<f64>) -> Option<Decimal> {
    f.and_then(Decimal::from_f64)
}

/// Collapses any run of Unicode whitespace to a single space and trims the
/// ends, matching `re.sub(r'\s+', ' ', x, flags=re.UNICODE).strip()`.
pub fn normalize(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn columns(a: &Attribute) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(a.name.clone())),
        ("title", a.title.clone().map(Value::Text).unwrap_or(Value::Null)),
        (
            "description",
            a.description.clone().map(Value::Text).unwrap_or(Value::Null),
        ),
        ("type", Value::Text(a.attr_type.as_str().to_string())),
        (
            "is_collection",
            Value::Integer(a.is_collection.unwrap_or(IS_COLLECTION_DEFAULT) as i64),
        ),
        (
            "is_required",
            Value::Integer(a.is_required.unwrap_or(IS_REQUIRED_DEFAULT) as i64),
        ),
        ("is_private", Value::Integer(a.is_private as i64)),
        (
            "object_schema_id",
            a.object_schema_id.map(Value::Integer).unwrap_or(Value::Null),
        ),
        ("section_id", a.section_id.map(Value::Integer).unwrap_or(Value::Null)),
        ("value_min", decimal_to_sql(a.value_min).map(Value::Real).unwrap_or(Value::Null)),
        ("value_max", decimal_to_sql(a.value_max).map(Value::Real).unwrap_or(Value::Null)),
        (
            "collection_min",
            a.collection_min.map(Value::Integer).unwrap_or(Value::Null),
        ),
        (
            "collection_max",
            a.collection_max.map(Value::Integer).unwrap_or(Value::Null),
        ),
        (
            "validator",
            a.validator.clone().map(Value::Text).unwrap_or(Value::Null),
        ),
        ("order_index", Value::Integer(a.order)),
        (
            "checksum",
            a.checksum.clone().map(Value::Text).unwrap_or(Value::Null),
        ),
    ]
}

fn from_row(row: &Row) -> rusqlite::Result<Attribute> {
    let type_str: String = row.get("type")?;
    Ok(Attribute {
        meta: Metadata {
            id: row.get("id")?,
            create_date: row.get::<_, Option<DateTime<Utc>>>("create_date")?,
            modify_date: row.get::<_, Option<DateTime<Utc>>>("modify_date")?,
            create_user: None,
            modify_user: None,
        },
        schema_id: row.get("schema_id")?,
        name: row.get("name")?,
        title: row.get("title")?,
        description: row.get("description")?,
        attr_type: AttrType::from_str(&type_str).unwrap_or(AttrType::String),
        is_collection: row.get("is_collection")?,
        is_required: row.get("is_required")?,
        is_private: row.get("is_private")?,
        object_schema_id: row.get("object_schema_id")?,
        section_id: row.get("section_id")?,
        value_min: decimal_from_sql(row.get("value_min")?),
        value_max: decimal_from_sql(row.get("value_max")?),
        collection_min: row.get("collection_min")?,
        collection_max: row.get("collection_max")?,
        validator: row.get("validator")?,
        order: row.get("order_index")?,
        checksum: row.get("checksum")?,
        choices: Vec::new(),
        revision: row.get("revision")?,
    })
}
