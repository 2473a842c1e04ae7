// src/model/entity.rs

use crate::error::{Error, Result};
use crate::metadata::{CurrentUser, Metadata};
use crate::model::attribute::Attribute;
use crate::model::category;
use crate::model::schema::Schema;
use crate::types::{AttrType, EntityState, SchemaState, TypedValue};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

/// An instance of a published Schema, accessed through a keyed get/set/
/// delete façade resolved against its bound schema's attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub meta: Metadata,
    pub schema_id: Option<i64>,
    pub name: String,
    pub state: EntityState,
    pub collect_date: Option<NaiveDate>,
    pub revision: i64,
}

impl Entity {
    pub fn new(name: impl Into<String>, state: EntityState) -> Self {
        Self {
            meta: Metadata::new(),
            schema_id: None,
            name: name.into(),
            state,
            collect_date: None,
            revision: 1,
        }
    }

    /// Creates the entity row. Fails with `Error::InvalidEntitySchema` unless
    /// the target schema's `state = published` -- the publication gate.
    pub fn insert(&mut self, conn: &Connection, schema_id: i64, user: &dyn CurrentUser) -> Result<i64> {
        let schema = Schema::find_by_id(conn, schema_id)?
            .ok_or_else(|| Error::NotFound(format!("schema#{schema_id}")))?;
        if schema.state != SchemaState::Published {
            return Err(Error::InvalidEntitySchema(schema.name, schema.state.to_string()));
        }

        let user_id = category::resolve_user_id(conn, user)?;
        conn.execute(
            "INSERT INTO entity (schema_id, name, state, collect_date, create_user_id, modify_user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![schema_id, self.name, self.state.as_str(), self.collect_date, user_id],
        )?;
        let id = conn.last_insert_rowid();
        self.meta.id = Some(id);
        self.schema_id = Some(schema_id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Entity>> {
        conn.query_row("SELECT * FROM entity WHERE id = ?1", [id], from_row)
            .optional()
            .map_err(Error::from)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM entity WHERE id = ?1", [id])?;
        Ok(())
    }

    fn resolve_attribute(&self, conn: &Connection, name: &str) -> Result<Attribute> {
        let schema_id = self.schema_id.ok_or_else(|| Error::MissingKey("entity schema".into()))?;
        let attrs = Attribute::list_for_schema(conn, schema_id)?;
        attrs
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Reads a scalar attribute. Returns `Ok(None)` if no row exists. Fails
    /// with `Error::UnexpectedResult` if more than one row exists for a
    /// scalar attribute.
    pub fn get(&self, conn: &Connection, name: &str) -> Result<Option<TypedValue>> {
        let attr = self.resolve_attribute(conn, name)?;
        let entity_id = self.meta.id.ok_or_else(|| Error::MissingKey("entity id".into()))?;
        let attribute_id = attr.meta.id.unwrap();
        let table = TypedValue::table_for(attr.attr_type);

        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM {table} WHERE entity_id = ?1 AND attribute_id = ?2"
        ))?;
        let mut rows = stmt.query(params![entity_id, attribute_id])?;

        let mut found: Option<TypedValue> = None;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            count += 1;
            if count > 1 {
                return Err(Error::UnexpectedResult(format!(
                    "scalar attribute '{name}' has more than one value row"
                )));
            }
            found = raw_to_typed(row, 0, attr.attr_type)?;
        }
        Ok(found)
    }

    /// Reads a collection attribute as an ordered list of values (insertion
    /// order, since writes always rewrite the full set in order).
    pub fn get_collection(&self, conn: &Connection, name: &str) -> Result<Vec<TypedValue>> {
        let attr = self.resolve_attribute(conn, name)?;
        let entity_id = self.meta.id.ok_or_else(|| Error::MissingKey("entity id".into()))?;
        let attribute_id = attr.meta.id.unwrap();
        let table = TypedValue::table_for(attr.attr_type);

        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM {table} WHERE entity_id = ?1 AND attribute_id = ?2 ORDER BY id"
        ))?;
        let mut rows = stmt.query(params![entity_id, attribute_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(v) = raw_to_typed(row, 0, attr.attr_type)? {
                out.push(v);
            }
        }
        Ok(out)
    }

    /// Writes a scalar attribute, update-or-insert. `value = None` writes a
    /// null value row (intentional, to allow placeholder schemata) and
    /// bypasses bound/validator/choice checks.
    ///
    /// Updating an existing value that actually changes writes a pre-image
    /// audit row and therefore requires a resolvable current user; an
    /// unbound user fails with `Error::NonExistentUser` before either the
    /// live row or the audit row is touched. A first write (insert) and a
    /// rewrite with an unchanged value never audit, so they accept an
    /// unbound user.
    pub fn set(
        &self,
        conn: &Connection,
        name: &str,
        value: Option<TypedValue>,
        user: &dyn CurrentUser,
    ) -> Result<()> {
        let attr = self.resolve_attribute(conn, name)?;
        let entity_id = self.meta.id.ok_or_else(|| Error::MissingKey("entity id".into()))?;
        let attribute_id = attr.meta.id.unwrap();
        let table = TypedValue::table_for(attr.attr_type);

        let choice_id = match &value {
            Some(v) => resolve_choice(&attr, v)?,
            None => None,
        };
        if let Some(v) = &value {
            validate(&attr, v)?;
        }

        let existing: Option<i64> = conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE entity_id = ?1 AND attribute_id = ?2"),
                params![entity_id, attribute_id],
                |r| r.get(0),
            )
            .optional()?;

        let sql_value = value.as_ref().map(typed_to_sql).unwrap_or(Value::Null);

        match existing {
            Some(row_id) => {
                let (old_value, old_choice_id, revision): (Value, Option<i64>, i64) = conn.query_row(
                    &format!("SELECT value, choice_id, revision FROM {table} WHERE id = ?1"),
                    [row_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )?;

                let will_audit = old_value != sql_value || old_choice_id != choice_id;
                let user_id = if will_audit {
                    Some(category::require_user_id(conn, user)?)
                } else {
                    category::resolve_user_id(conn, user)?
                };

                conn.execute(
                    &format!(
                        "UPDATE {table} SET value = ?1, choice_id = ?2, modify_user_id = ?3,
                         modify_date = CURRENT_TIMESTAMP WHERE id = ?4"
                    ),
                    params![sql_value, choice_id, user_id, row_id],
                )?;

                let old_columns = value_columns(entity_id, attribute_id, old_choice_id, old_value);
                let new_columns = value_columns(entity_id, attribute_id, choice_id, sql_value.clone());
                crate::audit::record_change(conn, table, row_id, revision, &new_columns, &old_columns, false)?;
            }
            None => {
                let user_id = category::resolve_user_id(conn, user)?;
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (entity_id, attribute_id, choice_id, value, create_user_id, modify_user_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)"
                    ),
                    params![entity_id, attribute_id, choice_id, sql_value, user_id],
                )?;
            }
        }
        Ok(())
    }

    /// Writes a collection attribute: deletes all existing `(entity,
    /// attribute)` rows, then inserts the new values in order. No attempt at
    /// a diff, matching the façade's write semantics for collections.
    pub fn set_collection(
        &self,
        conn: &Connection,
        name: &str,
        values: &[TypedValue],
        user: &dyn CurrentUser,
    ) -> Result<()> {
        let attr = self.resolve_attribute(conn, name)?;
        let entity_id = self.meta.id.ok_or_else(|| Error::MissingKey("entity id".into()))?;
        let attribute_id = attr.meta.id.unwrap();
        let table = TypedValue::table_for(attr.attr_type);

        for v in values {
            validate(&attr, v)?;
        }

        let user_id = category::resolve_user_id(conn, user)?;
        conn.execute(
            &format!("DELETE FROM {table} WHERE entity_id = ?1 AND attribute_id = ?2"),
            params![entity_id, attribute_id],
        )?;
        for v in values {
            let choice_id = resolve_choice(&attr, v)?;
            conn.execute(
                &format!(
                    "INSERT INTO {table} (entity_id, attribute_id, choice_id, value, create_user_id, modify_user_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)"
                ),
                params![entity_id, attribute_id, choice_id, typed_to_sql(v), user_id],
            )?;
        }
        Ok(())
    }

    pub fn delete_value(&self, conn: &Connection, name: &str) -> Result<()> {
        let attr = self.resolve_attribute(conn, name)?;
        let entity_id = self.meta.id.ok_or_else(|| Error::MissingKey("entity id".into()))?;
        let attribute_id = attr.meta.id.unwrap();
        let table = TypedValue::table_for(attr.attr_type);
        conn.execute(
            &format!("DELETE FROM {table} WHERE entity_id = ?1 AND attribute_id = ?2"),
            params![entity_id, attribute_id],
        )?;
        Ok(())
    }
}

/// Finds the Choice whose value equals `v`, when the attribute is
/// choice-constrained. Fails with `Error::Constraint` if none match.
fn resolve_choice(attr: &Attribute, v: &TypedValue) -> Result<Option<i64>> {
    if attr.choices.is_empty() {
        return Ok(None);
    }
    let comparable = v.as_comparable_string();
    attr.choices
        .iter()
        .find(|c| c.value == comparable)
        .map(|c| c.meta.id)
        .ok_or_else(|| {
            Error::constraint(
                attr.schema_id.map(|i| i.to_string()).unwrap_or_default(),
                attr.name.clone(),
                format!("value '{comparable}' is not one of the attribute's choices"),
            )
        })
}

/// Bound/validator/choice enforcement for a single written value, per the
/// write-validation rules: length for string/text, magnitude otherwise, with
/// date/datetime bounds read as UNIX epoch seconds (see
/// `Attribute::value_min`/`value_max` doc comment for why).
fn validate(attr: &Attribute, v: &TypedValue) -> Result<()> {
    if let Some(interpreted) = comparable_magnitude(attr.attr_type, v)? {
        if let Some(min) = attr.value_min {
            if interpreted < min {
                return Err(bound_error(attr, "value_min", min, interpreted));
            }
        }
        if let Some(max) = attr.value_max {
            if interpreted > max {
                return Err(bound_error(attr, "value_max", max, interpreted));
            }
        }
    }

    if let Some(pattern) = &attr.validator {
        let re = Regex::new(pattern)
            .map_err(|e| Error::constraint(attr.name.clone(), "validator", e))?;
        if !re.is_match(&v.as_comparable_string()) {
            return Err(Error::constraint(
                attr.name.clone(),
                "validator",
                format!("value does not match pattern {pattern}"),
            ));
        }
    }

    Ok(())
}

fn bound_error(attr: &Attribute, bound: &str, limit: Decimal, interpreted: Decimal) -> Error {
    Error::constraint(
        attr.name.clone(),
        bound,
        format!("interpreted value {interpreted} violates bound {limit}"),
    )
}

/// Returns the "comparable" used for bound checks, or `None` for types with
/// no bound semantics (object, section). Kept as `Decimal` rather than
/// truncated to an integer so a `decimal`/`number` bound such as `2.9` isn't
/// rounded away before the comparison.
fn comparable_magnitude(attr_type: AttrType, v: &TypedValue) -> Result<Option<Decimal>> {
    Ok(match (attr_type, v) {
        (AttrType::String, TypedValue::Str(s)) | (AttrType::Text, TypedValue::Str(s)) => {
            Some(Decimal::from(s.chars().count() as i64))
        }
        (AttrType::Choice, TypedValue::Str(s)) => Some(Decimal::from(s.chars().count() as i64)),
        (AttrType::Integer, TypedValue::Int(n)) | (AttrType::Number, TypedValue::Int(n)) => {
            Some(Decimal::from(*n))
        }
        (AttrType::Boolean, TypedValue::Bool(b)) => Some(Decimal::from(*b as i64)),
        (AttrType::Decimal, TypedValue::Dec(d)) | (AttrType::Number, TypedValue::Dec(d)) => Some(*d),
        (AttrType::Date, TypedValue::Date(d)) => {
            let dt = Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap());
            Some(Decimal::from(dt.timestamp()))
        }
        (AttrType::Datetime, TypedValue::DateTime(dt)) => Some(Decimal::from(dt.timestamp())),
        _ => None,
    })
}

fn value_columns(entity_id: i64, attribute_id: i64, choice_id: Option<i64>, value: Value) -> Vec<(&'static str, Value)> {
    vec![
        ("entity_id", Value::Integer(entity_id)),
        ("attribute_id", Value::Integer(attribute_id)),
        ("choice_id", choice_id.map(Value::Integer).unwrap_or(Value::Null)),
        ("value", value),
    ]
}

fn typed_to_sql(v: &TypedValue) -> Value {
    match v {
        TypedValue::Int(n) => Value::Integer(*n),
        TypedValue::Bool(b) => Value::Integer(*b as i64),
        TypedValue::Dec(d) => Value::Text(d.to_string()),
        TypedValue::DateTime(dt) => Value::Text(dt.to_rfc3339()),
        TypedValue::Date(d) => Value::Text(d.to_string()),
        TypedValue::Str(s) => Value::Text(s.clone()),
        TypedValue::Ref(id) => Value::Integer(*id),
    }
}

fn raw_to_typed(row: &Row, idx: usize, attr_type: AttrType) -> Result<Option<TypedValue>> {
    let value: Option<Value> = row.get(idx)?;
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    Ok(Some(match (attr_type, value) {
        (AttrType::Boolean, Value::Integer(n)) => TypedValue::Bool(n != 0),
        (AttrType::Integer, Value::Integer(n)) => TypedValue::Int(n),
        (AttrType::Decimal, Value::Text(s)) | (AttrType::Number, Value::Text(s)) => TypedValue::Dec(
            Decimal::from_str(&s).map_err(|e| Error::constraint("decimal", "value", e))?,
        ),
        (AttrType::Date, Value::Text(s)) => {
            TypedValue::Date(NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
                Error::constraint("date", "value", e)
            })?)
        }
        (AttrType::Datetime, Value::Text(s)) => TypedValue::DateTime(
            DateTime::parse_from_rfc3339(&s)
                .map_err(|e| Error::constraint("datetime", "value", e))?
                .with_timezone(&Utc),
        ),
        (AttrType::String, Value::Text(s)) | (AttrType::Text, Value::Text(s)) | (AttrType::Choice, Value::Text(s)) => {
            TypedValue::Str(s)
        }
        (AttrType::Object, Value::Integer(n)) => TypedValue::Ref(n),
        (_, other) => {
            return Err(Error::constraint(
                "value",
                "type",
                format!("unexpected storage value {:?} for type {:?}", other, attr_type),
            ))
        }
    }))
}

fn from_row(row: &Row) -> rusqlite::Result<Entity> {
    let state_str: String = row.get("state")?;
    Ok(Entity {
        meta: Metadata {
            id: row.get("id")?,
            create_date: row.get::<_, Option<DateTime<Utc>>>("create_date")?,
            modify_date: row.get::<_, Option<DateTime<Utc>>>("modify_date")?,
            create_user: None,
            modify_user: None,
        },
        schema_id: row.get("schema_id")?,
        name: row.get("name")?,
        state: EntityState::from_str(&state_str).unwrap_or(EntityState::PendingEntry),
        collect_date: row.get("collect_date")?,
        revision: row.get("revision")?,
    })
}
