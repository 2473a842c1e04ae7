// src/types.rs

//! Closed vocabularies used throughout the schema and value store, plus the
//! tagged-union value domain that routes writes to their per-type table.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Default for `Attribute::is_required` when not yet assigned.
pub const IS_REQUIRED_DEFAULT: bool = false;
/// Default for `Attribute::is_collection` when not yet assigned.
pub const IS_COLLECTION_DEFAULT: bool = false;

/// The closed attribute type vocabulary.
///
/// `number` and `choice` are later additions that subsume `integer`/`decimal`
/// and split scalar strings from enumerated ones; both are included here
/// rather than bolted on separately, since the recognized type set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    Boolean,
    Decimal,
    Integer,
    Number,
    Date,
    Datetime,
    String,
    Text,
    Choice,
    Section,
    Object,
}

impl AttrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttrType::Boolean => "boolean",
            AttrType::Decimal => "decimal",
            AttrType::Integer => "integer",
            AttrType::Number => "number",
            AttrType::Date => "date",
            AttrType::Datetime => "datetime",
            AttrType::String => "string",
            AttrType::Text => "text",
            AttrType::Choice => "choice",
            AttrType::Section => "section",
            AttrType::Object => "object",
        }
    }

    /// Human title, matching the vocabulary titles in the original data
    /// dictionary (`boolean` -> "Boolean", etc).
    pub fn title(&self) -> &'static str {
        match self {
            AttrType::Boolean => "Boolean",
            AttrType::Decimal => "Decimal",
            AttrType::Integer => "Integer",
            AttrType::Number => "Number",
            AttrType::Date => "Date",
            AttrType::Datetime => "Datetime",
            AttrType::String => "String",
            AttrType::Text => "Text",
            AttrType::Choice => "Choice",
            AttrType::Section => "Section",
            AttrType::Object => "Object",
        }
    }

    pub fn all() -> &'static [AttrType] {
        &[
            AttrType::Boolean,
            AttrType::Decimal,
            AttrType::Integer,
            AttrType::Number,
            AttrType::Date,
            AttrType::Datetime,
            AttrType::String,
            AttrType::Text,
            AttrType::Choice,
            AttrType::Section,
            AttrType::Object,
        ]
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttrType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(AttrType::Boolean),
            "decimal" => Ok(AttrType::Decimal),
            "integer" => Ok(AttrType::Integer),
            "number" => Ok(AttrType::Number),
            "date" => Ok(AttrType::Date),
            "datetime" => Ok(AttrType::Datetime),
            "string" => Ok(AttrType::String),
            "text" => Ok(AttrType::Text),
            "choice" => Ok(AttrType::Choice),
            "section" => Ok(AttrType::Section),
            "object" => Ok(AttrType::Object),
            _ => Err(format!("Invalid attribute type: {}", s)),
        }
    }
}

/// Schema publication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Draft,
    Review,
    Published,
    Retracted,
}

impl SchemaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaState::Draft => "draft",
            SchemaState::Review => "review",
            SchemaState::Published => "published",
            SchemaState::Retracted => "retracted",
        }
    }

    /// Whether this state requires `publish_date` to be set (`true`) or
    /// unset (`false`) -- the cross-field invariant from the schema check
    /// constraint.
    pub fn requires_publish_date(&self) -> bool {
        matches!(self, SchemaState::Published | SchemaState::Retracted)
    }

    /// Allowed direct transitions: draft->review, review->published,
    /// draft->published, review->draft, published->retracted.
    pub fn can_transition_to(&self, next: SchemaState) -> bool {
        matches!(
            (self, next),
            (SchemaState::Draft, SchemaState::Review)
                | (SchemaState::Review, SchemaState::Published)
                | (SchemaState::Draft, SchemaState::Published)
                | (SchemaState::Review, SchemaState::Draft)
                | (SchemaState::Published, SchemaState::Retracted)
        )
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SchemaState::Draft),
            "review" => Ok(SchemaState::Review),
            "published" => Ok(SchemaState::Published),
            "retracted" => Ok(SchemaState::Retracted),
            _ => Err(format!("Invalid schema state: {}", s)),
        }
    }
}

/// How entities of this schema are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Eav,
    Resource,
    Table,
}

impl Storage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Storage::Eav => "eav",
            Storage::Resource => "resource",
            Storage::Table => "table",
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Storage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eav" => Ok(Storage::Eav),
            "resource" => Ok(Storage::Resource),
            "table" => Ok(Storage::Table),
            _ => Err(format!("Invalid storage kind: {}", s)),
        }
    }
}

/// Entity lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    PendingEntry,
    PendingReview,
    Complete,
    NotDone,
    Error,
}

impl EntityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::PendingEntry => "pending-entry",
            EntityState::PendingReview => "pending-review",
            EntityState::Complete => "complete",
            EntityState::NotDone => "not-done",
            EntityState::Error => "error",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending-entry" => Ok(EntityState::PendingEntry),
            "pending-review" => Ok(EntityState::PendingReview),
            "complete" => Ok(EntityState::Complete),
            "not-done" => Ok(EntityState::NotDone),
            "error" => Ok(EntityState::Error),
            _ => Err(format!("Invalid entity state: {}", s)),
        }
    }
}

/// The polymorphic value domain: a tagged sum routed by the storage layer to
/// one of the five per-type value tables.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int(i64),
    Dec(Decimal),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Str(String),
    Bool(bool),
    Ref(i64),
}

impl TypedValue {
    /// Which of the five physical tables this value belongs in, for a given
    /// attribute type.
    pub fn table_for(attr_type: AttrType) -> &'static str {
        match attr_type {
            AttrType::Integer | AttrType::Boolean => "value_integer",
            AttrType::Decimal | AttrType::Number => "value_decimal",
            AttrType::Date | AttrType::Datetime => "value_datetime",
            AttrType::String | AttrType::Text | AttrType::Choice => "value_string",
            AttrType::Object => "value_object",
            AttrType::Section => {
                unreachable!("section attributes do not carry values directly")
            }
        }
    }

    /// A comparable `String` form, used for validator regex matching and
    /// choice value comparisons, matching the `str(value)` comparisons in
    /// the original write-validation path.
    pub fn as_comparable_string(&self) -> String {
        match self {
            TypedValue::Int(v) => v.to_string(),
            TypedValue::Dec(v) => v.to_string(),
            TypedValue::DateTime(v) => v.to_rfc3339(),
            TypedValue::Date(v) => v.to_string(),
            TypedValue::Str(v) => v.clone(),
            TypedValue::Bool(v) => v.to_string(),
            TypedValue::Ref(v) => v.to_string(),
        }
    }
}
