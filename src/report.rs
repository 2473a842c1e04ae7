// src/report.rs

//! Report builder: pivots the sparse EAV store into a dense relational
//! projection for a schema name, merging column definitions across
//! published versions and applying collection expansion, choice labeling,
//! and privacy redaction.

use crate::error::Result;
use crate::model::attribute::Attribute;
use crate::model::entity::Entity;
use crate::model::schema::Schema;
use crate::types::{AttrType, TypedValue};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::BTreeMap;

/// The SQL-ish type a column is declared as in the projection, per the
/// datastore-type -> SQL-type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Unicode,
    UnicodeText,
    Numeric,
    Integer,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    fn for_attr_type(t: AttrType) -> ColumnType {
        match t {
            AttrType::Choice => ColumnType::String,
            AttrType::String => ColumnType::Unicode,
            AttrType::Text => ColumnType::UnicodeText,
            AttrType::Number | AttrType::Decimal => ColumnType::Numeric,
            AttrType::Integer => ColumnType::Integer,
            AttrType::Boolean => ColumnType::Boolean,
            AttrType::Date => ColumnType::Date,
            AttrType::Datetime => ColumnType::DateTime,
            AttrType::Object | AttrType::Section => ColumnType::String,
        }
    }
}

/// One resolved column: a leaf attribute merged across every schema version
/// it appears in.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub attr_type: AttrType,
    pub sql_type: ColumnType,
    pub is_collection: bool,
    pub is_private: bool,
    /// code -> label, later publish_date wins on conflicting labels.
    pub choices: BTreeMap<String, String>,
    /// schema ids this column appears in.
    pub versions: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnPlan {
    pub columns: Vec<ColumnDef>,
}

/// Enumerates all published, non-retracted Schema versions named `name`
/// (optionally constrained to `ids`, a set of schema ids), ordered by
/// `publish_date`, and walks each version's attribute tree -- descending
/// into `section` attributes, NOT into `object` attributes -- merging every
/// reached leaf into a column keyed by its name.
pub fn build_columns(conn: &Connection, name: &str, ids: Option<&[i64]>) -> Result<ColumnPlan> {
    let mut stmt = conn.prepare(
        "SELECT id FROM schema WHERE name = ?1 AND state = 'published' ORDER BY publish_date ASC",
    )?;
    let schema_ids: Vec<i64> = stmt
        .query_map([name], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut order: Vec<String> = Vec::new();
    let mut by_name: BTreeMap<String, ColumnDef> = BTreeMap::new();

    for schema_id in schema_ids {
        if let Some(allowed) = ids {
            if !allowed.contains(&schema_id) {
                continue;
            }
        }
        let attrs = Attribute::list_for_schema(conn, schema_id)?;
        for attr in attrs.iter().filter(|a| a.section_id.is_none() && a.attr_type != AttrType::Section) {
            merge_leaf(&mut order, &mut by_name, attr, schema_id);
        }
        // Section children are just attributes with a non-null section_id;
        // the flat attribute list already contains them, so merging them
        // once more here (rather than recursing) reaches the same leaves
        // without re-walking the section attribute itself as a column.
        for attr in attrs
            .iter()
            .filter(|a| a.section_id.is_some() && a.attr_type != AttrType::Section)
        {
            merge_leaf(&mut order, &mut by_name, attr, schema_id);
        }
    }

    Ok(ColumnPlan {
        columns: order.into_iter().filter_map(|n| by_name.remove(&n)).collect(),
    })
}

fn merge_leaf(
    order: &mut Vec<String>,
    by_name: &mut BTreeMap<String, ColumnDef>,
    attr: &Attribute,
    schema_id: i64,
) {
    let entry = by_name.entry(attr.name.clone()).or_insert_with(|| {
        order.push(attr.name.clone());
        ColumnDef {
            name: attr.name.clone(),
            attr_type: attr.attr_type,
            sql_type: ColumnType::for_attr_type(attr.attr_type),
            is_collection: attr.is_collection.unwrap_or(false),
            is_private: attr.is_private,
            choices: BTreeMap::new(),
            versions: Vec::new(),
        }
    });
    entry.attr_type = attr.attr_type;
    entry.sql_type = ColumnType::for_attr_type(attr.attr_type);
    entry.is_collection = attr.is_collection.unwrap_or(false);
    entry.is_private = attr.is_private;
    entry.versions.push(schema_id);
    for choice in &attr.choices {
        entry
            .choices
            .insert(choice.value.clone(), choice.title.clone().unwrap_or_else(|| choice.value.clone()));
    }
}

/// One value in a materialized report cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Text(String),
}

impl From<TypedValue> for Cell {
    fn from(v: TypedValue) -> Self {
        match v {
            TypedValue::Int(n) => Cell::Int(n),
            TypedValue::Bool(b) => Cell::Int(b as i64),
            TypedValue::Dec(d) => Cell::Text(d.to_string()),
            TypedValue::DateTime(dt) => Cell::Text(dt.to_rfc3339()),
            TypedValue::Date(d) => Cell::Text(d.to_string()),
            TypedValue::Str(s) => Cell::Text(s),
            TypedValue::Ref(id) => Cell::Int(id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub ids: Option<Vec<i64>>,
    pub attributes: Option<Vec<String>>,
    pub expand_collections: bool,
    pub use_choice_labels: bool,
    pub ignore_private: bool,
    pub context: Option<String>,
}

pub struct ReportRow {
    pub id: i64,
    pub form_name: String,
    pub form_publish_date: Option<NaiveDate>,
    pub state: String,
    pub collect_date: Option<NaiveDate>,
    pub create_date: Option<DateTime<Utc>>,
    pub create_user: Option<String>,
    pub modify_date: Option<DateTime<Utc>>,
    pub modify_user: Option<String>,
    pub context_key: Option<i64>,
    pub values: BTreeMap<String, Cell>,
}

pub struct Report {
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

/// Assembles the relational view: one row per Entity of the named schema's
/// resolved versions, one column per (possibly expanded) attribute.
pub fn build_report(conn: &Connection, name: &str, opts: &ReportOptions) -> Result<Report> {
    let plan = build_columns(conn, name, opts.ids.as_deref())?;
    let columns: Vec<&ColumnDef> = match &opts.attributes {
        Some(wanted) => plan.columns.iter().filter(|c| wanted.contains(&c.name)).collect(),
        None => plan.columns.iter().collect(),
    };

    let mut final_columns: Vec<String> = Vec::new();
    for col in &columns {
        if opts.expand_collections && col.is_collection && col.attr_type == AttrType::Choice {
            for code in col.choices.keys() {
                final_columns.push(format!("{}_{}", col.name, code));
            }
        } else {
            final_columns.push(col.name.clone());
        }
    }

    let mut distinct_schema_ids: Vec<i64> = plan.columns.iter().flat_map(|c| c.versions.clone()).collect();
    distinct_schema_ids.sort_unstable();
    distinct_schema_ids.dedup();

    let mut rows = Vec::new();
    for schema_id in &distinct_schema_ids {
        let schema = match Schema::find_by_id(conn, *schema_id)? {
            Some(s) => s,
            None => continue,
        };
        let entity_ids = entity_ids_for_schema(conn, *schema_id)?;
        for entity_id in entity_ids {
            let entity = Entity::find_by_id(conn, entity_id)?.unwrap();
            let row = build_row(conn, &entity, &schema, &columns, opts)?;
            rows.push(row);
        }
    }

    Ok(Report {
        columns: final_columns,
        rows,
    })
}

fn entity_ids_for_schema(conn: &Connection, schema_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM entity WHERE schema_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map([schema_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn build_row(
    conn: &Connection,
    entity: &Entity,
    schema: &Schema,
    columns: &[&ColumnDef],
    opts: &ReportOptions,
) -> Result<ReportRow> {
    let context_key = match &opts.context {
        Some(external) => {
            let mut stmt = conn.prepare(
                "SELECT ext_key FROM context WHERE entity_id = ?1 AND external = ?2 LIMIT 1",
            )?;
            stmt.query_row(
                rusqlite::params![entity.meta.id.unwrap(), external],
                |row| row.get(0),
            )
            .ok()
        }
        None => None,
    };

    let mut values = BTreeMap::new();
    for col in columns {
        let attr = schema.attributes.iter().find(|a| a.name == col.name);
        let attr = match attr {
            Some(a) => a,
            None => continue,
        };

        if col.is_collection {
            let raw = entity.get_collection(conn, &col.name)?;
            if opts.expand_collections && col.attr_type == AttrType::Choice {
                let selected: Vec<String> = raw.iter().map(TypedValue::as_comparable_string).collect();
                for code in col.choices.keys() {
                    let name = format!("{}_{}", col.name, code);
                    let cell = if selected.contains(code) {
                        if opts.use_choice_labels {
                            Cell::Text(col.choices.get(code).cloned().unwrap_or_default())
                        } else {
                            Cell::Int(1)
                        }
                    } else if selected.is_empty() {
                        Cell::Null
                    } else if opts.use_choice_labels {
                        Cell::Null
                    } else {
                        Cell::Int(0)
                    };
                    values.insert(name, cell);
                }
            } else {
                let mut codes: Vec<String> = raw
                    .iter()
                    .map(|v| {
                        if col.attr_type == AttrType::Choice && opts.use_choice_labels {
                            let code = v.as_comparable_string();
                            col.choices.get(&code).cloned().unwrap_or(code)
                        } else {
                            v.as_comparable_string()
                        }
                    })
                    .collect();
                codes.sort();
                values.insert(col.name.clone(), Cell::Text(codes.join(";")));
            }
        } else {
            let raw = entity.get(conn, &col.name)?;
            let cell = match raw {
                None => Cell::Null,
                Some(v) => {
                    if col.attr_type == AttrType::Choice {
                        let code = v.as_comparable_string();
                        if opts.use_choice_labels {
                            Cell::Text(col.choices.get(&code).cloned().unwrap_or(code))
                        } else {
                            Cell::Text(code)
                        }
                    } else {
                        Cell::from(v)
                    }
                }
            };
            values.insert(col.name.clone(), cell);
        }

        if opts.ignore_private && attr.is_private {
            for (key, cell) in values.iter_mut() {
                if key == &col.name || key.starts_with(&format!("{}_", col.name)) {
                    *cell = Cell::Text("[PRIVATE]".to_string());
                }
            }
        }
    }

    Ok(ReportRow {
        id: entity.meta.id.unwrap(),
        form_name: schema.name.clone(),
        form_publish_date: schema.publish_date,
        state: entity.state.as_str().to_string(),
        collect_date: entity.collect_date,
        create_date: entity.meta.create_date,
        create_user: entity.meta.create_user.clone(),
        modify_date: entity.meta.modify_date,
        modify_user: entity.meta.modify_user.clone(),
        context_key,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::metadata::NoUser;
    use crate::model::choice::Choice;
    use crate::model::entity::Entity as EntityModel;
    use crate::model::schema::Schema as SchemaModel;
    use crate::types::{EntityState, SchemaState, Storage};
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        db::schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_draft_schema_excluded_from_columns() {
        let (_temp, conn) = create_test_db();
        let mut schema = SchemaModel::new("A", SchemaState::Draft, Storage::Eav);
        schema.insert(&conn, &NoUser).unwrap();
        let schema_id = schema.meta.id.unwrap();
        let mut attr = Attribute::new("a", AttrType::String, 0);
        attr.insert(&conn, schema_id, &NoUser).unwrap();

        let plan = build_columns(&conn, "A", None).unwrap();
        assert!(plan.columns.is_empty());
    }

    #[test]
    fn test_published_schema_included_in_columns() {
        let (_temp, conn) = create_test_db();
        let mut schema = SchemaModel::new("A", SchemaState::Published, Storage::Eav);
        schema.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        schema.insert(&conn, &NoUser).unwrap();
        let schema_id = schema.meta.id.unwrap();
        let mut attr = Attribute::new("a", AttrType::String, 0);
        attr.insert(&conn, schema_id, &NoUser).unwrap();

        let plan = build_columns(&conn, "A", None).unwrap();
        assert_eq!(plan.columns.len(), 1);
        assert_eq!(plan.columns[0].name, "a");
    }

    #[test]
    fn test_multi_version_merges_choices_with_latest_label_winning() {
        let (_temp, conn) = create_test_db();

        let mut v1 = SchemaModel::new("A", SchemaState::Published, Storage::Eav);
        v1.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        v1.insert(&conn, &NoUser).unwrap();
        let v1_id = v1.meta.id.unwrap();
        let mut attr1 = Attribute::new("color", AttrType::Choice, 0);
        attr1.insert(&conn, v1_id, &NoUser).unwrap();
        let mut c1 = Choice::new("c1", "001", 0);
        c1.title = Some("Foo".into());
        c1.insert(&conn, attr1.meta.id.unwrap(), &NoUser).unwrap();
        let mut c2 = Choice::new("c2", "002", 1);
        c2.title = Some("Bar".into());
        c2.insert(&conn, attr1.meta.id.unwrap(), &NoUser).unwrap();

        let mut v2 = SchemaModel::new("A", SchemaState::Published, Storage::Eav);
        v2.publish_date = Some(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        v2.insert(&conn, &NoUser).unwrap();
        let v2_id = v2.meta.id.unwrap();
        let mut attr2 = Attribute::new("color", AttrType::Choice, 0);
        attr2.insert(&conn, v2_id, &NoUser).unwrap();
        let mut c1b = Choice::new("c1", "001", 0);
        c1b.title = Some("New Foo".into());
        c1b.insert(&conn, attr2.meta.id.unwrap(), &NoUser).unwrap();
        let mut c3 = Choice::new("c3", "003", 1);
        c3.title = Some("Baz".into());
        c3.insert(&conn, attr2.meta.id.unwrap(), &NoUser).unwrap();

        let plan = build_columns(&conn, "A", None).unwrap();
        let color = plan.columns.iter().find(|c| c.name == "color").unwrap();
        assert_eq!(color.choices.len(), 3);
        assert_eq!(color.choices.get("001").unwrap(), "New Foo");
    }

    #[test]
    fn test_private_redaction() {
        let (_temp, conn) = create_test_db();
        let mut schema = SchemaModel::new("A", SchemaState::Published, Storage::Eav);
        schema.publish_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        schema.insert(&conn, &NoUser).unwrap();
        let schema_id = schema.meta.id.unwrap();
        let mut attr = Attribute::new("name", AttrType::String, 0);
        attr.is_private = true;
        attr.insert(&conn, schema_id, &NoUser).unwrap();
        schema.attributes.push(attr);

        let mut entity = EntityModel::new("e1", EntityState::Complete);
        entity.insert(&conn, schema_id, &NoUser).unwrap();
        entity.set(&conn, "name", Some(TypedValue::Str("Jane Doe".into())), &NoUser).unwrap();

        let mut opts = ReportOptions::default();
        opts.ignore_private = true;
        let report = build_report(&conn, "A", &opts).unwrap();
        let row = &report.rows[0];
        assert_eq!(row.values.get("name"), Some(&Cell::Text("[PRIVATE]".to_string())));

        let report_visible = build_report(&conn, "A", &ReportOptions::default()).unwrap();
        assert_eq!(
            report_visible.rows[0].values.get("name"),
            Some(&Cell::Text("Jane Doe".to_string()))
        );
    }
}
