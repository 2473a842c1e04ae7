// src/model/context.rs

use crate::error::{Error, Result};
use crate::metadata::{CurrentUser, Metadata};
use crate::model::category;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Generic back-reference from an external (non-entity) row to an Entity.
/// Inverts ownership: the entity does not know its host, hosts reach
/// through Context.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub meta: Metadata,
    pub entity_id: i64,
    pub external: String,
    pub ext_key: i64,
    pub revision: i64,
}

impl Context {
    pub fn new(entity_id: i64, external: impl Into<String>, ext_key: i64) -> Self {
        Self {
            meta: Metadata::new(),
            entity_id,
            external: external.into(),
            ext_key,
            revision: 1,
        }
    }

    pub fn insert(&mut self, conn: &Connection, user: &dyn CurrentUser) -> Result<i64> {
        let user_id = category::resolve_user_id(conn, user)?;
        conn.execute(
            "INSERT INTO context (entity_id, external, ext_key, create_user_id, modify_user_id)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![self.entity_id, self.external, self.ext_key, user_id],
        )?;
        let id = conn.last_insert_rowid();
        self.meta.id = Some(id);
        Ok(id)
    }
}

fn from_row(row: &Row) -> rusqlite::Result<Context> {
    Ok(Context {
        meta: Metadata {
            id: row.get("id")?,
            create_date: row.get::<_, Option<DateTime<Utc>>>("create_date")?,
            modify_date: row.get::<_, Option<DateTime<Utc>>>("modify_date")?,
            create_user: None,
            modify_user: None,
        },
        entity_id: row.get("entity_id")?,
        external: row.get("external")?,
        ext_key: row.get("ext_key")?,
        revision: row.get("revision")?,
    })
}

/// Narrow, object-safe stand-in for the original's `HasEntities` mixin plus
/// association proxy: a host type only needs to report its own table name,
/// and the crate exposes the link/lookup behavior as free functions over a
/// `Connection` rather than declarative relationship magic.
pub trait HasEntities {
    fn table_name(&self) -> &'static str;
    fn host_id(&self) -> i64;
}

/// Creates a Context row associating `entity_id` with the given host.
pub fn link(
    conn: &Connection,
    host: &dyn HasEntities,
    entity_id: i64,
    user: &dyn CurrentUser,
) -> Result<i64> {
    let mut ctx = Context::new(entity_id, host.table_name(), host.host_id());
    ctx.insert(conn, user)
}

/// Entities associated with a host, in no particular order.
pub fn entities_for(conn: &Connection, host: &dyn HasEntities) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id FROM context WHERE external = ?1 AND ext_key = ?2",
    )?;
    let rows = stmt.query_map(params![host.table_name(), host.host_id()], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

/// Raw lookup by `(external, ext_key)` without a `HasEntities` host, useful
/// for ad-hoc association rows.
pub fn entities_for_raw(conn: &Connection, external: &str, ext_key: i64) -> Result<Vec<Context>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM context WHERE external = ?1 AND ext_key = ?2",
    )?;
    let rows = stmt.query_map(params![external, ext_key], from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}
