// src/db/schema.rs

//! Database schema definitions and migrations.
//!
//! Defines the SQLite tables for the metadata graph (schema/attribute/choice/
//! category), the value store (one table per physical type), context
//! association, and the audit shadow tables, via a versioned migration
//! sequence.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 4;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    info!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        info!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        3 => migrate_v3(conn),
        4 => migrate_v4(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Schema Version 1: users and categories
///
/// These are the identity and tagging tables everything else hangs stamps
/// and labels off of.
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            title TEXT,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT uq_user_key UNIQUE(key)
        );

        CREATE TABLE category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            title TEXT,
            description TEXT,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT uq_category_name UNIQUE(name)
        );
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

/// Schema Version 2: the schema graph (schema/attribute/choice/schema_category)
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE TABLE schema (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            title TEXT,
            description TEXT,
            state TEXT NOT NULL CHECK(state IN ('draft', 'review', 'published', 'retracted')),
            storage TEXT NOT NULL CHECK(storage IN ('eav', 'resource', 'table')),
            publish_date TEXT,
            is_association INTEGER NOT NULL DEFAULT 0,
            is_inline INTEGER NOT NULL DEFAULT 0,
            base_schema_id INTEGER REFERENCES schema(id) ON DELETE SET NULL,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT ck_schema_publish_date CHECK (
                (state IN ('draft', 'review') AND publish_date IS NULL)
                OR (state IN ('published', 'retracted') AND publish_date IS NOT NULL)
            ),
            CONSTRAINT uq_schema_name_publish_date UNIQUE(name, publish_date)
        );

        CREATE INDEX idx_schema_name ON schema(name);
        CREATE INDEX idx_schema_base_schema_id ON schema(base_schema_id);

        CREATE TABLE attribute (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schema_id INTEGER NOT NULL REFERENCES schema(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            title TEXT,
            description TEXT,
            type TEXT NOT NULL CHECK(type IN (
                'boolean', 'decimal', 'integer', 'number', 'date', 'datetime',
                'string', 'text', 'choice', 'section', 'object'
            )),
            is_collection INTEGER NOT NULL DEFAULT 0,
            is_required INTEGER NOT NULL DEFAULT 0,
            is_private INTEGER NOT NULL DEFAULT 0,
            object_schema_id INTEGER REFERENCES schema(id) ON DELETE SET NULL,
            section_id INTEGER REFERENCES attribute(id) ON DELETE CASCADE,
            value_min REAL,
            value_max REAL,
            collection_min INTEGER,
            collection_max INTEGER,
            validator TEXT,
            order_index INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT ck_attribute_object_schema CHECK (
                (type = 'object' AND object_schema_id IS NOT NULL)
                OR (type != 'object' AND object_schema_id IS NULL)
            ),
            CONSTRAINT ck_attribute_value_bounds CHECK (
                value_min IS NULL OR value_max IS NULL OR value_min < value_max
            ),
            CONSTRAINT ck_attribute_unsigned_collection_min CHECK (
                collection_min IS NULL OR collection_min >= 0
            ),
            CONSTRAINT ck_attribute_unsigned_collection_max CHECK (
                collection_max IS NULL OR collection_max >= 0
            ),
            CONSTRAINT ck_attribute_collection_bounds CHECK (
                collection_min IS NULL OR collection_max IS NULL OR collection_min < collection_max
            ),
            CONSTRAINT uq_attribute_schema_name UNIQUE(schema_id, name),
            CONSTRAINT uq_attribute_schema_order UNIQUE(schema_id, order_index)
        );

        CREATE INDEX idx_attribute_checksum ON attribute(checksum);
        CREATE INDEX idx_attribute_object_schema_id ON attribute(object_schema_id);
        CREATE INDEX idx_attribute_schema_id ON attribute(schema_id);
        CREATE INDEX idx_attribute_section_id ON attribute(section_id);

        CREATE TABLE choice (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            attribute_id INTEGER NOT NULL REFERENCES attribute(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            title TEXT,
            value TEXT NOT NULL,
            order_index INTEGER NOT NULL,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT uq_choice_attribute_name UNIQUE(attribute_id, name),
            CONSTRAINT uq_choice_attribute_order UNIQUE(attribute_id, order_index),
            CONSTRAINT uq_choice_attribute_value UNIQUE(attribute_id, value)
        );

        CREATE INDEX idx_choice_attribute_id ON choice(attribute_id);

        -- Pure join table: no audit shadow, per the external-interfaces contract.
        CREATE TABLE schema_category (
            schema_id INTEGER NOT NULL REFERENCES schema(id) ON DELETE CASCADE,
            category_id INTEGER NOT NULL REFERENCES category(id) ON DELETE CASCADE,
            PRIMARY KEY (schema_id, category_id)
        );
        ",
    )?;

    info!("Schema version 2 applied successfully");
    Ok(())
}

/// Schema Version 3: entities, context association, and the per-type value store
fn migrate_v3(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 3");

    conn.execute_batch(
        "
        CREATE TABLE entity (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schema_id INTEGER NOT NULL REFERENCES schema(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            state TEXT NOT NULL CHECK(state IN (
                'pending-entry', 'pending-review', 'complete', 'not-done', 'error'
            )),
            collect_date TEXT,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT uq_entity_schema_name UNIQUE(schema_id, name)
        );

        CREATE INDEX idx_entity_schema_id ON entity(schema_id);

        CREATE TABLE context (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
            external TEXT NOT NULL,
            ext_key INTEGER NOT NULL,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            CONSTRAINT uq_context_entity_external_key UNIQUE(entity_id, external, ext_key)
        );

        CREATE INDEX idx_context_entity_id ON context(entity_id);
        CREATE INDEX idx_context_external ON context(external);

        CREATE TABLE value_integer (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
            attribute_id INTEGER NOT NULL REFERENCES attribute(id) ON DELETE CASCADE,
            choice_id INTEGER REFERENCES choice(id) ON DELETE SET NULL,
            value INTEGER,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX idx_value_integer_entity_id ON value_integer(entity_id);
        CREATE INDEX idx_value_integer_attribute_id ON value_integer(attribute_id);
        CREATE INDEX idx_value_integer_choice_id ON value_integer(choice_id);
        CREATE INDEX idx_value_integer_value ON value_integer(value);
        CREATE INDEX idx_value_integer_attribute_value ON value_integer(attribute_id, value);

        CREATE TABLE value_decimal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
            attribute_id INTEGER NOT NULL REFERENCES attribute(id) ON DELETE CASCADE,
            choice_id INTEGER REFERENCES choice(id) ON DELETE SET NULL,
            value TEXT,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX idx_value_decimal_entity_id ON value_decimal(entity_id);
        CREATE INDEX idx_value_decimal_attribute_id ON value_decimal(attribute_id);
        CREATE INDEX idx_value_decimal_choice_id ON value_decimal(choice_id);
        CREATE INDEX idx_value_decimal_value ON value_decimal(value);
        CREATE INDEX idx_value_decimal_attribute_value ON value_decimal(attribute_id, value);

        CREATE TABLE value_datetime (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
            attribute_id INTEGER NOT NULL REFERENCES attribute(id) ON DELETE CASCADE,
            choice_id INTEGER REFERENCES choice(id) ON DELETE SET NULL,
            value TEXT,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX idx_value_datetime_entity_id ON value_datetime(entity_id);
        CREATE INDEX idx_value_datetime_attribute_id ON value_datetime(attribute_id);
        CREATE INDEX idx_value_datetime_choice_id ON value_datetime(choice_id);
        CREATE INDEX idx_value_datetime_value ON value_datetime(value);
        CREATE INDEX idx_value_datetime_attribute_value ON value_datetime(attribute_id, value);

        CREATE TABLE value_string (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
            attribute_id INTEGER NOT NULL REFERENCES attribute(id) ON DELETE CASCADE,
            choice_id INTEGER REFERENCES choice(id) ON DELETE SET NULL,
            value TEXT,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX idx_value_string_entity_id ON value_string(entity_id);
        CREATE INDEX idx_value_string_attribute_id ON value_string(attribute_id);
        CREATE INDEX idx_value_string_choice_id ON value_string(choice_id);
        CREATE INDEX idx_value_string_value ON value_string(value);
        CREATE INDEX idx_value_string_attribute_value ON value_string(attribute_id, value);

        CREATE TABLE value_object (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
            attribute_id INTEGER NOT NULL REFERENCES attribute(id) ON DELETE CASCADE,
            choice_id INTEGER REFERENCES choice(id) ON DELETE SET NULL,
            value INTEGER REFERENCES entity(id) ON DELETE CASCADE,
            create_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            modify_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            create_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            modify_user_id INTEGER REFERENCES user(id) ON DELETE SET NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX idx_value_object_entity_id ON value_object(entity_id);
        CREATE INDEX idx_value_object_attribute_id ON value_object(attribute_id);
        CREATE INDEX idx_value_object_choice_id ON value_object(choice_id);
        CREATE INDEX idx_value_object_value ON value_object(value);
        CREATE INDEX idx_value_object_attribute_value ON value_object(attribute_id, value);
        ",
    )?;

    info!("Schema version 3 applied successfully");
    Ok(())
}

/// Schema Version 4: audit shadow tables
///
/// Each shadow table mirrors its live table's columns plus `revision` as
/// part of a composite primary key, and drops the live table's foreign-key
/// and uniqueness constraints (a pre-image row must be storable even after
/// the referenced row has moved on).
fn migrate_v4(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 4");

    conn.execute_batch(
        "
        CREATE TABLE user_audit (
            id INTEGER NOT NULL,
            key TEXT NOT NULL,
            title TEXT,
            create_date TEXT,
            modify_date TEXT,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE category_audit (
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            description TEXT,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE schema_audit (
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            description TEXT,
            state TEXT NOT NULL,
            storage TEXT NOT NULL,
            publish_date TEXT,
            is_association INTEGER NOT NULL,
            is_inline INTEGER NOT NULL,
            base_schema_id INTEGER,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE attribute_audit (
            id INTEGER NOT NULL,
            schema_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            description TEXT,
            type TEXT NOT NULL,
            is_collection INTEGER NOT NULL,
            is_required INTEGER NOT NULL,
            is_private INTEGER NOT NULL,
            object_schema_id INTEGER,
            section_id INTEGER,
            value_min REAL,
            value_max REAL,
            collection_min INTEGER,
            collection_max INTEGER,
            validator TEXT,
            order_index INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE choice_audit (
            id INTEGER NOT NULL,
            attribute_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            value TEXT NOT NULL,
            order_index INTEGER NOT NULL,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE entity_audit (
            id INTEGER NOT NULL,
            schema_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            collect_date TEXT,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE context_audit (
            id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            external TEXT NOT NULL,
            ext_key INTEGER NOT NULL,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE value_integer_audit (
            id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            attribute_id INTEGER NOT NULL,
            choice_id INTEGER,
            value INTEGER,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE value_decimal_audit (
            id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            attribute_id INTEGER NOT NULL,
            choice_id INTEGER,
            value TEXT,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE value_datetime_audit (
            id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            attribute_id INTEGER NOT NULL,
            choice_id INTEGER,
            value TEXT,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE value_string_audit (
            id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            attribute_id INTEGER NOT NULL,
            choice_id INTEGER,
            value TEXT,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );

        CREATE TABLE value_object_audit (
            id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            attribute_id INTEGER NOT NULL,
            choice_id INTEGER,
            value INTEGER,
            create_date TEXT,
            modify_date TEXT,
            create_user_id INTEGER,
            modify_user_id INTEGER,
            revision INTEGER NOT NULL,
            PRIMARY KEY (id, revision)
        );
        ",
    )?;

    info!("Schema version 4 applied successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_schema_version_tracking() {
        let (_temp, conn) = create_test_db();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 0);

        set_schema_version(&conn, 1).unwrap();
        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "user",
            "category",
            "schema",
            "attribute",
            "choice",
            "schema_category",
            "entity",
            "context",
            "value_integer",
            "value_decimal",
            "value_datetime",
            "value_string",
            "value_object",
            "user_audit",
            "category_audit",
            "schema_audit",
            "attribute_audit",
            "choice_audit",
            "entity_audit",
            "context_audit",
            "value_integer_audit",
            "value_decimal_audit",
            "value_datetime_audit",
            "value_string_audit",
            "value_object_audit",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
        }
        assert!(!tables.contains(&"schema_category_audit".to_string()));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();
        let version1 = get_schema_version(&conn).unwrap();

        migrate(&conn).unwrap();
        let version2 = get_schema_version(&conn).unwrap();

        assert_eq!(version1, version2);
        assert_eq!(version1, SCHEMA_VERSION);
    }

    #[test]
    fn test_schema_publish_date_constraint() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO schema (name, state, storage, publish_date) VALUES (?1, 'draft', 'eav', '2026-01-01')",
            ["A"],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO schema (name, state, storage, publish_date) VALUES (?1, 'draft', 'eav', NULL)",
            ["A"],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_attribute_object_schema_constraint() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO schema (name, state, storage, publish_date) VALUES ('A', 'draft', 'eav', NULL)",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO attribute (schema_id, name, type, order_index, checksum)
             VALUES (1, 'a', 'object', 0, 'deadbeef')",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO attribute (schema_id, name, type, order_index, checksum)
             VALUES (1, 'a', 'string', 0, 'deadbeef')",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_foreign_key_cascade_schema_to_attribute() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO schema (name, state, storage, publish_date) VALUES ('A', 'draft', 'eav', NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO attribute (schema_id, name, type, order_index, checksum)
             VALUES (1, 'a', 'string', 0, 'deadbeef')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM schema WHERE id = 1", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM attribute", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
