// src/error.rs

use thiserror::Error;

/// Core error types for the data store
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors bubbled up from SQLite
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Addressed key does not exist in a manager or schema
    #[error("Not found: {0}")]
    NotFound(String),

    /// A query expected to return exactly one row returned more than one
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    /// Insert of an entity/schema without a unique name
    #[error("Missing key: {0}")]
    MissingKey(String),

    /// Insert collided with an existing unique key
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Recomputed checksum does not match the stored one
    #[error("Corrupt attribute {attribute}: stored checksum {stored} != recomputed {recomputed}")]
    CorruptAttribute {
        attribute: String,
        stored: String,
        recomputed: String,
    },

    /// Flush attempted without a bound current user
    #[error("No current user bound for audited write")]
    NonExistentUser,

    /// Entity bound to a schema that is not published
    #[error("Cannot bind entity to schema '{0}' in state '{1}', schema must be published")]
    InvalidEntitySchema(String, String),

    /// A value violates attribute bounds, validator, or choice enumeration
    #[error("Constraint violation on {schema}.{attribute}: {detail}")]
    Constraint {
        schema: String,
        attribute: String,
        detail: String,
    },

    /// Raised by the (out of core scope) XML import/export collaborator
    #[error("XML error: {0}")]
    XmlError(String),
}

/// Result type alias using the data store's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn constraint(
        schema: impl Into<String>,
        attribute: impl Into<String>,
        detail: impl std::fmt::Display,
    ) -> Self {
        Error::Constraint {
            schema: schema.into(),
            attribute: attribute.into(),
            detail: detail.to_string(),
        }
    }
}
