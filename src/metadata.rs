// src/metadata.rs

//! Metadata primitives composed into every persisted row: surrogate id,
//! create/modify stamps, and the user who made them.

use chrono::{DateTime, Utc};

/// Fields mixed into every persisted row type. Composition stands in for the
/// Python original's mixin class -- idiomatic Rust has no multiple
/// inheritance, so every model struct embeds a `Metadata` field instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub id: Option<i64>,
    pub create_date: Option<DateTime<Utc>>,
    pub modify_date: Option<DateTime<Utc>>,
    pub create_user: Option<String>,
    pub modify_user: Option<String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Supplies the "current user" key threaded through every audited write.
///
/// The original binds this to a session-scoped global; this crate passes it
/// explicitly into each call instead, since idiomatic Rust avoids implicit
/// ambient context. If a write that would produce an audit row is attempted
/// with no user bound, it fails with `Error::NonExistentUser`.
pub trait CurrentUser {
    fn current(&self) -> Option<&str>;
}

/// A `CurrentUser` that always resolves to a fixed key. Useful for tests and
/// single-operator CLI invocations.
pub struct StaticUser(pub String);

impl StaticUser {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl CurrentUser for StaticUser {
    fn current(&self) -> Option<&str> {
        Some(&self.0)
    }
}

/// A `CurrentUser` that never resolves, for exercising the
/// `Error::NonExistentUser` failure path.
pub struct NoUser;

impl CurrentUser for NoUser {
    fn current(&self) -> Option<&str> {
        None
    }
}
