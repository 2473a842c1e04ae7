// src/model/mod.rs

//! Persisted domain types: the schema graph (`schema`, `attribute`, `choice`,
//! `category`), `user`, `entity`, and `context`. Each submodule owns its
//! struct, CRUD methods against a `rusqlite::Connection`, and (where
//! audited) its own pre-image diffing at update/delete time.

pub mod attribute;
pub mod category;
pub mod choice;
pub mod context;
pub mod entity;
pub mod schema;
pub mod user;

pub use attribute::Attribute;
pub use category::Category;
pub use choice::Choice;
pub use context::Context;
pub use entity::Entity;
pub use schema::Schema;
pub use user::User;
