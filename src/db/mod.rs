//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: token and answer storage on top of the pool

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{AnswerMode, DbAnswer, DbCredential};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage};
