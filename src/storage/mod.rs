//! Storage layer for vidseek
//!
//! SQLite is the durable copy of the embedding index; the in-memory map in
//! [`crate::search::index`] is rebuilt from it on open.

pub mod sqlite;

pub use sqlite::Database;
