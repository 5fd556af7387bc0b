//! # lumen-store
//!
//! Persistence for Lumen, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model. Operations that touch more than one row atomically (follow and like
//! toggles) run in a single transaction and therefore take `&mut self`.

pub mod database;
pub mod follows;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod sessions;
pub mod users;

mod error;
mod row;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
