//! Persistence layer — libSQL-backed profile storage.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{DEFAULT_AGE_TOLERANCE, ProfileStore};
