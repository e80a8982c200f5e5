//! Storage Layer: a single SQLite database file behind a
//! connection pool, with writes serialized through one path.

pub mod sqlite;

pub use sqlite::{HealthStatus, InsertOutcome, SqliteStorage};
