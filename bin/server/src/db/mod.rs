//! PostgreSQL implementations of the boltflow store traits.
//!
//! This module provides data access for:
//! - Workflows, versions, nodes, links and the node execution log
//! - Channels, channel events and wallet transactions

pub mod channel;
pub mod workflow;

pub use channel::PgChannelStore;
pub use workflow::PgWorkflowStore;

/// Returns true when Postgres rejected a write on a unique index.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Builds a decode error for a column holding a value the domain rejects.
pub(crate) fn invalid_column(column: &'static str, value: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} '{value}'"),
    )))
}
