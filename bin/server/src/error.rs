//! Domain error types for daemon startup.

use std::fmt;

/// Errors that stop the daemon from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// The configuration is missing or invalid.
    Config { details: String },
    /// The database is unreachable.
    Database { details: String },
    /// The schema could not be brought up to date.
    Migration { details: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "database connection failed: {details}"),
            Self::Migration { details } => write!(f, "database migration failed: {details}"),
        }
    }
}

impl std::error::Error for ServerError {}
