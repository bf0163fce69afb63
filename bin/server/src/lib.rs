//! boltflow daemon.
//!
//! This crate wires the workflow engine and channel ingestion to
//! PostgreSQL and runs the long-lived services until shutdown.

pub mod config;
pub mod db;
pub mod error;
pub mod services;

use crate::config::ServerConfig;
use crate::error::ServerError;
use boltflow_core::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Connects to the database and applies pending migrations.
///
/// # Errors
///
/// Returns `Database` if no connection can be made, or `Migration` if the
/// schema cannot be brought up to date.
pub async fn connect_database(config: &ServerConfig) -> Result<PgPool, ServerError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| ServerError::Database {
            details: e.to_string(),
        })?;

    info!("running database migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| ServerError::Migration {
            details: e.to_string(),
        })?;
    Ok(pool)
}
