//! # Database Connections
//!
//! Pool construction and schema management for the task store. The engine
//! targets sqlx's SQLite driver: an ACID relational store that keeps the
//! whole engine (and its test suite) hermetic. All coordination against the
//! store is expressed as conditional updates, so any pool handed out here is
//! safe to share across overlapping scheduler invocations.

pub mod migrations;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::EngineConfig;
use crate::error::Result;

/// Connect to the task store described by the configuration and apply the
/// schema. Foreign keys are enabled on every connection; the dependency
/// cascade invariant relies on them.
pub async fn connect(config: &EngineConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    migrations::apply(&pool).await?;
    Ok(pool)
}

/// Connect to a private in-memory store, used by tests and demos. A single
/// long-lived connection backs the pool so the in-memory database survives
/// for the pool's lifetime.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrations::apply(&pool).await?;
    Ok(pool)
}
