//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! Multi-statement operations always issue their first *write* before any read, so that SQLite takes the write lock
//! up front and concurrent callers queue on the busy timeout instead of failing a lock upgrade.
//!
//! Writes with a `RETURNING` clause are always read with `fetch_all` and narrowed with [`first_row`] or [`only_row`].
//! `fetch_one`/`fetch_optional` stop after the first row and leave the statement un-stepped, which keeps the implicit
//! write transaction open on that pooled connection, so other connections would not see the change.
use std::{env, str::FromStr};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod bids;
pub mod disputes;
pub mod listings;
pub mod timers;
pub mod transactions;

const SQLITE_DB_URL: &str = "sqlite://data/escrow.db";

pub fn db_url() -> String {
    let result = env::var("ESCROW_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ ESCROW_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true).foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// The row produced by a `RETURNING` write, if the write matched anything.
pub fn first_row<T>(rows: Vec<T>) -> Option<T> {
    rows.into_iter().next()
}

/// The row produced by a `RETURNING` insert that must always produce one.
pub fn only_row<T>(rows: Vec<T>) -> Result<T, SqlxError> {
    rows.into_iter().next().ok_or(SqlxError::RowNotFound)
}
