//! Persistence for the report aggregate
//!
//! Single-statement operations accept any SQLite executor so they run both
//! on the pool and inside a transaction. Operations issuing several
//! statements take a connection and are called with `&mut *tx`.

pub mod bids;
pub mod comments;
pub mod images;
pub mod reports;
pub mod upvotes;
pub mod users;

use infrafix_common::time::parse_db_timestamp;
use infrafix_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Read a stored RFC 3339 timestamp column
pub(crate) fn timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_db_timestamp(&raw)
}

/// Read a stored enum column; bad values are storage corruption, not input errors
pub(crate) fn enum_column<T: FromStr<Err = Error>>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| Error::Internal(format!("Column {}: {}", column, e)))
}
