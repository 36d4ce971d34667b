//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods; it never executes SQL directly.
//!
//! Rates are stored as INTEGER ten-thousandths, timestamps as RFC 3339 text.

use crate::{error::MarginResult, rate::Rate, types::RateCell};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Type, Connection, Row};

mod history;
mod identity;
mod link;
mod margin;
mod overrides;

pub struct MarginStore {
    conn: Connection,
}

impl MarginStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> MarginResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> MarginResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> MarginResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_margins.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_overrides.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_mdr_links.sql"))?;
        Ok(())
    }
}

// ── Column helpers ────────────────────────────────────────────────

pub(crate) fn ts_to_sql(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn rate_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Rate> {
    Ok(Rate::from_units(row.get::<_, i64>(idx)?))
}

/// Parse a text column through one of the domain `parse` functions.
pub(crate) fn enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> MarginResult<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read five consecutive key columns starting at `start`.
pub(crate) fn cell_cols(row: &Row<'_>, start: usize) -> rusqlite::Result<RateCell> {
    Ok(RateCell {
        customer_id: row.get(start)?,
        category_id: row.get(start + 1)?,
        bandeira:    row.get(start + 2)?,
        produto:     row.get(start + 3)?,
        canal:       row.get(start + 4)?,
    })
}
