//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Stages call store methods; they never execute SQL directly.
//!
//! Writes go through a `BatchTx`, which owns the batch's transaction.
//! Dropping a `BatchTx` without calling `commit()` rolls everything back.

use crate::{
    config::StoreConfig,
    error::LoadResult,
    status::SaleStatus,
    types::CustomerId,
};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, Transaction, TransactionBehavior,
};
use serde::Serialize;
use std::time::Duration;

mod customer;
mod report;
mod sale;

pub use report::{LateSaleRow, TopCustomerRow};

pub struct LoadStore {
    conn: Connection,
}

impl LoadStore {
    pub fn open(path: &str) -> LoadResult<Self> {
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
    pub fn in_memory() -> LoadResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open the store described by `config` and apply its busy timeout.
    pub fn from_config(config: &StoreConfig) -> LoadResult<Self> {
        let store = if config.path == ":memory:" {
            Self::in_memory()?
        } else {
            Self::open(&config.path)?
        };
        store
            .conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(store)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LoadResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_customers.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_sale_versions.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_load_runs.sql"))?;
        Ok(())
    }

    /// Start the write transaction for one batch.
    ///
    /// IMMEDIATE takes the write lock up front, so a second writer fails
    /// here instead of halfway through the batch.
    pub fn begin(&mut self) -> LoadResult<BatchTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(BatchTx { tx })
    }
}

/// The open transaction of one batch.
pub struct BatchTx<'a> {
    tx: Transaction<'a>,
}

impl BatchTx<'_> {
    pub fn commit(self) -> LoadResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> LoadResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

// ── Row types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRow {
    pub id: CustomerId,
    pub natural_key: String,
    pub name: String,
    pub city: String,
    pub region: Option<String>,
    pub is_valid: bool,
}

impl ToSql for SaleStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SaleStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        SaleStatus::from_stored(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown stored status '{text}'").into()))
    }
}
