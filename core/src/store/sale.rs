use super::{BatchTx, LoadStore};
use crate::{
    error::LoadResult,
    scd2::{NewSaleVersion, SaleVersion, VersionStore},
    types::VersionId,
};
use chrono::NaiveDate;
use rusqlite::{ffi, params, Connection, OptionalExtension};

const SALE_VERSION_COLUMNS: &str = "version_id, source_sale_id, customer_id, sale_date, amount,
                                    status, valid_from, valid_to, is_current";

fn map_sale_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<SaleVersion> {
    Ok(SaleVersion {
        version_id: row.get(0)?,
        source_sale_id: row.get(1)?,
        customer_id: row.get(2)?,
        sale_date: row.get(3)?,
        amount: row.get(4)?,
        status: row.get(5)?,
        valid_from: row.get(6)?,
        valid_to: row.get(7)?,
        is_current: row.get(8)?,
    })
}

fn query_current_version(conn: &Connection, source_sale_id: &str) -> LoadResult<Option<SaleVersion>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SALE_VERSION_COLUMNS} FROM sale_versions
                 WHERE source_sale_id = ?1 AND is_current = 1"
            ),
            params![source_sale_id],
            map_sale_version,
        )
        .optional()?;
    Ok(row)
}

/// The row we were about to close is no longer current: someone else wrote it.
fn lost_current_row(version_id: VersionId) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        ffi::Error::new(ffi::SQLITE_CONSTRAINT),
        Some(format!("sale version {version_id} is no longer current")),
    )
}

impl BatchTx<'_> {
    // ── Sale versions ─────────────────────────────────────────────

    pub fn current_sale_version(&self, source_sale_id: &str) -> LoadResult<Option<SaleVersion>> {
        query_current_version(&self.tx, source_sale_id)
    }

    pub fn insert_sale_version(&self, v: &NewSaleVersion) -> LoadResult<VersionId> {
        self.tx.execute(
            "INSERT INTO sale_versions
             (source_sale_id, customer_id, sale_date, amount, status,
              valid_from, valid_to, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 1)",
            params![
                v.source_sale_id,
                v.customer_id,
                v.sale_date,
                v.amount,
                v.status,
                v.valid_from,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Close a current row. Fails as a constraint violation if the row is
    /// not current any more.
    pub fn close_sale_version(&self, version_id: VersionId, valid_to: NaiveDate) -> LoadResult<()> {
        let changed = self.tx.execute(
            "UPDATE sale_versions SET valid_to = ?1, is_current = 0
             WHERE version_id = ?2 AND is_current = 1",
            params![valid_to, version_id],
        )?;
        if changed != 1 {
            return Err(lost_current_row(version_id).into());
        }
        Ok(())
    }

    // ── Load runs ─────────────────────────────────────────────────

    pub fn insert_load_run(
        &self,
        batch_id: &str,
        processing_date: NaiveDate,
        report_json: &str,
    ) -> LoadResult<()> {
        self.tx.execute(
            "INSERT INTO load_runs (batch_id, processing_date, report_json) VALUES (?1, ?2, ?3)",
            params![batch_id, processing_date, report_json],
        )?;
        Ok(())
    }
}

impl VersionStore for BatchTx<'_> {
    fn current_version(&self, source_sale_id: &str) -> LoadResult<Option<SaleVersion>> {
        self.current_sale_version(source_sale_id)
    }

    fn close_version(&mut self, version_id: VersionId, valid_to: NaiveDate) -> LoadResult<()> {
        self.close_sale_version(version_id, valid_to)
    }

    fn insert_version(&mut self, version: &NewSaleVersion) -> LoadResult<VersionId> {
        self.insert_sale_version(version)
    }
}

impl LoadStore {
    pub fn current_sale_version(&self, source_sale_id: &str) -> LoadResult<Option<SaleVersion>> {
        query_current_version(&self.conn, source_sale_id)
    }

    /// Every version of a sale, oldest first.
    pub fn sale_history(&self, source_sale_id: &str) -> LoadResult<Vec<SaleVersion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SALE_VERSION_COLUMNS} FROM sale_versions
             WHERE source_sale_id = ?1
             ORDER BY valid_from ASC, version_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![source_sale_id], map_sale_version)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The version whose [valid_from, valid_to) interval contains `date`.
    pub fn sale_as_of(&self, source_sale_id: &str, date: NaiveDate) -> LoadResult<Option<SaleVersion>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SALE_VERSION_COLUMNS} FROM sale_versions
                     WHERE source_sale_id = ?1
                       AND valid_from <= ?2
                       AND (valid_to IS NULL OR valid_to > ?2)
                     ORDER BY version_id DESC LIMIT 1"
                ),
                params![source_sale_id, date],
                map_sale_version,
            )
            .optional()?;
        Ok(row)
    }

    /// Count total sale_versions rows (test helper).
    pub fn sale_version_count(&self) -> LoadResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM sale_versions", [], |r| r.get(0))?)
    }

    /// Number of sales with more than one current row. Always 0 when the
    /// store is consistent.
    pub fn multiple_current_count(&self) -> LoadResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM (
                 SELECT source_sale_id FROM sale_versions
                 WHERE is_current = 1
                 GROUP BY source_sale_id HAVING COUNT(*) > 1
             )",
            [],
            |r| r.get(0),
        )?)
    }

    /// Closed rows whose valid_to does not match the next version's valid_from.
    pub fn broken_chain_count(&self) -> LoadResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM sale_versions closed
             WHERE closed.is_current = 0
               AND NOT EXISTS (
                   SELECT 1 FROM sale_versions next
                   WHERE next.source_sale_id = closed.source_sale_id
                     AND next.version_id > closed.version_id
                     AND next.valid_from = closed.valid_to
               )",
            [],
            |r| r.get(0),
        )?)
    }

    pub fn load_run_count(&self) -> LoadResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM load_runs", [], |r| r.get(0))?)
    }
}
