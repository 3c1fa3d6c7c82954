use super::{BatchTx, CustomerRow, LoadStore};
use crate::{error::LoadResult, record::ValidCustomer, types::CustomerId};
use rusqlite::{params, OptionalExtension};

impl BatchTx<'_> {
    // ── Customer ──────────────────────────────────────────────────

    /// Insert a customer unless its natural key is already stored.
    /// Returns false on collision; the stored row is left untouched.
    pub fn insert_customer_if_absent(&self, c: &ValidCustomer) -> LoadResult<bool> {
        let changed = self.tx.execute(
            "INSERT INTO customers (natural_key, name, city, region, is_valid)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (natural_key) DO NOTHING",
            params![c.natural_key, c.name, c.city, c.region, c.is_valid],
        )?;
        Ok(changed == 1)
    }

    /// Full scan of resolvable customers: (natural_key, id).
    pub fn resolvable_customer_keys(&self) -> LoadResult<Vec<(String, CustomerId)>> {
        let mut stmt = self.tx.prepare(
            "SELECT natural_key, id FROM customers WHERE is_valid = 1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl LoadStore {
    pub fn customer_by_key(&self, natural_key: &str) -> LoadResult<Option<CustomerRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, natural_key, name, city, region, is_valid
                 FROM customers WHERE natural_key = ?1",
                params![natural_key],
                |r| {
                    Ok(CustomerRow {
                        id: r.get(0)?,
                        natural_key: r.get(1)?,
                        name: r.get(2)?,
                        city: r.get(3)?,
                        region: r.get(4)?,
                        is_valid: r.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Count total customer rows (test helper).
    pub fn customer_count(&self) -> LoadResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM customers", [], |r| r.get(0))?)
    }
}
