//! Read-only queries for the reporting stage. Only current versions count,
//! so a sale with history contributes once.

use super::LoadStore;
use crate::{error::LoadResult, status::SaleStatus, types::CustomerId};
use chrono::{Duration, NaiveDate};
use rusqlite::params;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopCustomerRow {
    pub customer_id: CustomerId,
    pub name: String,
    pub total_amount: f64,
    pub purchase_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LateSaleRow {
    pub customer_id: CustomerId,
    pub name: String,
    pub natural_key: String,
    pub region: Option<String>,
    pub source_sale_id: String,
    pub sale_date: NaiveDate,
    pub status: SaleStatus,
}

impl LoadStore {
    /// Customers ranked by summed amount of sales in `status` whose
    /// sale_date lies in (as_of - window_days ..= as_of).
    pub fn top_customers(
        &self,
        as_of: NaiveDate,
        window_days: i64,
        status: SaleStatus,
        limit: usize,
    ) -> LoadResult<Vec<TopCustomerRow>> {
        let since = as_of - Duration::days(window_days);
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, COALESCE(SUM(v.amount), 0.0), COUNT(v.version_id)
             FROM customers c
             JOIN sale_versions v ON v.customer_id = c.id
             WHERE v.is_current = 1
               AND v.status = ?1
               AND v.sale_date >= ?2 AND v.sale_date <= ?3
             GROUP BY c.id, c.name
             ORDER BY 3 DESC, c.id ASC
             LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![status, since, as_of, limit as i64], |row| {
                Ok(TopCustomerRow {
                    customer_id: row.get(0)?,
                    name: row.get(1)?,
                    total_amount: row.get(2)?,
                    purchase_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sales currently in `status` with sale_date in the trailing window,
    /// joined to their customer.
    pub fn late_sales(
        &self,
        as_of: NaiveDate,
        window_days: i64,
        status: SaleStatus,
    ) -> LoadResult<Vec<LateSaleRow>> {
        let since = as_of - Duration::days(window_days);
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.natural_key, c.region,
                    v.source_sale_id, v.sale_date, v.status
             FROM customers c
             JOIN sale_versions v ON v.customer_id = c.id
             WHERE v.is_current = 1
               AND v.status = ?1
               AND v.sale_date >= ?2 AND v.sale_date <= ?3
             ORDER BY c.id ASC, v.sale_date DESC, v.source_sale_id ASC",
        )?;
        let rows = stmt
            .query_map(params![status, since, as_of], |row| {
                Ok(LateSaleRow {
                    customer_id: row.get(0)?,
                    name: row.get(1)?,
                    natural_key: row.get(2)?,
                    region: row.get(3)?,
                    source_sale_id: row.get(4)?,
                    sale_date: row.get(5)?,
                    status: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
