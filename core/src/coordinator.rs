//! Batch coordinator: runs one batch through the load stages.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Intake     validate records, de-duplicate customers by natural key
//!   2. Upsert     insert new customers, first write wins
//!   3. Resolve    map natural key → surrogate id after the upsert
//!   4. Reconcile  SCD2 decision per sale, in batch order
//!   5. Record     persist the batch report to `load_runs`
//!
//! RULES:
//!   - Steps 2–5 share one transaction. Any batch-level error rolls back
//!     every write of the batch; nothing is half-applied.
//!   - Record-level problems never abort the batch. Each one is counted and
//!     listed in the report with its reason.
//!   - One writer at a time. The transaction takes the write lock up front.

use crate::{
    config::LoadConfig,
    error::{LoadError, LoadResult, RejectReason},
    record::{IncomingBatch, RecordKind, RejectedRecord, ValidCustomer},
    resolver::IdentityResolver,
    scd2::{ResolvedSale, SaleOutcome, SaleReconciler},
    store::{BatchTx, LoadStore},
    types::BatchId,
    upsert::{dedupe_by_natural_key, upsert_customers},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub customers_inserted: usize,
    /// Duplicates within the batch plus collisions with stored rows.
    pub customers_skipped: usize,
    /// Customers with no natural key at all.
    pub customers_rejected: usize,
    pub sales_new: usize,
    pub sales_updated: usize,
    pub sales_unchanged: usize,
    /// Malformed sales plus sales whose customer did not resolve.
    pub sales_rejected: usize,
}

impl BatchCounts {
    fn record_sale(&mut self, outcome: SaleOutcome) {
        match outcome {
            SaleOutcome::New       => self.sales_new += 1,
            SaleOutcome::Updated   => self.sales_updated += 1,
            SaleOutcome::Unchanged => self.sales_unchanged += 1,
        }
    }

    /// Rows written to sale_versions by this batch.
    pub fn sale_rows_written(&self) -> usize {
        self.sales_new + 2 * self.sales_updated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub processing_date: NaiveDate,
    pub counts: BatchCounts,
    pub rejected: Vec<RejectedRecord>,
}

pub struct BatchCoordinator {
    config: LoadConfig,
    pub store: LoadStore,
}

impl BatchCoordinator {
    pub fn new(config: LoadConfig, store: LoadStore) -> Self {
        Self { config, store }
    }

    /// Open the configured store, apply migrations, and wire a coordinator.
    pub fn open(config: LoadConfig) -> LoadResult<Self> {
        config
            .validate()
            .map_err(|e| LoadError::Config(e.to_string()))?;
        let store = LoadStore::from_config(&config.store)?;
        store.migrate()?;
        Ok(Self::new(config, store))
    }

    /// In-memory store with default test configuration.
    pub fn build_test() -> LoadResult<Self> {
        Self::open(LoadConfig::default_test())
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Load one batch as of `processing_date`.
    ///
    /// Returns the report on commit. On error nothing from this batch is
    /// left in the store.
    pub fn run(&mut self, batch: &IncomingBatch, processing_date: NaiveDate) -> LoadResult<BatchReport> {
        let records = batch.record_count();
        if records > self.config.max_batch_records {
            return Err(LoadError::BatchTooLarge {
                records,
                limit: self.config.max_batch_records,
            });
        }

        let batch_id: BatchId = format!("batch-{}", uuid::Uuid::new_v4());
        log::info!(
            "{batch_id}: loading {} customers, {} sales as of {processing_date}",
            batch.customers.len(),
            batch.sales.len()
        );

        let mut report = BatchReport {
            batch_id: batch_id.clone(),
            processing_date,
            counts: BatchCounts::default(),
            rejected: Vec::new(),
        };
        let customers = intake_customers(batch, &mut report);

        let mut tx = self.store.begin()?;
        match load_in_tx(&mut tx, batch, customers, &mut report) {
            Ok(()) => {
                tx.commit()?;
                let c = &report.counts;
                log::info!(
                    "{batch_id}: committed customers +{} ~{} !{} | sales new={} updated={} unchanged={} rejected={}",
                    c.customers_inserted,
                    c.customers_skipped,
                    c.customers_rejected,
                    c.sales_new,
                    c.sales_updated,
                    c.sales_unchanged,
                    c.sales_rejected
                );
                Ok(report)
            }
            Err(err) => {
                log::error!("{batch_id}: rolled back: {err}");
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("{batch_id}: explicit rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

/// Validate customers and drop later duplicates of a natural key.
fn intake_customers(batch: &IncomingBatch, report: &mut BatchReport) -> Vec<ValidCustomer> {
    let mut valid = Vec::with_capacity(batch.customers.len());
    for (index, record) in batch.customers.iter().enumerate() {
        match record.validate() {
            Ok(customer) => valid.push(customer),
            Err(reason) => {
                report.counts.customers_rejected += 1;
                reject(report, RecordKind::Customer, index, record.natural_key.clone(), reason);
            }
        }
    }

    let (kept, duplicates) = dedupe_by_natural_key(valid);
    for dup in &duplicates {
        log::debug!("customer {}: duplicate in batch, first occurrence kept", dup.natural_key);
    }
    report.counts.customers_skipped += duplicates.len();
    kept
}

fn load_in_tx(
    tx: &mut BatchTx<'_>,
    batch: &IncomingBatch,
    customers: Vec<ValidCustomer>,
    report: &mut BatchReport,
) -> LoadResult<()> {
    let upserted = upsert_customers(tx, &customers)?;
    report.counts.customers_inserted += upserted.inserted;
    report.counts.customers_skipped += upserted.skipped;

    let resolver = IdentityResolver::load(tx)?;
    let reconciler = SaleReconciler::new(report.processing_date);

    for (index, record) in batch.sales.iter().enumerate() {
        let sale = match record.validate() {
            Ok(sale) => sale,
            Err(reason) => {
                report.counts.sales_rejected += 1;
                reject(report, RecordKind::Sale, index, record.source_sale_id.clone(), reason);
                continue;
            }
        };

        let key = sale.natural_customer_key.as_deref().unwrap_or_default();
        let Some(customer_id) = resolver.resolve(key) else {
            report.counts.sales_rejected += 1;
            let detail = if key.is_empty() {
                format!("sale '{}' has no customer key", sale.source_sale_id)
            } else {
                format!("sale '{}' references unknown customer '{key}'", sale.source_sale_id)
            };
            reject(
                report,
                RecordKind::Sale,
                index,
                Some(sale.source_sale_id.clone()),
                RejectReason::unresolved(detail),
            );
            continue;
        };

        let outcome = reconciler.reconcile(&mut *tx, &ResolvedSale { sale: &sale, customer_id })?;
        report.counts.record_sale(outcome);
    }

    let report_json = serde_json::to_string(&*report)?;
    tx.insert_load_run(&report.batch_id, report.processing_date, &report_json)?;
    Ok(())
}

fn reject(
    report: &mut BatchReport,
    kind: RecordKind,
    index: usize,
    reference: Option<String>,
    reason: RejectReason,
) {
    log::warn!("{}: {kind:?} #{index} rejected: {reason}", report.batch_id);
    report.rejected.push(RejectedRecord {
        kind,
        index,
        reference,
        reason,
    });
}
