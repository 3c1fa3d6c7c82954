//! Sale reconciler: type 2 slowly-changing-dimension versioning of sales.
//!
//! For each incoming sale, keyed by `source_sale_id`:
//!   1. Look up the current version (is_current = true).
//!   2. None            → insert a current row valid from the processing date.   NEW
//!   3. Same status     → no write.                                              UNCHANGED
//!   4. Status differs  → close the current row at the processing date, then
//!                        insert a new current row valid from that date.         UPDATED
//!
//! RULES:
//!   - Rows are never overwritten in place. Only `valid_to`/`is_current` of the
//!     current row change, and only when it is being superseded.
//!   - A closed row's `valid_to` equals its successor's `valid_from`.
//!   - Only the canonical status is compared. Amount and date changes alone do
//!     not produce a version.
//!   - Close-then-insert is one unit. The reconciler does not undo a close if
//!     the insert fails; the enclosing batch transaction does.

use crate::{
    error::{LoadError, LoadResult},
    record::ValidSale,
    status::SaleStatus,
    types::{CustomerId, SourceSaleId, VersionId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One persisted version of a sale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleVersion {
    pub version_id: VersionId,
    pub source_sale_id: SourceSaleId,
    pub customer_id: CustomerId,
    pub sale_date: NaiveDate,
    pub amount: Option<f64>,
    pub status: SaleStatus,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub is_current: bool,
}

impl SaleVersion {
    /// Whether `date` falls inside [valid_from, valid_to).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && self.valid_to.map_or(true, |to| date < to)
    }
}

/// A version row about to be inserted as current.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSaleVersion {
    pub source_sale_id: SourceSaleId,
    pub customer_id: CustomerId,
    pub sale_date: NaiveDate,
    pub amount: Option<f64>,
    pub status: SaleStatus,
    pub valid_from: NaiveDate,
}

/// An incoming sale whose customer reference has been resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSale<'a> {
    pub sale: &'a ValidSale,
    pub customer_id: CustomerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleOutcome {
    New,
    Unchanged,
    Updated,
}

/// The writes one decision requires.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationPlan {
    Nothing,
    Insert(NewSaleVersion),
    Supersede {
        close: VersionId,
        valid_to: NaiveDate,
        insert: NewSaleVersion,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: SaleOutcome,
    pub plan: MutationPlan,
}

/// Decide what to do with `incoming` given the current version, if any.
///
/// Pure: reads nothing, writes nothing. Fails only when superseding would
/// close a row before it opened.
pub fn decide(
    previous: Option<&SaleVersion>,
    incoming: &ResolvedSale<'_>,
    as_of: NaiveDate,
) -> LoadResult<Decision> {
    let fresh = || NewSaleVersion {
        source_sale_id: incoming.sale.source_sale_id.clone(),
        customer_id: incoming.customer_id,
        sale_date: incoming.sale.sale_date,
        amount: incoming.sale.amount,
        status: incoming.sale.status,
        valid_from: as_of,
    };

    let Some(current) = previous else {
        return Ok(Decision {
            outcome: SaleOutcome::New,
            plan: MutationPlan::Insert(fresh()),
        });
    };

    if current.status == incoming.sale.status {
        return Ok(Decision {
            outcome: SaleOutcome::Unchanged,
            plan: MutationPlan::Nothing,
        });
    }

    if as_of < current.valid_from {
        return Err(LoadError::ProcessingDateRegression {
            source_sale_id: current.source_sale_id.clone(),
            valid_from: current.valid_from,
            as_of,
        });
    }

    Ok(Decision {
        outcome: SaleOutcome::Updated,
        plan: MutationPlan::Supersede {
            close: current.version_id,
            valid_to: as_of,
            insert: fresh(),
        },
    })
}

/// What the reconciler needs from storage.
pub trait VersionStore {
    /// The row with is_current = true for this sale, if any.
    fn current_version(&self, source_sale_id: &str) -> LoadResult<Option<SaleVersion>>;

    /// Set valid_to and clear is_current on a current row.
    fn close_version(&mut self, version_id: VersionId, valid_to: NaiveDate) -> LoadResult<()>;

    /// Insert a new current row. Returns its surrogate id.
    fn insert_version(&mut self, version: &NewSaleVersion) -> LoadResult<VersionId>;
}

/// Execute a plan against a store. Close always precedes insert so the
/// one-current-row constraint holds between the two writes.
pub fn apply_plan<S: VersionStore + ?Sized>(store: &mut S, plan: &MutationPlan) -> LoadResult<()> {
    match plan {
        MutationPlan::Nothing => {}
        MutationPlan::Insert(version) => {
            store.insert_version(version)?;
        }
        MutationPlan::Supersede {
            close,
            valid_to,
            insert,
        } => {
            store.close_version(*close, *valid_to)?;
            store.insert_version(insert)?;
        }
    }
    Ok(())
}

/// Applies decisions for one processing date.
pub struct SaleReconciler {
    as_of: NaiveDate,
}

impl SaleReconciler {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Run steps 1–4 for one sale. Records for the same sale must be fed in
    /// batch order; each call sees the writes of the previous one.
    pub fn reconcile<S: VersionStore + ?Sized>(
        &self,
        store: &mut S,
        incoming: &ResolvedSale<'_>,
    ) -> LoadResult<SaleOutcome> {
        let previous = store.current_version(&incoming.sale.source_sale_id)?;
        let decision = decide(previous.as_ref(), incoming, self.as_of)?;
        apply_plan(store, &decision.plan)?;
        log::debug!(
            "as_of={} sale {}: {:?} ({})",
            self.as_of,
            incoming.sale.source_sale_id,
            decision.outcome,
            incoming.sale.status
        );
        Ok(decision.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Vec-backed store with an optional failure between close and insert.
    #[derive(Default)]
    struct MemoryVersions {
        rows: Vec<SaleVersion>,
        fail_next_insert: bool,
        writes: usize,
    }

    impl VersionStore for MemoryVersions {
        fn current_version(&self, source_sale_id: &str) -> LoadResult<Option<SaleVersion>> {
            Ok(self
                .rows
                .iter()
                .find(|r| r.is_current && r.source_sale_id == source_sale_id)
                .cloned())
        }

        fn close_version(&mut self, version_id: VersionId, valid_to: NaiveDate) -> LoadResult<()> {
            let row = self
                .rows
                .iter_mut()
                .find(|r| r.version_id == version_id && r.is_current)
                .ok_or_else(|| LoadError::Other(anyhow::anyhow!("no current row {version_id}")))?;
            row.valid_to = Some(valid_to);
            row.is_current = false;
            self.writes += 1;
            Ok(())
        }

        fn insert_version(&mut self, v: &NewSaleVersion) -> LoadResult<VersionId> {
            if self.fail_next_insert {
                self.fail_next_insert = false;
                return Err(LoadError::Other(anyhow::anyhow!("connection reset")));
            }
            let version_id = self.rows.len() as VersionId + 1;
            self.rows.push(SaleVersion {
                version_id,
                source_sale_id: v.source_sale_id.clone(),
                customer_id: v.customer_id,
                sale_date: v.sale_date,
                amount: v.amount,
                status: v.status,
                valid_from: v.valid_from,
                valid_to: None,
                is_current: true,
            });
            self.writes += 1;
            Ok(version_id)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn sale(id: &str, status: SaleStatus, amount: f64) -> ValidSale {
        ValidSale {
            source_sale_id: id.into(),
            natural_customer_key: Some("ana@example.com".into()),
            sale_date: day(1),
            amount: Some(amount),
            status,
        }
    }

    fn resolved(sale: &ValidSale) -> ResolvedSale<'_> {
        ResolvedSale { sale, customer_id: 7 }
    }

    #[test]
    fn first_sighting_plans_a_current_insert() {
        let s = sale("S1", SaleStatus::InTransit, 10.0);
        let d = decide(None, &resolved(&s), day(1)).unwrap();
        assert_eq!(d.outcome, SaleOutcome::New);
        match d.plan {
            MutationPlan::Insert(v) => {
                assert_eq!(v.valid_from, day(1));
                assert_eq!(v.customer_id, 7);
                assert_eq!(v.status, SaleStatus::InTransit);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn amount_change_without_status_change_is_unchanged() {
        let mut store = MemoryVersions::default();
        let reconciler = SaleReconciler::new(day(1));
        let first = sale("S1", SaleStatus::InTransit, 10.0);
        reconciler.reconcile(&mut store, &resolved(&first)).unwrap();

        let previous = store.current_version("S1").unwrap();
        let repriced = sale("S1", SaleStatus::InTransit, 99.0);
        let d = decide(previous.as_ref(), &resolved(&repriced), day(3)).unwrap();
        assert_eq!(d.outcome, SaleOutcome::Unchanged);
        assert_eq!(d.plan, MutationPlan::Nothing);
    }

    #[test]
    fn status_change_supersedes_current_row() {
        let mut store = MemoryVersions::default();
        let first = sale("S1", SaleStatus::InTransit, 10.0);
        let late = sale("S1", SaleStatus::Late, 10.0);

        assert_eq!(
            SaleReconciler::new(day(1)).reconcile(&mut store, &resolved(&first)).unwrap(),
            SaleOutcome::New
        );
        assert_eq!(
            SaleReconciler::new(day(5)).reconcile(&mut store, &resolved(&late)).unwrap(),
            SaleOutcome::Updated
        );

        assert_eq!(store.rows.len(), 2);
        let (old, new) = (&store.rows[0], &store.rows[1]);
        assert!(!old.is_current);
        assert_eq!(old.valid_to, Some(day(5)));
        assert_eq!(old.status, SaleStatus::InTransit);
        assert!(new.is_current);
        assert_eq!(new.valid_from, day(5));
        assert_eq!(new.valid_to, None);
        assert_eq!(new.status, SaleStatus::Late);
        assert!(old.covers(day(4)) && !old.covers(day(5)));
        assert!(new.covers(day(5)));
    }

    #[test]
    fn repeated_records_apply_in_order_within_one_run() {
        let mut store = MemoryVersions::default();
        let reconciler = SaleReconciler::new(day(2));
        let a = sale("S9", SaleStatus::InTransit, 1.0);
        let b = sale("S9", SaleStatus::Delivered, 1.0);

        let outcomes: Vec<_> = [&a, &b, &b]
            .into_iter()
            .map(|s| reconciler.reconcile(&mut store, &resolved(s)).unwrap())
            .collect();

        assert_eq!(
            outcomes,
            vec![SaleOutcome::New, SaleOutcome::Updated, SaleOutcome::Unchanged]
        );
        assert_eq!(store.rows.iter().filter(|r| r.is_current).count(), 1);
        assert_eq!(store.rows[0].valid_to, Some(store.rows[1].valid_from));
    }

    #[test]
    fn unchanged_rerun_writes_nothing() {
        let mut store = MemoryVersions::default();
        let s = sale("S1", SaleStatus::Delivered, 5.0);
        SaleReconciler::new(day(1)).reconcile(&mut store, &resolved(&s)).unwrap();
        let writes = store.writes;

        let outcome = SaleReconciler::new(day(8)).reconcile(&mut store, &resolved(&s)).unwrap();
        assert_eq!(outcome, SaleOutcome::Unchanged);
        assert_eq!(store.writes, writes);
    }

    #[test]
    fn processing_date_before_current_version_is_refused() {
        let mut store = MemoryVersions::default();
        let first = sale("S1", SaleStatus::InTransit, 10.0);
        SaleReconciler::new(day(5)).reconcile(&mut store, &resolved(&first)).unwrap();

        let late = sale("S1", SaleStatus::Late, 10.0);
        let err = SaleReconciler::new(day(3))
            .reconcile(&mut store, &resolved(&late))
            .unwrap_err();
        assert!(matches!(err, LoadError::ProcessingDateRegression { .. }));
        assert_eq!(store.rows.len(), 1);
        assert!(store.rows[0].is_current);
    }

    #[test]
    fn failed_insert_after_close_surfaces_the_error() {
        let mut store = MemoryVersions::default();
        let first = sale("S1", SaleStatus::InTransit, 10.0);
        SaleReconciler::new(day(1)).reconcile(&mut store, &resolved(&first)).unwrap();

        store.fail_next_insert = true;
        let late = sale("S1", SaleStatus::Late, 10.0);
        let result = SaleReconciler::new(day(5)).reconcile(&mut store, &resolved(&late));

        // The stub has no transaction, so the close is visible here; the
        // coordinator relies on the batch transaction to discard it.
        assert!(result.is_err());
        assert!(store.current_version("S1").unwrap().is_none());
    }
}
