//! Customer upsert stage: insert new customers, first write wins.
//!
//! On a natural-key collision with a stored row nothing is written: the
//! stored row is authoritative and the incoming attributes are discarded.
//! The customer table only ever grows.

use crate::{error::LoadResult, record::ValidCustomer, store::BatchTx};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    /// Collisions with an already-stored natural key.
    pub skipped: usize,
}

/// Keep the first occurrence of each natural key, in batch order.
/// Returns (kept, later duplicates).
pub fn dedupe_by_natural_key(
    customers: Vec<ValidCustomer>,
) -> (Vec<ValidCustomer>, Vec<ValidCustomer>) {
    let mut seen = HashSet::new();
    customers
        .into_iter()
        .partition(|c| seen.insert(c.natural_key.clone()))
}

/// Insert each customer unless its key is already stored.
pub fn upsert_customers(tx: &BatchTx<'_>, customers: &[ValidCustomer]) -> LoadResult<UpsertOutcome> {
    let mut outcome = UpsertOutcome::default();
    for customer in customers {
        if tx.insert_customer_if_absent(customer)? {
            outcome.inserted += 1;
        } else {
            log::debug!(
                "customer {}: already stored, incoming attributes discarded",
                customer.natural_key
            );
            outcome.skipped += 1;
        }
    }
    Ok(outcome)
}
