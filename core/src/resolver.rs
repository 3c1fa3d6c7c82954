//! Identity resolver: natural key (email) to surrogate customer id.
//!
//! Built once per batch from a full scan of resolvable customers, so sales
//! resolve without a query each. It never assigns ids.

use crate::{
    error::LoadResult,
    record::{is_well_formed_key, normalize_key},
    store::BatchTx,
    types::CustomerId,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    by_key: HashMap<String, CustomerId>,
}

impl IdentityResolver {
    /// Snapshot the stored customer table inside the batch transaction.
    pub fn load(tx: &BatchTx<'_>) -> LoadResult<Self> {
        let resolver = Self::from_pairs(tx.resolvable_customer_keys()?);
        log::debug!("resolver: {} resolvable customers", resolver.len());
        Ok(resolver)
    }

    /// Build from (natural_key, id) pairs. Malformed keys are dropped.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, CustomerId)>,
    {
        let by_key = pairs
            .into_iter()
            .map(|(key, id)| (normalize_key(&key), id))
            .filter(|(key, _)| is_well_formed_key(key))
            .collect();
        Self { by_key }
    }

    /// Exact match on the normalized key. Empty or malformed keys never resolve.
    pub fn resolve(&self, natural_key: &str) -> Option<CustomerId> {
        let key = normalize_key(natural_key);
        if !is_well_formed_key(&key) {
            return None;
        }
        self.by_key.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
