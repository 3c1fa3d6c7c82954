//! Shared primitive types used across the load stage.

/// Store-assigned surrogate key for a customer. Stable for the table's lifetime.
pub type CustomerId = i64;

/// Store-assigned surrogate key for one sale version row.
pub type VersionId = i64;

/// Identifier of a sale in the origin system.
pub type SourceSaleId = String;

/// Identifier of one coordinator run.
pub type BatchId = String;
