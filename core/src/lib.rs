//! Reconciliation and SCD2 load stage for customer and sale records.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod record;
pub mod resolver;
pub mod scd2;
pub mod status;
pub mod store;
pub mod types;
pub mod upsert;
