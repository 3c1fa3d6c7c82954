//! Incoming records handed over by the extract/validate stage, and the
//! intake checks that turn them into load-ready values.
//!
//! The hand-off format is JSON: `{ "customers": [...], "sales": [...] }`.

use crate::{error::RejectReason, status::SaleStatus, types::SourceSaleId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Region codes are stored as two-character state abbreviations.
pub const REGION_CODE_LEN: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingBatch {
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
    #[serde(default)]
    pub sales: Vec<SaleRecord>,
}

impl IncomingBatch {
    /// Read a batch from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let batch = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(batch)
    }

    pub fn record_count(&self) -> usize {
        self.customers.len() + self.sales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(default, alias = "email")]
    pub natural_key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Upstream validity verdict. Intake can only lower it.
    #[serde(default = "default_valid")]
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    #[serde(default)]
    pub source_sale_id: Option<String>,
    #[serde(default, alias = "email")]
    pub natural_customer_key: Option<String>,
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

fn default_valid() -> bool {
    true
}

/// A customer that passed intake and can be offered to the upsert stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCustomer {
    pub natural_key: String,
    pub name: String,
    pub city: String,
    pub region: Option<String>,
    /// False when the key is malformed or the name is blank. Invalid
    /// customers are stored but never resolve.
    pub is_valid: bool,
}

/// A sale that passed intake. The customer reference is still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSale {
    pub source_sale_id: SourceSaleId,
    pub natural_customer_key: Option<String>,
    pub sale_date: NaiveDate,
    pub amount: Option<f64>,
    pub status: SaleStatus,
}

/// Trim and lowercase a natural key.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A normalized key is usable for resolution when it looks like an email.
pub fn is_well_formed_key(key: &str) -> bool {
    !key.is_empty() && key != "nan" && key.contains('@')
}

impl CustomerRecord {
    pub fn validate(&self) -> Result<ValidCustomer, RejectReason> {
        let natural_key = self
            .natural_key
            .as_deref()
            .map(normalize_key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RejectReason::malformed("customer has no natural key"))?;

        let name = self.name.trim().to_string();
        let region = self
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| r.chars().take(REGION_CODE_LEN).collect::<String>());

        let is_valid = self.is_valid && is_well_formed_key(&natural_key) && !name.is_empty();

        Ok(ValidCustomer {
            natural_key,
            name,
            city: self.city.trim().to_string(),
            region,
            is_valid,
        })
    }
}

impl SaleRecord {
    pub fn validate(&self) -> Result<ValidSale, RejectReason> {
        let source_sale_id = self
            .source_sale_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RejectReason::malformed("sale has no source_sale_id"))?
            .to_string();

        let sale_date = self.sale_date.ok_or_else(|| {
            RejectReason::malformed(format!("sale '{source_sale_id}' has no sale_date"))
        })?;

        let raw_status = self.status.as_deref().unwrap_or_default();
        let status = SaleStatus::canonicalize(raw_status).ok_or_else(|| {
            RejectReason::malformed(format!(
                "sale '{source_sale_id}' has unrecognised status '{raw_status}'"
            ))
        })?;

        if let Some(amount) = self.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(RejectReason::malformed(format!(
                    "sale '{source_sale_id}' has invalid amount {amount}"
                )));
            }
        }

        Ok(ValidSale {
            source_sale_id,
            natural_customer_key: self.natural_customer_key.as_deref().map(normalize_key),
            sale_date,
            amount: self.amount,
            status,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Customer,
    Sale,
}

/// One record excluded from a batch, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub kind: RecordKind,
    /// Position of the record in its batch list.
    pub index: usize,
    /// Natural key or source sale id, when the record carried one.
    pub reference: Option<String>,
    pub reason: RejectReason,
}
