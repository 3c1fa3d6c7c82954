//! Canonical order-status vocabulary.
//!
//! Raw statuses arrive in many spellings. The reconciler only ever compares
//! canonical values, so every raw string is mapped here first.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleStatus {
    #[serde(rename = "entregue")]
    Delivered,
    #[serde(rename = "em transporte")]
    InTransit,
    #[serde(rename = "atrasado")]
    Late,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 3] = [SaleStatus::Delivered, SaleStatus::InTransit, SaleStatus::Late];

    /// The stored form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Delivered => "entregue",
            SaleStatus::InTransit => "em transporte",
            SaleStatus::Late      => "atrasado",
        }
    }

    /// Map a raw status string onto the closed vocabulary.
    /// Matching is done after trimming and lowercasing.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "concluído" | "concluido" | "finalizado" | "entregue" => Some(SaleStatus::Delivered),
            "pendente" | "em trânsito" | "em transito" | "encaminhado" | "em transporte" => {
                Some(SaleStatus::InTransit)
            }
            "atrasado" => Some(SaleStatus::Late),
            _ => None,
        }
    }

    /// Parse an already-canonical stored value.
    pub fn from_stored(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
