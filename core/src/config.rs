use crate::status::SaleStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path, or `:memory:`.
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub top_n: usize,
    pub top_window_days: i64,
    pub late_window_days: i64,
    pub terminal_status: SaleStatus,
    pub late_status: SaleStatus,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            top_window_days: 7,
            late_window_days: 30,
            terminal_status: SaleStatus::Delivered,
            late_status: SaleStatus::Late,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub store: StoreConfig,
    /// Upper bound on customers + sales in one batch.
    #[serde(default = "default_max_batch_records")]
    pub max_batch_records: usize,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_batch_records() -> usize {
    50_000
}

impl LoadConfig {
    /// Load from a JSON config file.
    /// In tests, use LoadConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LoadConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory store, default limits.
    pub fn default_test() -> Self {
        Self {
            store: StoreConfig {
                path: ":memory:".into(),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            max_batch_records: default_max_batch_records(),
            reporting: ReportingConfig::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.path.trim().is_empty() {
            anyhow::bail!("store.path must not be empty");
        }
        if self.max_batch_records == 0 {
            anyhow::bail!("max_batch_records must be greater than zero");
        }
        if self.reporting.top_window_days < 0 || self.reporting.late_window_days < 0 {
            anyhow::bail!("reporting windows must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: LoadConfig = serde_json::from_str(r#"{ "store": { "path": "sales.db" } }"#).unwrap();
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.max_batch_records, 50_000);
        assert_eq!(config.reporting.top_n, 10);
        assert_eq!(config.reporting.terminal_status, SaleStatus::Delivered);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reporting_statuses_use_canonical_names() {
        let config: LoadConfig = serde_json::from_str(
            r#"{ "store": { "path": "x.db" },
                 "reporting": { "top_n": 3, "top_window_days": 14, "late_window_days": 60,
                                "terminal_status": "entregue", "late_status": "atrasado" } }"#,
        )
        .unwrap();
        assert_eq!(config.reporting.top_n, 3);
        assert_eq!(config.reporting.late_status, SaleStatus::Late);
    }

    #[test]
    fn zero_batch_limit_is_rejected() {
        let mut config = LoadConfig::default_test();
        config.max_batch_records = 0;
        assert!(config.validate().is_err());
    }
}
