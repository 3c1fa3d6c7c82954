//! Integration tests: batch atomicity against a file-backed store.
//!
//! A trigger installed from a second connection makes one insert fail
//! halfway through a batch, after other writes of the same batch have
//! already happened.
//!
//! Tests verify:
//! 1. The failed batch leaves no trace: customers, versions and run ledger
//! 2. A superseded row whose replacement failed is still current
//! 3. The same batch succeeds once the fault is removed
//! 4. A second writer is reported as a connectivity failure
//! 5. An unopenable store path is reported as a connectivity failure

use chrono::NaiveDate;
use salesload_core::{
    config::LoadConfig,
    coordinator::BatchCoordinator,
    error::LoadError,
    record::{CustomerRecord, IncomingBatch, SaleRecord},
    status::SaleStatus,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
}

fn temp_db_path() -> String {
    std::env::temp_dir()
        .join(format!("salesload-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

fn file_config(path: &str, busy_timeout_ms: u64) -> LoadConfig {
    let mut config = LoadConfig::default_test();
    config.store.path = path.to_string();
    config.store.busy_timeout_ms = busy_timeout_ms;
    config
}

fn customer(email: &str, name: &str) -> CustomerRecord {
    CustomerRecord {
        natural_key: Some(email.into()),
        name: name.into(),
        city: "Fortaleza".into(),
        region: Some("CE".into()),
        is_valid: true,
    }
}

fn sale(id: &str, email: &str, status: &str) -> SaleRecord {
    SaleRecord {
        source_sale_id: Some(id.into()),
        natural_customer_key: Some(email.into()),
        sale_date: Some(day(1)),
        amount: Some(80.0),
        status: Some(status.into()),
    }
}

fn day_one() -> IncomingBatch {
    IncomingBatch {
        customers: vec![customer("ana@example.com", "Ana")],
        sales: vec![sale("S1", "ana@example.com", "em transporte")],
    }
}

/// New customer, a new sale for them, then the S1 status change.
fn day_five() -> IncomingBatch {
    IncomingBatch {
        customers: vec![customer("carla@example.com", "Carla")],
        sales: vec![
            sale("S2", "carla@example.com", "pendente"),
            sale("S1", "ana@example.com", "atrasado"),
        ],
    }
}

fn install_fault(path: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER fail_s1_replacement
         BEFORE INSERT ON sale_versions
         WHEN NEW.source_sale_id = 'S1' AND NEW.status = 'atrasado'
         BEGIN
             SELECT RAISE(ABORT, 'connection lost');
         END;",
    )
    .unwrap();
}

fn remove_fault(path: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch("DROP TRIGGER fail_s1_replacement;").unwrap();
}

fn cleanup(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests 1–3: mid-batch failure and recovery
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn failed_replacement_rolls_back_the_whole_batch() {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = temp_db_path();
    let mut engine = BatchCoordinator::open(file_config(&path, 5_000)).unwrap();
    engine.run(&day_one(), day(1)).unwrap();
    let original = engine.store.current_sale_version("S1").unwrap().unwrap();

    install_fault(&path);
    let err = engine.run(&day_five(), day(5)).unwrap_err();
    assert!(matches!(err, LoadError::ConstraintViolation(_)), "got {err:?}");

    // S1 was closed inside the failed transaction; the close must be gone.
    let current = engine.store.current_sale_version("S1").unwrap().unwrap();
    assert_eq!(current, original);
    assert_eq!(current.valid_to, None);
    assert_eq!(current.status, SaleStatus::InTransit);

    assert!(engine.store.customer_by_key("carla@example.com").unwrap().is_none());
    assert!(engine.store.current_sale_version("S2").unwrap().is_none());
    assert_eq!(engine.store.sale_version_count().unwrap(), 1);
    assert_eq!(engine.store.load_run_count().unwrap(), 1);
    assert_eq!(engine.store.multiple_current_count().unwrap(), 0);

    remove_fault(&path);
    let report = engine.run(&day_five(), day(5)).unwrap();
    assert_eq!(report.counts.customers_inserted, 1);
    assert_eq!(report.counts.sales_new, 1);
    assert_eq!(report.counts.sales_updated, 1);

    let history = engine.store.sale_history("S1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].valid_to, Some(day(5)));
    assert_eq!(history[1].status, SaleStatus::Late);
    assert_eq!(engine.store.broken_chain_count().unwrap(), 0);
    assert_eq!(engine.store.load_run_count().unwrap(), 2);

    drop(engine);
    cleanup(&path);
}

#[test]
fn committed_batch_survives_reopening_the_store() {
    let path = temp_db_path();
    {
        let mut engine = BatchCoordinator::open(file_config(&path, 5_000)).unwrap();
        engine.run(&day_one(), day(1)).unwrap();
    }

    let engine = BatchCoordinator::open(file_config(&path, 5_000)).unwrap();
    let current = engine.store.current_sale_version("S1").unwrap().unwrap();
    assert_eq!(current.valid_from, day(1));
    assert_eq!(engine.store.customer_count().unwrap(), 1);

    drop(engine);
    cleanup(&path);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests 4–5: connectivity failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn concurrent_writer_is_a_connectivity_failure() {
    let path = temp_db_path();
    let mut engine = BatchCoordinator::open(file_config(&path, 50)).unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = engine.run(&day_one(), day(1)).unwrap_err();
    assert!(err.is_connectivity(), "got {err:?}");

    other.execute_batch("ROLLBACK;").unwrap();
    drop(other);

    engine.run(&day_one(), day(1)).unwrap();
    assert_eq!(engine.store.sale_version_count().unwrap(), 1);

    drop(engine);
    cleanup(&path);
}

#[test]
fn unopenable_store_is_a_connectivity_failure() {
    let missing_dir = std::env::temp_dir().join(format!("salesload-missing-{}", uuid::Uuid::new_v4()));
    let path = missing_dir.join("sales.db");
    let err = BatchCoordinator::open(file_config(&path.to_string_lossy(), 50))
        .err()
        .expect("open should fail");
    assert!(err.is_connectivity(), "got {err:?}");
}
