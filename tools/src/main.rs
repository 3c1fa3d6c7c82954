//! load-runner: headless batch loader.
//!
//! Usage:
//!   load-runner --batch batch.json --date 2025-09-05 --db sales.db
//!   load-runner --batch batch.json --config load.json --report
//!
//! `--db` overrides `store.path` from the config file. Without either the
//! load goes to an in-memory database and is discarded on exit.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use salesload_core::{
    config::LoadConfig,
    coordinator::{BatchCoordinator, BatchReport},
    record::IncomingBatch,
};
use std::env;

const VALUE_FLAGS: [&str; 4] = ["--batch", "--date", "--config", "--db"];
const SWITCHES: [&str; 2] = ["--report", "--json"];

#[derive(serde::Serialize)]
struct ReportOutput<'a> {
    batch: &'a BatchReport,
    top_customers: Vec<salesload_core::store::TopCustomerRow>,
    late_sales: Vec<salesload_core::store::LateSaleRow>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    warn_unknown_args(&args);
    let batch_path = flag_value(&args, "--batch").context("--batch <file.json> is required")?;
    let processing_date = match flag_value(&args, "--date") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("--date must be YYYY-MM-DD, got '{raw}'"))?,
        None => chrono::Local::now().date_naive(),
    };
    let with_report = args.iter().any(|a| a == "--report");
    let json_output = args.iter().any(|a| a == "--json");

    let mut config = match flag_value(&args, "--config") {
        Some(path) => LoadConfig::load(path)?,
        None => LoadConfig::default_test(),
    };
    if let Some(db) = flag_value(&args, "--db") {
        log::debug!("store.path overridden by --db: {db}");
        config.store.path = db.to_string();
    }

    if !json_output {
        println!("load-runner");
        println!("  batch:     {batch_path}");
        println!("  date:      {processing_date}");
        println!("  db:        {}", config.store.path);
        println!();
    }

    let batch = IncomingBatch::load(batch_path)?;
    let mut coordinator = BatchCoordinator::open(config)?;
    let report = coordinator.run(&batch, processing_date)?;

    if json_output {
        let (top_customers, late_sales) = if with_report {
            downstream_queries(&coordinator, processing_date)?
        } else {
            (Vec::new(), Vec::new())
        };
        let out = ReportOutput {
            batch: &report,
            top_customers,
            late_sales,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_summary(&report);
    if with_report {
        print_downstream(&coordinator, processing_date)?;
    }
    Ok(())
}

fn downstream_queries(
    coordinator: &BatchCoordinator,
    as_of: NaiveDate,
) -> Result<(
    Vec<salesload_core::store::TopCustomerRow>,
    Vec<salesload_core::store::LateSaleRow>,
)> {
    let r = &coordinator.config().reporting;
    let top = coordinator
        .store
        .top_customers(as_of, r.top_window_days, r.terminal_status, r.top_n)?;
    let late = coordinator
        .store
        .late_sales(as_of, r.late_window_days, r.late_status)?;
    Ok((top, late))
}

fn print_summary(report: &BatchReport) {
    let c = &report.counts;
    println!("=== BATCH SUMMARY ===");
    println!("  batch_id:            {}", report.batch_id);
    println!("  processing date:     {}", report.processing_date);
    println!("  customers inserted:  {}", c.customers_inserted);
    println!("  customers skipped:   {}", c.customers_skipped);
    println!("  customers rejected:  {}", c.customers_rejected);
    println!("  sales new:           {}", c.sales_new);
    println!("  sales updated:       {}", c.sales_updated);
    println!("  sales unchanged:     {}", c.sales_unchanged);
    println!("  sales rejected:      {}", c.sales_rejected);

    if !report.rejected.is_empty() {
        println!();
        println!("=== REJECTED RECORDS ===");
        for r in &report.rejected {
            println!(
                "  {:?} #{} [{}]: {}",
                r.kind,
                r.index,
                r.reference.as_deref().unwrap_or("-"),
                r.reason
            );
        }
    }
}

fn print_downstream(coordinator: &BatchCoordinator, as_of: NaiveDate) -> Result<()> {
    let r = &coordinator.config().reporting;
    let (top, late) = downstream_queries(coordinator, as_of)?;

    println!();
    println!(
        "=== TOP {} CUSTOMERS ({} days, status '{}') ===",
        r.top_n, r.top_window_days, r.terminal_status
    );
    if top.is_empty() {
        println!("  (no qualifying sales)");
    }
    for row in &top {
        println!(
            "  #{:<6} {:<30} ${:>12.2}  ({} purchases)",
            row.customer_id, row.name, row.total_amount, row.purchase_count
        );
    }

    println!();
    println!("=== LATE SALES ({} days) ===", r.late_window_days);
    if late.is_empty() {
        println!("  (none)");
    }
    for row in &late {
        println!(
            "  #{:<6} {:<30} {:<28} {:<3} {} {}",
            row.customer_id,
            row.name,
            row.natural_key,
            row.region.as_deref().unwrap_or("--"),
            row.source_sale_id,
            row.sale_date
        );
    }
    Ok(())
}

fn warn_unknown_args(args: &[String]) {
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            rest.next();
        } else if !SWITCHES.contains(&arg.as_str()) {
            log::warn!("Unknown argument: {arg}");
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
