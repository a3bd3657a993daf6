//! Aggregate counts over persisted employees.
//!
//! Backs both `GET /stats` and `synchub stats`. Rows with a NULL department
//! or location are bucketed under `"Unknown"`, so each breakdown sums to
//! `total_employees`.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::loaders::{LoaderRegistry, SourceLoader};
use crate::migrate;

pub const UNKNOWN_BUCKET: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub total_employees: i64,
    pub by_department: BTreeMap<String, i64>,
    pub by_location: BTreeMap<String, i64>,
    /// Records currently produced by each given source (not persisted rows).
    pub by_source: BTreeMap<String, usize>,
}

/// Collect the report. `loaders` are the sources whose record counts are
/// reported under `by_source`.
pub async fn collect_stats(
    pool: &SqlitePool,
    loaders: &[Arc<dyn SourceLoader>],
) -> Result<StatsReport> {
    let total_employees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees")
        .fetch_one(pool)
        .await?;

    let by_department = bucket_counts(pool, "department").await?;
    let by_location = bucket_counts(pool, "location").await?;

    let mut by_source = BTreeMap::new();
    for loader in loaders {
        match loader.load().await {
            Ok(records) => {
                by_source.insert(loader.name().to_string(), records.len());
            }
            Err(e) => {
                warn!(source = loader.name(), error = %e, "failed to count source records");
                by_source.insert(loader.name().to_string(), 0);
            }
        }
    }

    Ok(StatsReport {
        total_employees,
        by_department,
        by_location,
        by_source,
    })
}

async fn bucket_counts(pool: &SqlitePool, column: &str) -> Result<BTreeMap<String, i64>> {
    // `column` is one of two fixed identifiers, never user input.
    let sql = format!(
        "SELECT COALESCE({col}, '{unknown}') AS bucket, COUNT(*) AS n \
         FROM employees GROUP BY bucket ORDER BY bucket",
        col = column,
        unknown = UNKNOWN_BUCKET
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("bucket"), row.get::<i64, _>("n")))
        .collect())
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let registry = LoaderRegistry::from_config(config);
    let report = collect_stats(&pool, &registry.all()).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("SyncHub — Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Employees:   {}", report.total_employees);

    print_buckets("By department", "DEPARTMENT", &report.by_department);
    print_buckets("By location", "LOCATION", &report.by_location);

    if !report.by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<24} {:>8}", "SOURCE", "RECORDS");
        println!("  {}", "-".repeat(34));
        for (source, count) in &report.by_source {
            println!("  {:<24} {:>8}", source, count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn print_buckets(title: &str, header: &str, buckets: &BTreeMap<String, i64>) {
    if buckets.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    println!("  {:<24} {:>8}", header, "COUNT");
    println!("  {}", "-".repeat(34));
    for (bucket, count) in buckets {
        println!("  {:<24} {:>8}", bucket, count);
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
