//! Database statistics.
//!
//! Summarizes what has been imported: order counts per QC status, the
//! database file size, and when the last import happened. Used by
//! `fqc stats` to confirm that imports are landing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
    pub last_import_ts: Option<i64>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<OrderStats> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qc_orders")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT status, COUNT(*) AS count
        FROM qc_orders
        GROUP BY status
        ORDER BY count DESC, status ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_status = rows
        .iter()
        .map(|row| StatusCount {
            status: row.get("status"),
            count: row.get("count"),
        })
        .collect();

    let last_import_ts: Option<i64> = sqlx::query_scalar("SELECT MAX(imported_at) FROM qc_orders")
        .fetch_one(pool)
        .await?;

    Ok(OrderStats {
        total,
        by_status,
        last_import_ts,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("fieldqc: Database Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Orders:      {}", stats.total);
    println!(
        "  Last import: {}",
        stats
            .last_import_ts
            .map(|ts| format_last_import(ts, Utc::now()))
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.by_status.is_empty() {
        println!();
        println!("  By QC status:");
        println!("  {:<12} {:>8}", "STATUS", "ORDERS");
        println!("  {}", "-".repeat(21));
        for s in &stats.by_status {
            println!("  {:<12} {:>8}", s.status, s.count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Last import time as UTC plus its age, e.g. `2024-03-04 14:00 UTC (2h ago)`.
fn format_last_import(ts: i64, now: DateTime<Utc>) -> String {
    let Some(at) = DateTime::from_timestamp(ts, 0) else {
        return ts.to_string();
    };
    let stamp = at.format("%Y-%m-%d %H:%M UTC");
    let age = now.signed_duration_since(at);
    if age.num_seconds() < 0 {
        return stamp.to_string();
    }
    let ago = match (age.num_days(), age.num_hours(), age.num_minutes()) {
        (d, _, _) if d > 0 => format!("{}d ago", d),
        (_, h, _) if h > 0 => format!("{}h ago", h),
        (_, _, m) if m > 0 => format!("{}m ago", m),
        _ => "just now".to_string(),
    };
    format!("{} ({})", stamp, ago)
}
