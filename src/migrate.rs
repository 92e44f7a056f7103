use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create orders table. Raw provider payloads are stored verbatim next to
    // the editable QC workflow fields.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qc_orders (
            id TEXT PRIMARY KEY,
            order_no TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'imported',
            completion_status TEXT,
            timestamp INTEGER NOT NULL,
            location_name TEXT NOT NULL DEFAULT 'N/A',
            driver_name TEXT NOT NULL DEFAULT 'N/A',
            notes TEXT,
            has_images INTEGER NOT NULL DEFAULT 0,
            search_response TEXT NOT NULL,
            completion_response TEXT,
            qc_notes TEXT,
            resolution_notes TEXT,
            resolved_at INTEGER,
            resolver_id TEXT,
            imported_at INTEGER NOT NULL,
            UNIQUE(order_no)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_qc_orders_status ON qc_orders(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_qc_orders_timestamp ON qc_orders(timestamp DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_qc_orders_imported_at ON qc_orders(imported_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::debug!("schema up to date");
    Ok(())
}
