use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates all tables and indexes. Idempotent; safe to run at every startup.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Uploaded products. Created once per upload, never mutated.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_path TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Commerce niches. Seeded administratively; read by the classifier.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS niches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Weighted keyword terms, each owned by exactly one niche.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            niche_id INTEGER NOT NULL,
            keyword TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            UNIQUE(niche_id, keyword),
            FOREIGN KEY (niche_id) REFERENCES niches(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Classification audit log. Append-only; the only permitted mutation is
    // the single feedback resolution guarded by the pending state.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL,
            niche_id INTEGER,
            confidence REAL NOT NULL,
            feedback TEXT NOT NULL DEFAULT 'pending',
            labels TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id),
            FOREIGN KEY (niche_id) REFERENCES niches(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keywords_niche_id ON keywords(niche_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_product_id ON history(product_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
