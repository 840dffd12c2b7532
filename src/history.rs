//! Append-only classification history with a single guarded resolution.
//!
//! Each record stores the exact labels used at classification time as a
//! write-once JSON snapshot. The only mutation a record ever sees is
//! [`resolve`], which moves `pending` to a terminal state at most once.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::error::{Error, Result};
use crate::models::{FeedbackState, HistoryRecord, Label};

/// Inserts a pending history record. `labels` is serialized verbatim and
/// never re-derived afterwards.
pub async fn create(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: i64,
    niche_id: Option<i64>,
    confidence: f64,
    labels: &[Label],
    created_at: i64,
) -> Result<i64> {
    let labels_json =
        serde_json::to_string(labels).map_err(|e| Error::InvalidInput(e.to_string()))?;

    let history_id = sqlx::query(
        r#"
        INSERT INTO history (product_id, niche_id, confidence, feedback, labels, created_at)
        VALUES (?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(product_id)
    .bind(niche_id)
    .bind(confidence)
    .bind(labels_json)
    .bind(created_at)
    .execute(&mut **tx)
    .await?
    .last_insert_rowid();

    Ok(history_id)
}

/// Fetches one history record.
pub async fn get(pool: &SqlitePool, history_id: i64) -> Result<HistoryRecord> {
    let row = sqlx::query(
        "SELECT id, product_id, niche_id, confidence, feedback, labels, created_at FROM history WHERE id = ?",
    )
    .bind(history_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("history record {}", history_id)))?;

    decode_record(&row)
}

/// Fetches the most recent history records, newest first.
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<HistoryRecord>> {
    let rows = sqlx::query(
        "SELECT id, product_id, niche_id, confidence, feedback, labels, created_at FROM history ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(decode_record).collect()
}

/// Atomically resolves a pending record and returns its pre-resolution
/// contents (predicted niche and labels snapshot).
///
/// The state transition is a compare-and-set on `feedback = 'pending'`, and
/// it is the first write of the transaction, so of two concurrent resolvers
/// one blocks on the SQLite write lock, re-reads after the winner commits,
/// matches zero rows, and receives [`Error::AlreadyResolved`]. An unknown
/// id yields [`Error::NotFound`]. Nothing else about the record is ever
/// mutated.
pub async fn resolve(
    tx: &mut Transaction<'_, Sqlite>,
    history_id: i64,
    state: FeedbackState,
    corrected_niche_id: Option<i64>,
) -> Result<HistoryRecord> {
    if state == FeedbackState::Pending {
        return Err(Error::InvalidInput(
            "cannot resolve a record back to pending".to_string(),
        ));
    }

    let updated = sqlx::query("UPDATE history SET feedback = ? WHERE id = ? AND feedback = 'pending'")
        .bind(state.as_str())
        .bind(history_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

    if updated == 0 {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM history WHERE id = ?")
            .bind(history_id)
            .fetch_one(&mut **tx)
            .await?;
        return Err(if exists {
            Error::AlreadyResolved(history_id)
        } else {
            Error::NotFound(format!("history record {}", history_id))
        });
    }

    // The row is ours now; niche_id still holds the prediction.
    let row = sqlx::query(
        "SELECT id, product_id, niche_id, confidence, feedback, labels, created_at FROM history WHERE id = ?",
    )
    .bind(history_id)
    .fetch_one(&mut **tx)
    .await?;
    let record = decode_record(&row)?;

    if let Some(niche_id) = corrected_niche_id {
        sqlx::query("UPDATE history SET niche_id = ? WHERE id = ?")
            .bind(niche_id)
            .bind(history_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(record)
}

/// Handler for `niche history`: prints the most recent classifications.
pub async fn run_history(config: &crate::config::Config, limit: i64) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    let records = recent(&pool, limit).await?;

    if records.is_empty() {
        println!("No history.");
        pool.close().await;
        return Ok(());
    }

    for record in &records {
        let niche = match record.niche_id {
            Some(id) => sqlx::query_scalar::<_, String>("SELECT name FROM niches WHERE id = ?")
                .bind(id)
                .fetch_optional(&pool)
                .await?
                .unwrap_or_else(|| format!("niche {}", id)),
            None => crate::classify::UNCLASSIFIED.to_string(),
        };
        let labels: Vec<&str> = record.labels.iter().map(|l| l.label.as_str()).collect();
        println!(
            "{:>4}  {} ({:.2}) [{}] labels: {}",
            record.id,
            niche,
            record.confidence,
            record.feedback.as_str(),
            labels.join(", ")
        );
    }

    pool.close().await;
    Ok(())
}

fn decode_record(row: &SqliteRow) -> Result<HistoryRecord> {
    let feedback_str: String = row.get("feedback");
    let feedback = FeedbackState::parse(&feedback_str)
        .ok_or_else(|| Error::Corrupt(format!("unknown feedback state '{}'", feedback_str)))?;

    let labels_json: String = row.get("labels");
    let labels: Vec<Label> = serde_json::from_str(&labels_json)
        .map_err(|e| Error::Corrupt(format!("labels snapshot: {}", e)))?;

    Ok(HistoryRecord {
        id: row.get("id"),
        product_id: row.get("product_id"),
        niche_id: row.get("niche_id"),
        confidence: row.get("confidence"),
        feedback,
        labels,
        created_at: row.get("created_at"),
    })
}
