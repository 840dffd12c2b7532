//! The niche lexicon: every niche with its weighted keyword terms.
//!
//! Classification reads a consistent point-in-time [`LexiconSnapshot`];
//! feedback mutates individual keyword weights through [`adjust_weight`],
//! a single row-addressed read-modify-write that clamps into the configured
//! bounds. Clamping at a bound is absorption, not an error.

use sqlx::{Row, Sqlite, SqlitePool};

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::models::{Keyword, Niche};

/// Inclusive weight bounds for keyword adjustments.
#[derive(Debug, Clone, Copy)]
pub struct WeightBounds {
    pub epsilon: f64,
    pub max_weight: f64,
}

impl From<&ClassifierConfig> for WeightBounds {
    fn from(cfg: &ClassifierConfig) -> Self {
        Self {
            epsilon: cfg.epsilon,
            max_weight: cfg.max_weight,
        }
    }
}

/// A consistent point-in-time read of the full niche/keyword mapping.
#[derive(Debug, Clone, Default)]
pub struct LexiconSnapshot {
    pub niches: Vec<Niche>,
    pub keywords: Vec<Keyword>,
}

impl LexiconSnapshot {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn niche(&self, niche_id: i64) -> Option<&Niche> {
        self.niches.iter().find(|n| n.id == niche_id)
    }

    pub fn keywords_for(&self, niche_id: i64) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter().filter(move |k| k.niche_id == niche_id)
    }
}

/// Loads the full lexicon in one transaction so the classifier scores
/// against a single consistent view even while feedback runs concurrently.
pub async fn snapshot(pool: &SqlitePool) -> Result<LexiconSnapshot> {
    let mut tx = pool.begin().await?;

    let niche_rows = sqlx::query("SELECT id, name, description FROM niches ORDER BY name ASC")
        .fetch_all(&mut *tx)
        .await?;

    let keyword_rows =
        sqlx::query("SELECT id, niche_id, keyword, weight FROM keywords ORDER BY id ASC")
            .fetch_all(&mut *tx)
            .await?;

    tx.commit().await?;

    let niches = niche_rows
        .iter()
        .map(|row| Niche {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
        })
        .collect();

    let keywords = keyword_rows
        .iter()
        .map(|row| Keyword {
            id: row.get("id"),
            niche_id: row.get("niche_id"),
            term: row.get("keyword"),
            weight: row.get("weight"),
        })
        .collect();

    Ok(LexiconSnapshot { niches, keywords })
}

/// Loads the keywords of a single niche.
pub async fn keywords_of_niche<'e, E>(db: E, niche_id: i64) -> Result<Vec<Keyword>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT id, niche_id, keyword, weight FROM keywords WHERE niche_id = ? ORDER BY id ASC",
    )
    .bind(niche_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Keyword {
            id: row.get("id"),
            niche_id: row.get("niche_id"),
            term: row.get("keyword"),
            weight: row.get("weight"),
        })
        .collect())
}

/// Applies a bounded weight change to one keyword row.
///
/// `new = clamp(old + delta, epsilon, max_weight)`, evaluated inside SQLite
/// as one UPDATE, so two concurrent adjustments of the same keyword never
/// lose an update.
pub async fn adjust_weight<'e, E>(
    db: E,
    keyword_id: i64,
    delta: f64,
    bounds: WeightBounds,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let updated = sqlx::query("UPDATE keywords SET weight = MIN(?, MAX(?, weight + ?)) WHERE id = ?")
        .bind(bounds.max_weight)
        .bind(bounds.epsilon)
        .bind(delta)
        .bind(keyword_id)
        .execute(db)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("keyword {}", keyword_id)));
    }

    Ok(())
}

/// Handler for `niche niches`: lists niches with their keyword counts.
pub async fn run_niches(config: &crate::config::Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    let snap = snapshot(&pool).await?;
    pool.close().await;

    if snap.niches.is_empty() {
        println!("No niches. Run `niche seed` first.");
        return Ok(());
    }

    for niche in &snap.niches {
        let keyword_count = snap.keywords_for(niche.id).count();
        println!(
            "{:>4}  {} ({} keywords)",
            niche.id, niche.name, keyword_count
        );
        if let Some(ref description) = niche.description {
            println!("      {}", description);
        }
    }
    Ok(())
}
