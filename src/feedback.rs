//! Feedback resolution and bounded lexicon learning.
//!
//! A feedback submission resolves its history record and adjusts keyword
//! weights in one transaction. The stored labels snapshot is replayed
//! against the niche's current keywords; the classification is never re-run
//! against a lexicon that may have drifted since the user saw the result.
//! If resolution fails, no weight changes.

use std::collections::HashSet;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::classify::keyword_matches;
use crate::config::{ClassifierConfig, Config};
use crate::db;
use crate::error::Error;
use crate::history;
use crate::lexicon::{self, WeightBounds};
use crate::models::FeedbackState;

/// A user's feedback signal, validated before any transaction starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Correct,
    Incorrect {
        corrected_niche_id: Option<i64>,
    },
}

impl FeedbackOutcome {
    /// Builds an outcome from the wire form. A corrected niche only makes
    /// sense alongside "incorrect".
    pub fn from_parts(
        feedback: &str,
        corrected_niche_id: Option<i64>,
    ) -> crate::error::Result<Self> {
        match feedback {
            "correct" => {
                if corrected_niche_id.is_some() {
                    Err(Error::InvalidInput(
                        "corrected_niche_id is not allowed with 'correct' feedback".to_string(),
                    ))
                } else {
                    Ok(FeedbackOutcome::Correct)
                }
            }
            "incorrect" => Ok(FeedbackOutcome::Incorrect { corrected_niche_id }),
            other => Err(Error::InvalidInput(format!(
                "feedback must be 'correct' or 'incorrect', got '{}'",
                other
            ))),
        }
    }

    fn state(&self) -> FeedbackState {
        match self {
            FeedbackOutcome::Correct => FeedbackState::Correct,
            FeedbackOutcome::Incorrect { .. } => FeedbackState::Incorrect,
        }
    }

    fn corrected_niche_id(&self) -> Option<i64> {
        match self {
            FeedbackOutcome::Correct => None,
            FeedbackOutcome::Incorrect { corrected_niche_id } => *corrected_niche_id,
        }
    }
}

/// What a feedback submission did, for logging and CLI output.
#[derive(Debug)]
pub struct FeedbackSummary {
    pub history_id: i64,
    pub state: FeedbackState,
    /// Keyword adjustments rewarded (predicted niche on "correct", corrected
    /// niche on "incorrect" with a correction).
    pub reinforced: usize,
    /// Keywords penalized on the predicted niche.
    pub penalized: usize,
}

/// Resolves `history_id` with `outcome` and applies the bounded weight
/// adjustments, all in one transaction.
///
/// - correct: `+learning_rate * detection_confidence` per matched keyword
///   of the predicted niche, once per matching label.
/// - incorrect: `-learning_rate` per matched keyword of the predicted
///   niche; if a corrected niche was supplied, its matched keywords are
///   rewarded as if it had been predicted. A corrected niche with no
///   matches against the snapshot is a no-op, not an error.
pub async fn apply_feedback(
    pool: &SqlitePool,
    classifier: &ClassifierConfig,
    history_id: i64,
    outcome: FeedbackOutcome,
) -> crate::error::Result<FeedbackSummary> {
    // Reject an unknown corrected niche before touching the record.
    if let Some(niche_id) = outcome.corrected_niche_id() {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM niches WHERE id = ?")
            .bind(niche_id)
            .fetch_one(pool)
            .await?;
        if !exists {
            return Err(Error::InvalidInput(format!(
                "unknown corrected_niche_id {}",
                niche_id
            )));
        }
    }

    let bounds = WeightBounds::from(classifier);
    let rate = classifier.learning_rate;

    let mut tx = pool.begin().await?;

    // Guarded state transition first; the losing side of a concurrent
    // submission stops here and the transaction rolls back untouched.
    let record = history::resolve(
        &mut tx,
        history_id,
        outcome.state(),
        outcome.corrected_niche_id(),
    )
    .await?;

    let mut reinforced = 0usize;
    let mut penalized = 0usize;

    match outcome {
        FeedbackOutcome::Correct => {
            if let Some(predicted) = record.niche_id {
                let keywords = lexicon::keywords_of_niche(&mut *tx, predicted).await?;
                for m in keyword_matches(&record.labels, &keywords) {
                    lexicon::adjust_weight(&mut *tx, m.keyword_id, rate * m.confidence, bounds)
                        .await?;
                    reinforced += 1;
                }
            }
        }
        FeedbackOutcome::Incorrect { corrected_niche_id } => {
            if let Some(predicted) = record.niche_id {
                let keywords = lexicon::keywords_of_niche(&mut *tx, predicted).await?;
                let matched: HashSet<i64> = keyword_matches(&record.labels, &keywords)
                    .into_iter()
                    .map(|m| m.keyword_id)
                    .collect();
                for keyword_id in matched {
                    lexicon::adjust_weight(&mut *tx, keyword_id, -rate, bounds).await?;
                    penalized += 1;
                }
            }
            if let Some(corrected) = corrected_niche_id {
                let keywords = lexicon::keywords_of_niche(&mut *tx, corrected).await?;
                for m in keyword_matches(&record.labels, &keywords) {
                    lexicon::adjust_weight(&mut *tx, m.keyword_id, rate * m.confidence, bounds)
                        .await?;
                    reinforced += 1;
                }
            }
        }
    }

    tx.commit().await?;

    tracing::info!(
        history_id,
        state = outcome.state().as_str(),
        reinforced,
        penalized,
        "feedback applied"
    );

    Ok(FeedbackSummary {
        history_id,
        state: outcome.state(),
        reinforced,
        penalized,
    })
}

/// Handler for `niche feedback`.
pub async fn run_feedback(
    config: &Config,
    history_id: i64,
    outcome: &str,
    corrected_niche_id: Option<i64>,
) -> Result<()> {
    let outcome = FeedbackOutcome::from_parts(outcome, corrected_niche_id)?;

    let pool = db::connect(config).await?;
    let summary = apply_feedback(&pool, &config.classifier, history_id, outcome).await?;
    pool.close().await;

    println!(
        "history {} resolved as {} ({} reinforced, {} penalized)",
        summary.history_id,
        summary.state.as_str(),
        summary.reinforced,
        summary.penalized
    );
    Ok(())
}

// ============ Feedback processor tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .unwrap();
        crate::migrate::apply_schema(&pool).await.unwrap();
        (dir, pool)
    }

    fn classifier() -> ClassifierConfig {
        ClassifierConfig {
            epsilon: 0.01,
            max_weight: 10.0,
            learning_rate: 0.05,
        }
    }

    struct Fixture {
        footwear: i64,
        gaming: i64,
        sneaker_kw: i64,
        shoe_kw: i64,
        console_kw: i64,
        history_id: i64,
    }

    /// Footwear {sneaker: 2.0, shoe: 1.0}, Gaming {console: 1.0}, and a
    /// pending history record predicting Footwear from
    /// [sneaker 0.9, shoe 0.8].
    async fn seed_fixture(pool: &SqlitePool) -> Fixture {
        let footwear = sqlx::query("INSERT INTO niches (name) VALUES ('Footwear')")
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();
        let gaming = sqlx::query("INSERT INTO niches (name) VALUES ('Gaming')")
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();

        let sneaker_kw =
            sqlx::query("INSERT INTO keywords (niche_id, keyword, weight) VALUES (?, 'sneaker', 2.0)")
                .bind(footwear)
                .execute(pool)
                .await
                .unwrap()
                .last_insert_rowid();
        let shoe_kw = sqlx::query("INSERT INTO keywords (niche_id, keyword) VALUES (?, 'shoe')")
            .bind(footwear)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();
        let console_kw =
            sqlx::query("INSERT INTO keywords (niche_id, keyword) VALUES (?, 'console')")
                .bind(gaming)
                .execute(pool)
                .await
                .unwrap()
                .last_insert_rowid();

        let product_id =
            sqlx::query("INSERT INTO products (image_path, created_at) VALUES ('data/a.jpg', 0)")
                .execute(pool)
                .await
                .unwrap()
                .last_insert_rowid();

        let labels = vec![Label::new("sneaker", 0.9), Label::new("shoe", 0.8)];
        let mut tx = pool.begin().await.unwrap();
        let history_id = history::create(&mut tx, product_id, Some(footwear), 1.0, &labels, 0)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        Fixture {
            footwear,
            gaming,
            sneaker_kw,
            shoe_kw,
            console_kw,
            history_id,
        }
    }

    async fn weight_of(pool: &SqlitePool, keyword_id: i64) -> f64 {
        sqlx::query_scalar("SELECT weight FROM keywords WHERE id = ?")
            .bind(keyword_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_correct_feedback_reinforces_matched_keywords() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        let summary = apply_feedback(
            &pool,
            &classifier(),
            fx.history_id,
            FeedbackOutcome::Correct,
        )
        .await
        .unwrap();

        assert_eq!(summary.reinforced, 2);
        assert_eq!(summary.penalized, 0);
        // 2.0 + 0.05 * 0.9 = 2.045
        assert!((weight_of(&pool, fx.sneaker_kw).await - 2.045).abs() < 1e-9);
        // 1.0 + 0.05 * 0.8 = 1.04
        assert!((weight_of(&pool, fx.shoe_kw).await - 1.04).abs() < 1e-9);
        // Unrelated niche untouched
        assert!((weight_of(&pool, fx.console_kw).await - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_second_feedback_conflicts_and_leaves_weights_alone() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        apply_feedback(&pool, &classifier(), fx.history_id, FeedbackOutcome::Correct)
            .await
            .unwrap();
        let after_first = weight_of(&pool, fx.sneaker_kw).await;

        let err = apply_feedback(
            &pool,
            &classifier(),
            fx.history_id,
            FeedbackOutcome::Incorrect {
                corrected_niche_id: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::AlreadyResolved(h) if h == fx.history_id));
        assert!((weight_of(&pool, fx.sneaker_kw).await - after_first).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_incorrect_without_correction_penalizes_only() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        let summary = apply_feedback(
            &pool,
            &classifier(),
            fx.history_id,
            FeedbackOutcome::Incorrect {
                corrected_niche_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.reinforced, 0);
        assert_eq!(summary.penalized, 2);
        assert!((weight_of(&pool, fx.sneaker_kw).await - 1.95).abs() < 1e-9);
        assert!((weight_of(&pool, fx.shoe_kw).await - 0.95).abs() < 1e-9);
        assert!((weight_of(&pool, fx.console_kw).await - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_incorrect_with_unmatched_correction_is_noop_on_that_side() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        // Gaming's "console" never appears in the snapshot
        let summary = apply_feedback(
            &pool,
            &classifier(),
            fx.history_id,
            FeedbackOutcome::Incorrect {
                corrected_niche_id: Some(fx.gaming),
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.reinforced, 0);
        assert_eq!(summary.penalized, 2);
        assert!((weight_of(&pool, fx.sneaker_kw).await - 1.95).abs() < 1e-9);
        assert!((weight_of(&pool, fx.console_kw).await - 1.0).abs() < 1e-9);

        // The corrected niche is recorded on the history row
        let record = history::get(&pool, fx.history_id).await.unwrap();
        assert_eq!(record.niche_id, Some(fx.gaming));
    }

    #[tokio::test]
    async fn test_incorrect_with_matching_correction_rewards_it() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        // Give Gaming a keyword that does appear in the snapshot
        let pad_kw = sqlx::query("INSERT INTO keywords (niche_id, keyword) VALUES (?, 'shoe')")
            .bind(fx.gaming)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();

        let summary = apply_feedback(
            &pool,
            &classifier(),
            fx.history_id,
            FeedbackOutcome::Incorrect {
                corrected_niche_id: Some(fx.gaming),
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.penalized, 2);
        assert_eq!(summary.reinforced, 1);
        // Rewarded as if predicted: 1.0 + 0.05 * 0.8
        assert!((weight_of(&pool, pad_kw).await - 1.04).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_replays_stored_snapshot_not_current_lexicon() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        // After classification the lexicon drifts: Footwear learns "purple",
        // which the product image would match today but did not at
        // classification time.
        let purple_kw = sqlx::query("INSERT INTO keywords (niche_id, keyword) VALUES (?, 'purple')")
            .bind(fx.footwear)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();

        apply_feedback(&pool, &classifier(), fx.history_id, FeedbackOutcome::Correct)
            .await
            .unwrap();

        // Only keywords matching the stored snapshot moved
        assert!((weight_of(&pool, purple_kw).await - 1.0).abs() < 1e-9);
        assert!((weight_of(&pool, fx.sneaker_kw).await - 2.045).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_history_is_not_found() {
        let (_dir, pool) = test_pool().await;
        seed_fixture(&pool).await;

        let err = apply_feedback(&pool, &classifier(), 777, FeedbackOutcome::Correct)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_corrected_niche_rejected_before_resolution() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        let err = apply_feedback(
            &pool,
            &classifier(),
            fx.history_id,
            FeedbackOutcome::Incorrect {
                corrected_niche_id: Some(12345),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Record still pending, weights untouched
        let record = history::get(&pool, fx.history_id).await.unwrap();
        assert_eq!(record.feedback, FeedbackState::Pending);
        assert!((weight_of(&pool, fx.sneaker_kw).await - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_outcome_from_parts_validation() {
        assert!(matches!(
            FeedbackOutcome::from_parts("correct", None),
            Ok(FeedbackOutcome::Correct)
        ));
        assert!(matches!(
            FeedbackOutcome::from_parts("incorrect", Some(3)),
            Ok(FeedbackOutcome::Incorrect {
                corrected_niche_id: Some(3)
            })
        ));
        assert!(FeedbackOutcome::from_parts("correct", Some(3)).is_err());
        assert!(FeedbackOutcome::from_parts("maybe", None).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_resolve_exactly_once() {
        let (_dir, pool) = test_pool().await;
        let fx = seed_fixture(&pool).await;

        let a = {
            let pool = pool.clone();
            let cfg = classifier();
            tokio::spawn(async move {
                apply_feedback(&pool, &cfg, fx.history_id, FeedbackOutcome::Correct).await
            })
        };
        let b = {
            let pool = pool.clone();
            let cfg = classifier();
            tokio::spawn(async move {
                apply_feedback(&pool, &cfg, fx.history_id, FeedbackOutcome::Correct).await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadyResolved(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);

        // The lexicon reflects exactly one adjustment
        assert!((weight_of(&pool, fx.sneaker_kw).await - 2.045).abs() < 1e-9);
        assert!((weight_of(&pool, fx.shoe_kw).await - 1.04).abs() < 1e-9);
    }
}
