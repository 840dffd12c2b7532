//! Classification of detected image labels against the weighted lexicon.
//!
//! The scoring core is a pure function of `(labels, lexicon snapshot)`:
//! no I/O, no failure modes for odd label text, fully deterministic.
//! [`classify_and_record`] wraps it with persistence, storing the product
//! row and an immutable history snapshot of the exact labels scored.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::history;
use crate::lexicon::{self, LexiconSnapshot};
use crate::models::{Classification, Keyword, Label, RankedNiche};

/// Niche name reported when no label matched any keyword.
pub const UNCLASSIFIED: &str = "unclassified";

/// Scores closer than this are considered tied and ranked by niche name.
const SCORE_TIE_EPSILON: f64 = 1e-9;

// ============ Normalization ============

/// Normalizes text into matchable tokens: lowercase, common Latin
/// diacritics folded to ASCII, split on any non-alphanumeric boundary.
pub fn normalize(text: &str) -> Vec<String> {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        for lc in c.to_lowercase() {
            folded.push(fold_ascii(lc));
        }
    }

    folded
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn fold_ascii(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Normalized form of a keyword term, used for token-exact comparison.
/// A term that normalizes to several tokens can never equal a single label
/// token, so it simply never matches.
fn normalize_term(term: &str) -> String {
    normalize(term).join(" ")
}

// ============ Matching ============

/// One keyword/label hit: the keyword row and the detection confidence of
/// the label it matched.
#[derive(Debug, Clone)]
pub struct KeywordMatch {
    pub keyword_id: i64,
    pub confidence: f64,
}

/// Token-exact matches of `keywords` against `labels`, one entry per
/// (keyword, label) pair that hits. This is the same matching step the
/// scorer uses, exposed so feedback can replay a stored snapshot against a
/// niche's current keywords.
pub fn keyword_matches<'a, I>(labels: &[Label], keywords: I) -> Vec<KeywordMatch>
where
    I: IntoIterator<Item = &'a Keyword>,
{
    let prepared: Vec<(Vec<String>, f64)> = labels
        .iter()
        .map(|l| (normalize(&l.label), l.confidence))
        .collect();

    let mut matches = Vec::new();
    for kw in keywords {
        let needle = normalize_term(&kw.term);
        if needle.is_empty() {
            continue;
        }
        for (tokens, confidence) in &prepared {
            if tokens.iter().any(|t| *t == needle) {
                matches.push(KeywordMatch {
                    keyword_id: kw.id,
                    confidence: *confidence,
                });
            }
        }
    }
    matches
}

// ============ Scoring ============

/// Scores every niche against the labels and returns the ranking.
///
/// For each (label, keyword) token-exact hit the niche accumulates
/// `weight * detection_confidence`. Niches that never match are omitted;
/// an empty ranking is the unclassified outcome. Per-niche confidence is
/// that niche's share of the total score.
pub fn classify(labels: &[Label], lexicon: &LexiconSnapshot) -> Classification {
    if labels.is_empty() || lexicon.is_empty() {
        return Classification::default();
    }

    let prepared: Vec<(Vec<String>, f64)> = labels
        .iter()
        .map(|l| (normalize(&l.label), l.confidence))
        .collect();

    let mut scores: HashMap<i64, f64> = HashMap::new();
    for kw in &lexicon.keywords {
        let needle = normalize_term(&kw.term);
        if needle.is_empty() {
            continue;
        }
        for (tokens, confidence) in &prepared {
            if tokens.iter().any(|t| *t == needle) {
                *scores.entry(kw.niche_id).or_insert(0.0) += kw.weight * confidence;
            }
        }
    }

    if scores.is_empty() {
        return Classification::default();
    }

    let total: f64 = scores.values().sum();

    let mut ranked: Vec<RankedNiche> = scores
        .into_iter()
        .filter_map(|(niche_id, score)| {
            lexicon.niche(niche_id).map(|n| RankedNiche {
                niche_id,
                name: n.name.clone(),
                score,
                confidence: if total > 0.0 { score / total } else { 0.0 },
            })
        })
        .collect();

    // Sort: score desc; near-ties break by niche name asc (deterministic)
    ranked.sort_by(|a, b| {
        if (a.score - b.score).abs() < SCORE_TIE_EPSILON {
            a.name.cmp(&b.name)
        } else {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        }
    });

    Classification { ranked }
}

// ============ Persistence orchestration ============

/// Result of a classification that was persisted.
#[derive(Debug)]
pub struct ClassifyOutcome {
    pub history_id: i64,
    pub product_id: i64,
    pub classification: Classification,
    pub labels: Vec<Label>,
}

/// Classifies `labels` against the current lexicon and records the outcome:
/// a product row plus a pending history record holding the exact labels
/// scored. Both inserts commit atomically.
pub async fn classify_and_record(
    pool: &SqlitePool,
    image_path: &str,
    labels: Vec<Label>,
) -> crate::error::Result<ClassifyOutcome> {
    let snapshot = lexicon::snapshot(pool).await?;
    let classification = classify(&labels, &snapshot);

    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let product_id = sqlx::query("INSERT INTO products (image_path, created_at) VALUES (?, ?)")
        .bind(image_path)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let history_id = history::create(
        &mut tx,
        product_id,
        classification.top().map(|r| r.niche_id),
        classification.confidence(),
        &labels,
        now,
    )
    .await?;

    tx.commit().await?;

    Ok(ClassifyOutcome {
        history_id,
        product_id,
        classification,
        labels,
    })
}

// ============ CLI entry point ============

/// Handler for `niche classify`. Detects labels (or takes the inline
/// override), classifies, optionally persists, and prints the ranking.
pub async fn run_classify(
    config: &Config,
    image: &str,
    labels_override: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let labels = match labels_override {
        Some(ref raw) => parse_labels_arg(raw)?,
        None => {
            let bytes = tokio::fs::read(image).await?;
            crate::labels::detect_labels(&config.labels, &bytes).await?
        }
    };

    for l in &labels {
        println!("label: {} ({:.2})", l.label, l.confidence);
    }

    let pool = db::connect(config).await?;

    if dry_run {
        let snapshot = lexicon::snapshot(&pool).await?;
        let classification = classify(&labels, &snapshot);
        print_classification(&classification);
        pool.close().await;
        return Ok(());
    }

    let outcome = classify_and_record(&pool, image, labels).await?;
    print_classification(&outcome.classification);
    println!("product_id: {}", outcome.product_id);
    println!("history_id: {}", outcome.history_id);

    pool.close().await;
    Ok(())
}

fn print_classification(classification: &Classification) {
    match classification.top() {
        Some(top) => {
            println!();
            for (i, r) in classification.ranked.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} (confidence {:.2})",
                    i + 1,
                    r.score,
                    r.name,
                    r.confidence
                );
            }
            println!();
            println!("niche:      {}", top.name);
            println!("confidence: {:.2}", top.confidence);
        }
        None => {
            println!();
            println!("niche:      {}", UNCLASSIFIED);
            println!("confidence: 0.00");
        }
    }
}

/// Parses the `--labels "term:conf,term:conf"` override. Confidence
/// defaults to 1.0 when omitted.
pub fn parse_labels_arg(raw: &str) -> Result<Vec<Label>> {
    let mut labels = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (term, confidence) = match part.rsplit_once(':') {
            Some((term, conf)) => {
                let confidence: f64 = conf
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid label confidence: '{}'", conf))?;
                (term, confidence)
            }
            None => (part, 1.0),
        };
        if !(0.0..=1.0).contains(&confidence) {
            anyhow::bail!("label confidence must be in [0.0, 1.0]: '{}'", part);
        }
        labels.push(Label::new(term, confidence));
    }
    Ok(labels)
}

// ============ Classifier tests ============
