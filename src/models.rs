//! Core domain types used throughout the classifier.
//!
//! These types represent the labels, niches, keywords, and history records
//! that flow through the classification and feedback pipeline.

use serde::{Deserialize, Serialize};

/// A single machine-generated image label with its detection confidence.
///
/// Produced by the external label provider and persisted verbatim in the
/// history snapshot, so feedback can always replay the exact labels the
/// user saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub label: String,
    pub confidence: f64,
}

impl Label {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// A commerce category a product can be classified into.
#[derive(Debug, Clone)]
pub struct Niche {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A weighted term owned by exactly one niche.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub id: i64,
    pub niche_id: i64,
    pub term: String,
    pub weight: f64,
}

/// Resolution state of a history record.
///
/// Persisted as a fixed string; the in-memory form is this tagged variant so
/// free-text drift in the `feedback` column cannot occur. Transitions are
/// monotonic: `Pending` moves to exactly one of the resolved states, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackState {
    Pending,
    Correct,
    Incorrect,
}

impl FeedbackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackState::Pending => "pending",
            FeedbackState::Correct => "correct",
            FeedbackState::Incorrect => "incorrect",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FeedbackState::Pending),
            "correct" => Some(FeedbackState::Correct),
            "incorrect" => Some(FeedbackState::Incorrect),
            _ => None,
        }
    }
}

/// One ranked classification candidate.
#[derive(Debug, Clone, Serialize)]
pub struct RankedNiche {
    pub niche_id: i64,
    pub name: String,
    pub score: f64,
    /// This niche's share of the total score, in [0, 1].
    pub confidence: f64,
}

/// Classifier output: candidates ranked best-first.
///
/// An empty ranking means no label matched any keyword (or the input was
/// empty): the "unclassified" outcome, which is a value, not an error.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub ranked: Vec<RankedNiche>,
}

impl Classification {
    pub fn top(&self) -> Option<&RankedNiche> {
        self.ranked.first()
    }

    pub fn is_unclassified(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Confidence of the top niche, or 0 when unclassified.
    pub fn confidence(&self) -> f64 {
        self.top().map(|r| r.confidence).unwrap_or(0.0)
    }
}

/// An audit record of one classification and its single feedback resolution.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub id: i64,
    pub product_id: i64,
    /// Predicted niche while pending; the corrected niche after an
    /// "incorrect" resolution that supplied one. `None` when the
    /// classification was unclassified.
    pub niche_id: Option<i64>,
    pub confidence: f64,
    pub feedback: FeedbackState,
    /// The exact labels used at classification time. Write-once.
    pub labels: Vec<Label>,
    pub created_at: i64,
}
