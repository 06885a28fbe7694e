//! Feedback ingestion, error-pattern clustering, and improvement
//! recommendations.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entry::{FeedbackEntry, FeedbackKind};

/// Corrections per predicted value before it becomes a recommendation.
const HIGH_ERROR_MIN_CORRECTIONS: usize = 3;
/// Share of low-confidence feedback that triggers a data-quality flag.
const LOW_CONFIDENCE_SHARE: f64 = 0.3;
/// Confidence below this counts as a low-confidence prediction.
const LOW_CONFIDENCE_CUTOFF: f64 = 0.7;
/// Tokens two descriptions must share to land in the same pattern.
const MIN_SHARED_TOKENS: usize = 2;
/// Week-over-week accuracy change within this band reads as stable.
const TREND_TOLERANCE: f64 = 0.05;

// ── Derived types ───────────────────────────────────────────────────

/// A cluster of corrections sharing a corrected value and overlapping
/// description vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPattern {
    pub id: String,
    /// Description of the entry that opened the pattern.
    pub description: String,
    pub corrected: String,
    pub confidence: f64,
    pub frequency: usize,
    pub last_seen: DateTime<Utc>,
    pub examples: Vec<String>,
}

/// A recommended intervention derived from accumulated feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelImprovement {
    pub kind: String,
    pub description: String,
    /// Share of all feedback driving this recommendation.
    pub impact_score: f64,
    pub affected_patterns: Vec<String>,
    pub suggested_actions: Vec<String>,
}

impl ModelImprovement {
    pub const HIGH_ERROR_CATEGORY: &'static str = "high_error_category";
    pub const LOW_CONFIDENCE: &'static str = "low_confidence";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTrend {
    Improving,
    Declining,
    Stable,
    /// Fewer than two weeks of validation/correction history.
    InsufficientData,
}

/// Summary of the feedback store for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsights {
    pub total_feedback: usize,
    pub corrections: usize,
    pub validations: usize,
    pub rejections: usize,
    pub pattern_count: usize,
    pub mean_weight: f64,
    /// Validation share per ISO week, weeks ascending.
    pub weekly_accuracy: Vec<f64>,
    pub trend: AccuracyTrend,
}

// ── Learner ─────────────────────────────────────────────────────────

#[derive(Default)]
struct LearnerState {
    entries: Vec<FeedbackEntry>,
    patterns: Vec<LearningPattern>,
}

#[derive(Default)]
pub struct FeedbackLearner {
    inner: RwLock<LearnerState>,
}

impl FeedbackLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and fold it into the pattern set. Corrections open
    /// or extend error patterns; validations reinforce a matching pattern
    /// but never create one; rejections are only counted.
    pub fn ingest(&self, entry: FeedbackEntry) {
        let mut state = self.inner.write().expect("feedback lock poisoned");
        match entry.kind {
            FeedbackKind::Correction => absorb_correction(&mut state.patterns, &entry),
            FeedbackKind::Validation => reinforce_pattern(&mut state.patterns, &entry),
            FeedbackKind::Rejection => {}
        }
        debug!(
            id = %entry.id,
            kind = %entry.kind,
            weight = entry.weight,
            "feedback ingested"
        );
        state.entries.push(entry);
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().expect("feedback lock poisoned").entries.len()
    }

    pub fn cluster_patterns(&self) -> Vec<LearningPattern> {
        self.inner.read().expect("feedback lock poisoned").patterns.clone()
    }

    /// Recompute recommendations from the full store. Two triggers: a
    /// predicted value the model keeps getting wrong, and a large share of
    /// low-confidence predictions across all feedback.
    pub fn recommend_improvements(&self) -> Vec<ModelImprovement> {
        let state = self.inner.read().expect("feedback lock poisoned");
        let total = state.entries.len();
        if total == 0 {
            return Vec::new();
        }

        let mut improvements = Vec::new();

        let mut error_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in &state.entries {
            if entry.kind == FeedbackKind::Correction {
                *error_counts.entry(entry.predicted.as_str()).or_default() += 1;
            }
        }
        for (category, count) in error_counts {
            if count >= HIGH_ERROR_MIN_CORRECTIONS {
                improvements.push(ModelImprovement {
                    kind: ModelImprovement::HIGH_ERROR_CATEGORY.to_string(),
                    description: format!("category '{}' has {} corrections", category, count),
                    impact_score: count as f64 / total as f64,
                    affected_patterns: vec![category.to_string()],
                    suggested_actions: vec![
                        format!("review rules touching '{}'", category),
                        "add training examples for this category".to_string(),
                        "re-run ensemble training".to_string(),
                    ],
                });
            }
        }

        let low_confidence = state
            .entries
            .iter()
            .filter(|e| e.confidence < LOW_CONFIDENCE_CUTOFF)
            .count();
        let share = low_confidence as f64 / total as f64;
        if share > LOW_CONFIDENCE_SHARE {
            improvements.push(ModelImprovement {
                kind: ModelImprovement::LOW_CONFIDENCE.to_string(),
                description: format!(
                    "{} of {} predictions arrived below {} confidence",
                    low_confidence, total, LOW_CONFIDENCE_CUTOFF
                ),
                impact_score: share,
                affected_patterns: Vec::new(),
                suggested_actions: vec![
                    "improve training data quality".to_string(),
                    "recalibrate decision thresholds".to_string(),
                ],
            });
        }

        if !improvements.is_empty() {
            info!(count = improvements.len(), "improvement recommendations emitted");
        }
        improvements
    }

    pub fn learning_insights(&self) -> LearningInsights {
        let state = self.inner.read().expect("feedback lock poisoned");
        let total = state.entries.len();
        let count_of = |kind: FeedbackKind| {
            state.entries.iter().filter(|e| e.kind == kind).count()
        };
        let mean_weight = if total == 0 {
            0.0
        } else {
            state.entries.iter().map(|e| e.weight).sum::<f64>() / total as f64
        };
        let weekly_accuracy = weekly_validation_share(&state.entries);
        let trend = accuracy_trend(&weekly_accuracy);

        LearningInsights {
            total_feedback: total,
            corrections: count_of(FeedbackKind::Correction),
            validations: count_of(FeedbackKind::Validation),
            rejections: count_of(FeedbackKind::Rejection),
            pattern_count: state.patterns.len(),
            mean_weight,
            weekly_accuracy,
            trend,
        }
    }

    // ── Export / restore (snapshots) ────────────────────────────────

    pub fn export_entries(&self) -> Vec<FeedbackEntry> {
        self.inner.read().expect("feedback lock poisoned").entries.clone()
    }

    pub fn export_patterns(&self) -> Vec<LearningPattern> {
        self.inner.read().expect("feedback lock poisoned").patterns.clone()
    }

    /// Replace all state with exported data. Patterns are taken as-is, not
    /// re-clustered.
    pub fn restore(&self, entries: Vec<FeedbackEntry>, patterns: Vec<LearningPattern>) {
        let mut state = self.inner.write().expect("feedback lock poisoned");
        state.entries = entries;
        state.patterns = patterns;
    }
}

// ── Clustering ──────────────────────────────────────────────────────

fn absorb_correction(patterns: &mut Vec<LearningPattern>, entry: &FeedbackEntry) {
    for pattern in patterns.iter_mut() {
        if pattern.corrected == entry.corrected
            && shared_tokens(&pattern.description, &entry.description) >= MIN_SHARED_TOKENS
        {
            pattern.frequency += 1;
            pattern.last_seen = entry.received_at;
            pattern.examples.push(entry.description.clone());
            return;
        }
    }
    patterns.push(LearningPattern {
        id: format!("pattern-{}", patterns.len()),
        description: entry.description.clone(),
        corrected: entry.corrected.clone(),
        confidence: entry.confidence,
        frequency: 1,
        last_seen: entry.received_at,
        examples: vec![entry.description.clone()],
    });
}

/// A validation that matches an existing pattern confirms it: frequency
/// up, confidence averaged toward the validated prediction.
fn reinforce_pattern(patterns: &mut [LearningPattern], entry: &FeedbackEntry) {
    for pattern in patterns.iter_mut() {
        if pattern.corrected == entry.predicted
            && shared_tokens(&pattern.description, &entry.description) >= MIN_SHARED_TOKENS
        {
            pattern.frequency += 1;
            pattern.confidence = (pattern.confidence + entry.confidence) / 2.0;
            pattern.last_seen = entry.received_at;
            pattern.examples.push(entry.description.clone());
            return;
        }
    }
}

/// Case-insensitive word overlap between two descriptions.
fn shared_tokens(a: &str, b: &str) -> usize {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    left.intersection(&right).count()
}

// ── Accuracy trend ──────────────────────────────────────────────────

/// Validation share per ISO week, ascending. Weeks with only rejections
/// carry no signal and are skipped.
fn weekly_validation_share(entries: &[FeedbackEntry]) -> Vec<f64> {
    let mut weeks: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for entry in entries {
        let week = entry.received_at.iso_week();
        let key = format!("{:04}-W{:02}", week.year(), week.week());
        let slot = weeks.entry(key).or_insert((0, 0));
        match entry.kind {
            FeedbackKind::Validation => slot.0 += 1,
            FeedbackKind::Correction => slot.1 += 1,
            FeedbackKind::Rejection => {}
        }
    }
    weeks
        .into_values()
        .filter(|&(validations, corrections)| validations + corrections > 0)
        .map(|(validations, corrections)| {
            validations as f64 / (validations + corrections) as f64
        })
        .collect()
}

fn accuracy_trend(weekly: &[f64]) -> AccuracyTrend {
    if weekly.len() < 2 {
        return AccuracyTrend::InsufficientData;
    }
    let delta = weekly[weekly.len() - 1] - weekly[0];
    if delta > TREND_TOLERANCE {
        AccuracyTrend::Improving
    } else if delta < -TREND_TOLERANCE {
        AccuracyTrend::Declining
    } else {
        AccuracyTrend::Stable
    }
}

// ── Tests ───────────────────────────────────────────────────────────
