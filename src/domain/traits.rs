// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The parser talks to its collaborators through these traits:
//
//   - InstanceSource → where DROP instances come from
//                      (JSON files today, a live reader tomorrow)
//   - AnswerMetric   → the metric sink that compares a predicted
//                      answer string against acceptable answers
//
// The application layer depends only on these traits, so a
// loader or metric can be swapped without touching the use cases.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::instance::DropInstance;

// ─── InstanceSource ───────────────────────────────────────────────────────────
/// Any component that can supply reading-comprehension instances.
///
/// Implementations:
///   - JsonInstanceLoader → reads a preprocessed JSON file
pub trait InstanceSource {
    fn load_all(&self) -> Result<Vec<DropInstance>>;
}

// ─── AnswerMetric ─────────────────────────────────────────────────────────────
/// Accumulates answer quality over many predictions.
///
/// Implementations:
///   - EmF1Metric → exact match and bag-of-tokens F1
pub trait AnswerMetric {
    /// Record one prediction against its acceptable answers.
    /// Returns the (em, f1) of this single prediction.
    fn observe(&mut self, predicted: &str, gold: &[String]) -> (f64, f64);

    /// Averages over everything observed since the last reset.
    fn metric(&self) -> (f64, f64);

    fn reset(&mut self);
}
