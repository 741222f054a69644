// ============================================================
// Layer 6 — Metrics
// ============================================================
// Two pieces:
//
//   EmF1Metric    — the answer metric sink. Scores a predicted
//                   string against every acceptable answer and
//                   keeps the best exact match and F1.
//   MetricsLogger — appends one CSV row per evaluated batch.
//
// F1 is computed over normalised bags of tokens. When the gold
// answer contains numbers, a prediction that shares none of them
// scores F1 = 0 however many words overlap.
//
// Example CSV output:
//   batch,instances,loss,model_loss,exec_loss,skipped_programs,em,f1
//   1,8,3.124500,2.900000,0.224500,2,0.250000,0.312000
//   2,8,2.890100,2.700000,0.190100,0,0.375000,0.401000
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::data::normalizer::AnswerNormalizer;
use crate::domain::traits::AnswerMetric;

// ─── EM / F1 ──────────────────────────────────────────────────────────────────
fn is_number(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}

/// Bag-of-tokens F1 between two normalised token lists.
pub fn token_f1(predicted: &[String], gold: &[String]) -> f64 {
    if predicted.is_empty() && gold.is_empty() {
        return 1.0;
    }
    if predicted.is_empty() || gold.is_empty() {
        return 0.0;
    }

    let gold_numbers: Vec<&String> = gold.iter().filter(|t| is_number(t)).collect();
    if !gold_numbers.is_empty() && !gold_numbers.iter().any(|n| predicted.contains(n)) {
        return 0.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in gold {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut common = 0usize;
    for token in predicted {
        if let Some(count) = counts.get_mut(token.as_str()) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }
    if common == 0 {
        return 0.0;
    }

    let precision = common as f64 / predicted.len() as f64;
    let recall    = common as f64 / gold.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Running exact-match and F1 averages.
pub struct EmF1Metric {
    normalizer: AnswerNormalizer,
    total_em:   f64,
    total_f1:   f64,
    count:      usize,
}

impl EmF1Metric {
    pub fn new() -> Self {
        Self { normalizer: AnswerNormalizer::new(), total_em: 0.0, total_f1: 0.0, count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Best (em, f1) of `predicted` over the acceptable answers.
    pub fn score(&self, predicted: &str, gold: &[String]) -> (f64, f64) {
        let predicted = self.normalizer.tokens(predicted);
        gold.iter()
            .map(|answer| {
                let answer = self.normalizer.tokens(answer);
                let em = if predicted == answer { 1.0 } else { 0.0 };
                (em, token_f1(&predicted, &answer))
            })
            .fold((0.0, 0.0), |(em, f1), (e, f)| (f64::max(em, e), f64::max(f1, f)))
    }
}

impl Default for EmF1Metric {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerMetric for EmF1Metric {
    /// Instances without gold answer texts are not counted.
    fn observe(&mut self, predicted: &str, gold: &[String]) -> (f64, f64) {
        if gold.is_empty() {
            return (0.0, 0.0);
        }
        let (em, f1) = self.score(predicted, gold);
        self.total_em += em;
        self.total_f1 += f1;
        self.count    += 1;
        (em, f1)
    }

    fn metric(&self) -> (f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let n = self.count as f64;
        (self.total_em / n, self.total_f1 / n)
    }

    fn reset(&mut self) {
        self.total_em = 0.0;
        self.total_f1 = 0.0;
        self.count    = 0;
    }
}

// ─── CSV logger ───────────────────────────────────────────────────────────────
/// One row of metrics for a single evaluated batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetrics {
    /// Batch number (starts at 1)
    pub batch: usize,

    pub instances: usize,

    /// model_loss + exec_loss
    pub loss: f64,

    /// Mean negative marginal log-likelihood
    pub model_loss: f64,

    /// Mean auxiliary execution loss
    pub exec_loss: f64,

    /// Programs left out of the loss for an unmeasurable answer type
    pub skipped_programs: usize,

    /// Running averages up to and including this batch
    pub em: f64,
    pub f1: f64,
}

/// Logs batch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "batch,instances,loss,model_loss,exec_loss,skipped_programs,em,f1")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one batch as a new row.
    pub fn log(&self, m: &BatchMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{},{:.6},{:.6}",
            m.batch,
            m.instances,
            m.loss,
            m.model_loss,
            m.exec_loss,
            m.skipped_programs,
            m.em,
            m.f1,
        )?;

        tracing::debug!("Logged batch {} metrics: loss={:.4}, f1={:.4}", m.batch, m.loss, m.f1);
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
