// ============================================================
// Layer 5 — Marginal Likelihood Losses
// ============================================================
// The parser never sees which program is correct, only which
// answers are. Each instance's loss marginalises over both:
//
//   log p(answer) = logsumexp_programs [ log p(program)
//                                      + log p(answer | denotation) ]
//
//   log p(program)            log-softmax of the finished scores
//   log p(answer | denotation) logsumexp over acceptable gold spans
//                              or year gaps
//
// Padded gold rows (-1) are filled with MASK_FILL before the
// logsumexp, so appending padding never changes the result.
// Instances decoded under gold-program constraints use the plain
// negative logsumexp of their raw program scores instead.

use burn::prelude::*;

use crate::domain::instance::{is_valid_span, GoldAnswer, TokenSpan};
use crate::language::denotation::{Denotation, DenotationValue, MAX_YEAR_DIFFERENCE};
use crate::language::types::NodeType;
use crate::ml::error::LossError;
use crate::ml::util::{self, LOG_EPS, MASK_FILL};

// ─── Denotation likelihoods ───────────────────────────────────────────────────
fn in_range(span: &TokenSpan, len: usize) -> bool {
    is_valid_span(span) && (span[1] as usize) < len
}

/// True when at least one row of `spans` fits a sequence of `len` tokens.
pub fn has_usable_span(spans: &[TokenSpan], len: usize) -> bool {
    spans.iter().any(|s| in_range(s, len))
}

/// log Σ_spans p(start) p(end) over the valid rows of `spans`.
pub fn span_log_likelihood<B: Backend>(
    start_logits: Tensor<B, 1>,
    end_logits:   Tensor<B, 1>,
    spans:        &[TokenSpan],
) -> Tensor<B, 1> {
    let device = start_logits.device();
    let [len]  = start_logits.dims();

    if spans.is_empty() {
        return util::scalar(MASK_FILL, &device);
    }

    let keep: Vec<bool> = spans
        .iter()
        .map(|s| in_range(s, len))
        .collect();
    // padded rows index position 0 and are masked afterwards
    let index = |col: usize| -> Vec<i64> {
        spans
            .iter()
            .zip(&keep)
            .map(|(s, &k)| if k { s[col] } else { 0 })
            .collect()
    };
    let rows   = spans.len();
    let starts = Tensor::<B, 1, Int>::from_data(TensorData::new(index(0), [rows]), &device);
    let ends   = Tensor::<B, 1, Int>::from_data(TensorData::new(index(1), [rows]), &device);

    let log_start = util::log_softmax(start_logits).select(0, starts);
    let log_end   = util::log_softmax(end_logits).select(0, ends);
    let per_span  = util::mask_logits(log_start.add(log_end), &keep);

    util::logsumexp(per_span)
}

/// log Σ_gaps p(gap) over the acceptable year differences.
pub fn year_difference_log_likelihood<B: Backend>(
    distribution: Tensor<B, 1>,
    gold_gaps:    &[i64],
) -> Tensor<B, 1> {
    let device = distribution.device();
    if gold_gaps.is_empty() {
        return util::scalar(MASK_FILL, &device);
    }

    let keep: Vec<bool> = gold_gaps
        .iter()
        .map(|&g| (0..=MAX_YEAR_DIFFERENCE as i64).contains(&g))
        .collect();
    let index: Vec<i64> = gold_gaps
        .iter()
        .zip(&keep)
        .map(|(&g, &k)| if k { g } else { 0 })
        .collect();
    let rows    = index.len();
    let buckets = Tensor::<B, 1, Int>::from_data(TensorData::new(index, [rows]), &device);

    let log_probs = distribution.add_scalar(LOG_EPS).log().select(0, buckets);
    util::logsumexp(util::mask_logits(log_probs, &keep))
}

/// Log-likelihood that a denotation matches some gold answer.
pub fn denotation_log_likelihood<B: Backend>(
    denotation: &Denotation<B>,
    answer:     &GoldAnswer,
) -> Result<Tensor<B, 1>, LossError> {
    let ambiguous = |answer_type| LossError::AmbiguousAnswerType { answer_type };
    let spans = |start_logits: &Tensor<B, 1>, end_logits: &Tensor<B, 1>, gold: &[TokenSpan], answer_type| {
        let [len] = start_logits.dims();
        if !has_usable_span(gold, len) {
            return Err(LossError::NoUsableGold { answer_type });
        }
        Ok(span_log_likelihood(start_logits.clone(), end_logits.clone(), gold))
    };
    match &denotation.value {
        DenotationValue::PassageSpanAnswer { start_logits, end_logits } => {
            if !answer.has_passage_spans() {
                return Err(ambiguous(NodeType::PassageSpanAnswer));
            }
            spans(start_logits, end_logits, &answer.passage_spans, NodeType::PassageSpanAnswer)
        }
        DenotationValue::QuestionSpanAnswer { start_logits, end_logits } => {
            if !answer.has_question_spans() {
                return Err(ambiguous(NodeType::QuestionSpanAnswer));
            }
            spans(start_logits, end_logits, &answer.question_spans, NodeType::QuestionSpanAnswer)
        }
        DenotationValue::YearDifference { distribution } => {
            if !answer.has_year_differences() {
                return Err(ambiguous(NodeType::YearDifference));
            }
            let usable = answer
                .year_differences
                .iter()
                .any(|g| (0..=MAX_YEAR_DIFFERENCE as i64).contains(g));
            if !usable {
                return Err(LossError::NoUsableGold { answer_type: NodeType::YearDifference });
            }
            Ok(year_difference_log_likelihood(distribution.clone(), &answer.year_differences))
        }
    }
}

// ─── Program marginalisation ──────────────────────────────────────────────────
/// One finished program of an instance. `denotation_ll` is None
/// when the program was skipped (unexecutable or unmeasurable).
pub struct ProgramOutcome<B: Backend> {
    pub score:         Tensor<B, 1>,
    pub denotation_ll: Option<Tensor<B, 1>>,
}

/// Normalise raw finished scores into program log-probabilities.
pub fn program_log_probs<B: Backend>(scores: Vec<Tensor<B, 1>>) -> Option<Tensor<B, 1>> {
    if scores.is_empty() {
        return None;
    }
    Some(util::log_softmax(Tensor::cat(scores, 0)))
}

/// Instance marginal log-likelihood over its finished programs.
/// Program probabilities are normalised over every finished
/// program, skipped ones included. None if nothing was measurable.
pub fn marginal_log_likelihood<B: Backend>(outcomes: Vec<ProgramOutcome<B>>) -> Option<Tensor<B, 1>> {
    let (scores, lls): (Vec<_>, Vec<_>) =
        outcomes.into_iter().map(|o| (o.score, o.denotation_ll)).unzip();
    let log_probs = program_log_probs(scores)?;

    let joint: Vec<Tensor<B, 1>> = lls
        .into_iter()
        .enumerate()
        .filter_map(|(i, ll)| ll.map(|ll| log_probs.clone().slice([i..i + 1]).add(ll)))
        .collect();
    if joint.is_empty() {
        return None;
    }
    Some(util::logsumexp(Tensor::cat(joint, 0)))
}

/// Log-likelihood of gold-constrained completions: logsumexp of
/// their raw scores.
pub fn supervised_log_likelihood<B: Backend>(scores: Vec<Tensor<B, 1>>) -> Option<Tensor<B, 1>> {
    if scores.is_empty() {
        return None;
    }
    Some(util::logsumexp(Tensor::cat(scores, 0)))
}

// ─── Batch aggregation ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct BatchLoss<B: Backend> {
    /// model_loss + exec_loss, shape [1]
    pub loss:             Tensor<B, 1>,
    pub model_loss:       f32,
    pub exec_loss:        f32,
    /// Instances that contributed a likelihood term.
    pub instances:        usize,
    /// Programs dropped for an unmeasurable answer type.
    pub skipped_programs: usize,
}

/// Collects per-instance and per-program terms for one batch.
pub struct LossAccumulator<B: Backend> {
    instance_terms:   Vec<Tensor<B, 1>>,
    exec_terms:       Vec<Tensor<B, 1>>,
    skipped_programs: usize,
}

impl<B: Backend> Default for LossAccumulator<B> {
    fn default() -> Self {
        Self { instance_terms: Vec::new(), exec_terms: Vec::new(), skipped_programs: 0 }
    }
}

impl<B: Backend> LossAccumulator<B> {
    /// Record an instance's log-likelihood; the loss is its negation.
    pub fn add_instance(&mut self, log_likelihood: Tensor<B, 1>) {
        self.instance_terms.push(log_likelihood.neg());
    }

    pub fn add_execution_loss(&mut self, loss: Tensor<B, 1>) {
        self.exec_terms.push(loss);
    }

    pub fn skip_program(&mut self) {
        self.skipped_programs += 1;
    }

    /// The model loss is averaged over the whole batch, instances
    /// without a likelihood term included. The execution loss is
    /// averaged over the programs that produced one.
    pub fn finish(self, batch_size: usize, device: &B::Device) -> BatchLoss<B> {
        let instances = self.instance_terms.len();
        let exec_count = self.exec_terms.len().max(1) as f32;

        let model = util::sum_all(self.instance_terms, device).div_scalar(batch_size.max(1) as f32);
        let exec = util::sum_all(self.exec_terms, device).div_scalar(exec_count);
        BatchLoss {
            model_loss:       util::scalar_value(model.clone().detach()),
            exec_loss:        util::scalar_value(exec.clone().detach()),
            loss:             model.add(exec),
            instances,
            skipped_programs: self.skipped_programs,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::instance::PADDED_SPAN;
    use crate::language::denotation::YEAR_DIFFERENCE_BUCKETS;

    type B = NdArray;

    fn logits(values: Vec<f32>) -> Tensor<B, 1> {
        util::vector::<B>(values, &Default::default())
    }

    #[test]
    fn test_span_likelihood_is_padding_invariant() {
        let start = vec![0.1, 2.0, -1.0, 0.5];
        let end   = vec![-0.3, 0.2, 1.7, 0.0];
        let plain = util::scalar_value(span_log_likelihood(
            logits(start.clone()), logits(end.clone()), &[[1, 2], [0, 3]],
        ));
        let padded = util::scalar_value(span_log_likelihood(
            logits(start), logits(end), &[[1, 2], PADDED_SPAN, [0, 3], PADDED_SPAN, PADDED_SPAN],
        ));
        assert!((plain - padded).abs() < 1e-6);
    }

    #[test]
    fn test_span_likelihood_of_single_span() {
        let start = vec![0.0, 1.0, 0.0];
        let end   = vec![0.0, 0.0, 1.0];
        let got   = util::scalar_value(span_log_likelihood(logits(start), logits(end), &[[1, 2]]));
        let z     = (2.0f32 + 1.0f32.exp()).ln();
        let want  = (1.0 - z) + (1.0 - z);
        assert!((got - want).abs() < 1e-5);
    }

    #[test]
    fn test_year_difference_likelihood_ignores_padding() {
        let mut probs = vec![0.0f32; YEAR_DIFFERENCE_BUCKETS];
        probs[3] = 0.25;
        probs[4] = 0.75;
        let got = util::scalar_value(year_difference_log_likelihood(logits(probs.clone()), &[3, 4, -1]));
        assert!(got.abs() < 1e-4);
        let one = util::scalar_value(year_difference_log_likelihood(logits(probs), &[4]));
        assert!((one - 0.75f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_missing_gold_type_is_ambiguous() {
        let device = Default::default();
        let denotation = Denotation::<B> {
            value: DenotationValue::YearDifference {
                distribution: util::vector(vec![0.0; YEAR_DIFFERENCE_BUCKETS], &device),
            },
            loss: util::scalar(0.0, &device),
        };
        let answer = GoldAnswer { passage_spans: vec![[0, 0]], ..GoldAnswer::default() };
        assert_eq!(
            denotation_log_likelihood(&denotation, &answer).unwrap_err(),
            LossError::AmbiguousAnswerType { answer_type: NodeType::YearDifference }
        );
    }

    #[test]
    fn test_marginal_likelihood_sums_over_programs() {
        // two equally likely programs, answer probabilities 0.5 and 0.1
        let outcomes = vec![
            ProgramOutcome { score: logits(vec![-1.0]), denotation_ll: Some(logits(vec![0.5f32.ln()])) },
            ProgramOutcome { score: logits(vec![-1.0]), denotation_ll: Some(logits(vec![0.1f32.ln()])) },
        ];
        let got = util::scalar_value(marginal_log_likelihood(outcomes).unwrap());
        assert!((got - 0.3f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_skipped_programs_keep_their_probability_mass() {
        let outcomes = vec![
            ProgramOutcome { score: logits(vec![0.0]), denotation_ll: Some(logits(vec![0.0])) },
            ProgramOutcome { score: logits(vec![0.0]), denotation_ll: None },
        ];
        let got = util::scalar_value(marginal_log_likelihood(outcomes).unwrap());
        assert!((got - 0.5f32.ln()).abs() < 1e-5);

        let none = vec![ProgramOutcome::<B> { score: logits(vec![0.0]), denotation_ll: None }];
        assert!(marginal_log_likelihood(none).is_none());
    }

    #[test]
    fn test_supervised_likelihood_uses_raw_scores() {
        let got = util::scalar_value(supervised_log_likelihood(vec![logits(vec![-1.0]), logits(vec![-1.0])]).unwrap());
        assert!((got - (-1.0 + 2.0f32.ln())).abs() < 1e-5);
    }

    #[test]
    fn test_accumulator_averages_terms() {
        let device = Default::default();
        let mut acc = LossAccumulator::<B>::default();
        acc.add_instance(logits(vec![-1.0]));
        acc.add_instance(logits(vec![-3.0]));
        acc.add_execution_loss(logits(vec![0.5]));
        acc.skip_program();
        let loss = acc.finish(2, &device);
        assert!((loss.model_loss - 2.0).abs() < 1e-6);
        assert!((loss.exec_loss - 0.5).abs() < 1e-6);
        assert!((util::scalar_value(loss.loss) - 2.5).abs() < 1e-6);
        assert_eq!(loss.instances, 2);
        assert_eq!(loss.skipped_programs, 1);
    }

    #[test]
    fn test_model_loss_is_averaged_over_the_batch() {
        let device = Default::default();
        let mut acc = LossAccumulator::<B>::default();
        acc.add_instance(logits(vec![0.5f32.ln()]));
        let loss = acc.finish(2, &device);
        assert!((loss.model_loss - 0.5 * 2.0f32.ln()).abs() < 1e-6);
        assert_eq!(loss.instances, 1);
    }

    #[test]
    fn test_empty_batch_has_zero_loss() {
        let loss = LossAccumulator::<B>::default().finish(0, &Default::default());
        assert_eq!(loss.model_loss, 0.0);
        assert_eq!(loss.exec_loss, 0.0);
    }

    #[test]
    fn test_out_of_range_gold_spans_are_unusable() {
        let device = Default::default();
        let denotation = Denotation::<B> {
            value: DenotationValue::PassageSpanAnswer {
                start_logits: logits(vec![0.0, 1.0, 0.0]),
                end_logits:   logits(vec![0.0, 0.0, 1.0]),
            },
            loss: util::scalar(0.0, &device),
        };
        let answer = GoldAnswer { passage_spans: vec![[4, 6], PADDED_SPAN], ..GoldAnswer::default() };
        assert_eq!(
            denotation_log_likelihood(&denotation, &answer).unwrap_err(),
            LossError::NoUsableGold { answer_type: NodeType::PassageSpanAnswer }
        );

        let answer = GoldAnswer { passage_spans: vec![[4, 6], [1, 2]], ..GoldAnswer::default() };
        let ll = util::scalar_value(denotation_log_likelihood(&denotation, &answer).unwrap());
        assert!(ll.is_finite() && ll > -10.0);
    }

    #[test]
    fn test_year_gaps_beyond_buckets_are_unusable() {
        let device = Default::default();
        let denotation = Denotation::<B> {
            value: DenotationValue::YearDifference {
                distribution: util::vector(vec![0.1; YEAR_DIFFERENCE_BUCKETS], &device),
            },
            loss: util::scalar(0.0, &device),
        };
        let answer = GoldAnswer { year_differences: vec![10_000], ..GoldAnswer::default() };
        assert_eq!(
            denotation_log_likelihood(&denotation, &answer).unwrap_err(),
            LossError::NoUsableGold { answer_type: NodeType::YearDifference }
        );
    }
}
