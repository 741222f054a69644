// ============================================================
// Layer 5 — Answer Rendering
// ============================================================
// Converts a denotation into the answer string that is compared
// against the gold answers.
//
//   PassageSpanAnswer  → best (start, end) span, cut out of the
//                        passage text via token char offsets
//   QuestionSpanAnswer → same, over the question
//   YearDifference     → the most likely gap as a number; the
//                        invalid bucket renders as ""

use burn::prelude::*;

use crate::domain::instance::DropInstance;
use crate::language::denotation::{Denotation, DenotationValue, INVALID_YEAR_BUCKET};
use crate::ml::util::{self, MASK_FILL};

/// Longest span considered, in tokens.
pub const MAX_ANSWER_LEN: usize = 30;

/// Span maximising start_logit + end_logit with start ≤ end.
/// Positions at MASK_FILL are never chosen.
pub fn best_span(start_logits: &[f32], end_logits: &[f32]) -> Option<(usize, usize)> {
    let len = start_logits.len().min(end_logits.len());
    let mut best: Option<(usize, usize, f32)> = None;

    for s in 0..len {
        if start_logits[s] <= MASK_FILL {
            continue;
        }
        for e in s..(s + MAX_ANSWER_LEN).min(len) {
            if end_logits[e] <= MASK_FILL {
                continue;
            }
            let score = start_logits[s] + end_logits[e];
            if best.map_or(true, |(_, _, b)| score > b) {
                best = Some((s, e, score));
            }
        }
    }

    best.map(|(s, e, _)| (s, e))
}

/// Text of tokens `start..=end`, preferring the original characters.
pub fn span_text(
    text:    &str,
    tokens:  &[String],
    offsets: &[[usize; 2]],
    start:   usize,
    end:     usize,
) -> String {
    if let (Some(first), Some(last)) = (offsets.get(start), offsets.get(end)) {
        if first[0] <= last[1] {
            let piece: String = text.chars().skip(first[0]).take(last[1] - first[0]).collect();
            if !piece.trim().is_empty() {
                return piece.trim().to_string();
            }
        }
    }
    tokens
        .get(start..=end)
        .map(|t| t.join(" "))
        .unwrap_or_default()
}

fn render_span<B: Backend>(
    start_logits: &Tensor<B, 1>,
    end_logits:   &Tensor<B, 1>,
    text:         &str,
    tokens:       &[String],
    offsets:      &[[usize; 2]],
) -> String {
    let start = util::to_vec(start_logits.clone());
    let end   = util::to_vec(end_logits.clone());
    match best_span(&start, &end) {
        Some((s, e)) => span_text(text, tokens, offsets, s, e),
        None => String::new(),
    }
}

pub fn answer_string<B: Backend>(denotation: &Denotation<B>, instance: &DropInstance) -> String {
    match &denotation.value {
        DenotationValue::PassageSpanAnswer { start_logits, end_logits } => render_span(
            start_logits,
            end_logits,
            &instance.passage,
            &instance.passage_tokens,
            &instance.passage_token_offsets,
        ),
        DenotationValue::QuestionSpanAnswer { start_logits, end_logits } => render_span(
            start_logits,
            end_logits,
            &instance.question,
            &instance.question_tokens,
            &instance.question_token_offsets,
        ),
        DenotationValue::YearDifference { distribution } => {
            match util::argmax(&util::to_vec(distribution.clone())) {
                Some(INVALID_YEAR_BUCKET) | None => String::new(),
                Some(gap) => gap.to_string(),
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::instance::GoldAnswer;
    use crate::language::denotation::YEAR_DIFFERENCE_BUCKETS;

    type B = NdArray;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_best_span_respects_order_and_mask() {
        let start = vec![0.0, 3.0, 1.0, MASK_FILL];
        let end   = vec![5.0, 0.0, 4.0, 9.0];
        // end 0 cannot follow start 1; position 3 is masked
        assert_eq!(best_span(&start, &end), Some((1, 2)));
        assert_eq!(best_span(&[MASK_FILL], &[MASK_FILL]), None);
    }

    #[test]
    fn test_best_span_ties_keep_the_earliest() {
        let start = vec![1.0, 1.0];
        let end   = vec![1.0, 1.0];
        assert_eq!(best_span(&start, &end), Some((0, 0)));
        // (0, 0) and (1, 2) both score 5
        assert_eq!(best_span(&[0.0, 3.0, 1.0], &[5.0, 0.0, 2.0]), Some((0, 0)));
    }

    #[test]
    fn test_span_text_uses_offsets() {
        let text    = "The Treaty of Paris, signed";
        let toks    = tokens("The Treaty of Paris , signed");
        let offsets = vec![[0, 3], [4, 10], [11, 13], [14, 19], [19, 20], [21, 27]];
        assert_eq!(span_text(text, &toks, &offsets, 1, 3), "Treaty of Paris");
    }

    #[test]
    fn test_span_text_falls_back_to_tokens() {
        let toks = tokens("the war of 1812");
        assert_eq!(span_text("", &toks, &[], 1, 3), "war of 1812");
        assert_eq!(span_text("", &toks, &[], 3, 9), "");
    }

    fn year_instance() -> DropInstance {
        DropInstance {
            query_id:                "q".into(),
            question:                String::new(),
            passage:                 String::new(),
            question_tokens:         vec![],
            passage_tokens:          vec![],
            question_token_offsets:  vec![],
            passage_token_offsets:   vec![],
            passage_date_values:     vec![],
            passage_token_to_date:   vec![],
            passage_number_values:   vec![],
            passage_token_to_number: vec![],
            answer:                  GoldAnswer::default(),
            question_type:           None,
            strongly_supervised:     false,
            date_groundings:         None,
            number_groundings:       None,
        }
    }

    #[test]
    fn test_year_difference_renders_most_likely_gap() {
        let device = Default::default();
        let mut probs = vec![0.0f32; YEAR_DIFFERENCE_BUCKETS];
        probs[7] = 0.9;
        probs[INVALID_YEAR_BUCKET] = 0.1;
        let denotation = Denotation::<B> {
            value: DenotationValue::YearDifference { distribution: util::vector(probs, &device) },
            loss:  util::scalar(0.0, &device),
        };
        assert_eq!(answer_string(&denotation, &year_instance()), "7");

        let mut invalid = vec![0.0f32; YEAR_DIFFERENCE_BUCKETS];
        invalid[INVALID_YEAR_BUCKET] = 1.0;
        let denotation = Denotation::<B> {
            value: DenotationValue::YearDifference { distribution: util::vector(invalid, &device) },
            loss:  util::scalar(0.0, &device),
        };
        assert_eq!(answer_string(&denotation, &year_instance()), "");
    }
}
