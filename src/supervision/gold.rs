// ============================================================
// Layer 3d — Gold Programs and Gold Attentions
// ============================================================
// Heuristic supervision derived from the question text and the
// gold answer:
//
//   GoldProgramRegistry  — question type → gold action sequence
//   gold_question_attentions_for_date_compare
//                        — "…, event A or event B ?" → two attentions
//   gold_passage_attention
//                        — normalised indicator of the answer spans
//   gold_supervision     — all of the above plus the annotated
//                          groundings, as tensors for the router

use burn::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::instance::{is_valid_span, DropInstance, EventGroundings, QuestionType, TokenSpan};
use crate::language::error::LanguageError;
use crate::language::grammar::DropGrammar;
use crate::language::side_args::Grounding;
use crate::ml::util;
use crate::supervision::router::GoldSupervision;

pub(crate) const DATE_LESSER_CUES:   [&str; 4] = ["first", "earlier", "forst", "firts"];
pub(crate) const DATE_GREATER_CUES:  [&str; 3] = ["later", "last", "second"];
pub(crate) const NUMBER_LESSER_CUES: [&str; 5] = ["fewer", "less", "smaller", "lowest", "least"];

/// Tokens that may open the first event when no separator is found.
const EVENT_CUES: [&str; 4] = ["first", "second", "last", "later"];
const EVENT_SEPARATORS: [&str; 3] = [",", ":", "-"];

fn has_any(tokens: &[String], cues: &[&str]) -> bool {
    tokens.iter().any(|t| cues.contains(&t.as_str()))
}

/// Logical form for a date-comparison question.
pub fn date_compare_logical_form(question_tokens: &[String]) -> String {
    let comparison = if has_any(question_tokens, &DATE_LESSER_CUES) {
        "compare_date_lesser_than"
    } else if has_any(question_tokens, &DATE_GREATER_CUES) {
        "compare_date_greater_than"
    } else {
        debug!("No comparison cue in date question, defaulting to greater-than");
        "compare_date_greater_than"
    };
    format!("(find_passageSpanAnswer ({comparison} find_PassageAttention find_PassageAttention))")
}

pub fn number_compare_logical_form(question_tokens: &[String]) -> String {
    let comparison = if has_any(question_tokens, &NUMBER_LESSER_CUES) {
        "compare_num_lesser_than"
    } else {
        "compare_num_greater_than"
    };
    format!("(find_passageSpanAnswer ({comparison} find_PassageAttention find_PassageAttention))")
}

pub fn year_difference_logical_form(_question_tokens: &[String]) -> String {
    "(year_difference find_PassageAttention find_PassageAttention)".to_string()
}

// ─── GoldProgramRegistry ──────────────────────────────────────────────────────
/// Builds a gold action sequence from lowercased question tokens.
pub type GoldProgramBuilder =
    Box<dyn Fn(&[String]) -> Result<Vec<String>, LanguageError> + Send + Sync>;

pub struct GoldProgramRegistry {
    builders: HashMap<QuestionType, GoldProgramBuilder>,
}

impl GoldProgramRegistry {
    pub fn empty() -> Self {
        Self { builders: HashMap::new() }
    }

    /// Registry with the builders for every known question type.
    pub fn new(grammar: &DropGrammar) -> Self {
        let mut registry = Self::empty();
        let forms: [(QuestionType, fn(&[String]) -> String); 3] = [
            (QuestionType::DateComparison,   date_compare_logical_form),
            (QuestionType::NumberComparison, number_compare_logical_form),
            (QuestionType::YearDifference,   year_difference_logical_form),
        ];
        for (question_type, logical_form) in forms {
            let grammar = grammar.clone();
            registry.register(
                question_type,
                Box::new(move |tokens: &[String]| grammar.logical_form_to_action_sequence(&logical_form(tokens))),
            );
        }
        registry
    }

    pub fn register(&mut self, question_type: QuestionType, builder: GoldProgramBuilder) {
        self.builders.insert(question_type, builder);
    }

    /// Gold action sequence for a question, if its type has a builder.
    pub fn gold_actions(
        &self,
        question_type:   QuestionType,
        question_tokens: &[String],
    ) -> Option<Result<Vec<String>, LanguageError>> {
        self.builders.get(&question_type).map(|build| build(question_tokens))
    }
}

// ─── Gold attentions ──────────────────────────────────────────────────────────
fn normalised_indicator(len: usize, range: std::ops::Range<usize>) -> Option<Vec<f32>> {
    if range.is_empty() || range.end > len {
        return None;
    }
    let mass = range.len() as f32;
    Some((0..len).map(|i| if range.contains(&i) { 1.0 / mass } else { 0.0 }).collect())
}

/// Question attentions for the two events of "Which happened
/// first, event A or event B?".
///
/// The second event runs from after `or` up to the final token;
/// the first from after the first separator (or event cue word) up
/// to `or`. Returns None for questions of any other shape.
pub fn gold_question_attentions_for_date_compare(
    question_tokens: &[String],
) -> Option<(Vec<f32>, Vec<f32>)> {
    let tokens: Vec<String> = question_tokens.iter().map(|t| t.to_lowercase()).collect();
    let len = tokens.len();

    let mut ors = tokens.iter().enumerate().filter(|(_, t)| *t == "or").map(|(i, _)| i);
    let or_idx = ors.next()?;
    if ors.next().is_some() {
        return None;
    }

    let separator = tokens
        .iter()
        .position(|t| EVENT_SEPARATORS.contains(&t.as_str()))
        .filter(|&s| s < or_idx && or_idx - s > 1);
    let split_idx = separator.or_else(|| {
        EVENT_CUES
            .iter()
            .find_map(|cue| tokens.iter().position(|t| t == cue))
    })?;

    let first  = normalised_indicator(len, split_idx + 1..or_idx)?;
    let second = normalised_indicator(len, or_idx + 1..len.saturating_sub(1))?;
    Some((first, second))
}

/// Normalised indicator of every valid gold span; padding rows and
/// out-of-range spans are ignored.
pub fn gold_passage_attention(spans: &[TokenSpan], passage_len: usize) -> Option<Vec<f32>> {
    let mut attention = vec![0.0f32; passage_len];
    for span in spans.iter().filter(|s| is_valid_span(s)) {
        let start = span[0] as usize;
        let end   = (span[1] as usize).min(passage_len.saturating_sub(1));
        for value in attention.iter_mut().take(end + 1).skip(start) {
            *value += 1.0;
        }
    }
    let total: f32 = attention.iter().sum();
    if total <= 0.0 {
        return None;
    }
    attention.iter_mut().for_each(|v| *v /= total);
    Some(attention)
}

fn grounding<B: Backend>(groundings: &EventGroundings, device: &B::Device) -> Grounding<B> {
    Grounding {
        first:  util::vector(groundings.first.clone(), device),
        second: util::vector(groundings.second.clone(), device),
    }
}

/// Every gold value available for an instance, in slot order.
pub fn gold_supervision<B: Backend>(instance: &DropInstance, device: &B::Device) -> GoldSupervision<B> {
    let mut gold = GoldSupervision::default();

    if instance.question_type == Some(QuestionType::DateComparison) {
        match gold_question_attentions_for_date_compare(&instance.question_tokens) {
            Some((first, second)) => {
                gold.question_attentions.push(util::vector(first, device));
                gold.question_attentions.push(util::vector(second, device));
            }
            None => debug!(query_id = %instance.query_id, "Date question does not match the event pattern"),
        }
    }

    if let Some(attention) = gold_passage_attention(&instance.answer.passage_spans, instance.passage_tokens.len()) {
        gold.passage_attentions.push(util::vector(attention, device));
    }
    if let Some(g) = &instance.date_groundings {
        gold.date_groundings.push(grounding(g, device));
    }
    if let Some(g) = &instance.number_groundings {
        gold.number_groundings.push(grounding(g, device));
    }

    gold
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::PADDED_SPAN;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_date_compare_cues() {
        assert!(date_compare_logical_form(&tokens("which happened first , a or b ?")).contains("lesser"));
        assert!(date_compare_logical_form(&tokens("which happened later , a or b ?")).contains("greater"));
        assert!(date_compare_logical_form(&tokens("which came , a or b ?")).contains("greater"));
    }

    #[test]
    fn test_number_compare_cues() {
        assert!(number_compare_logical_form(&tokens("who scored fewer points ?")).contains("lesser"));
        assert!(number_compare_logical_form(&tokens("who scored more points ?")).contains("greater"));
    }

    #[test]
    fn test_registry_builds_grammatical_programs() {
        let grammar  = DropGrammar::new();
        let registry = GoldProgramRegistry::new(&grammar);
        let question = tokens("how many years after a did b happen ?");
        let actions  = registry
            .gold_actions(QuestionType::YearDifference, &question)
            .unwrap()
            .unwrap();
        assert_eq!(actions[0], "@start@ -> YearDifference");
        assert!(grammar.parse_actions(&actions).is_ok());
        assert!(GoldProgramRegistry::empty()
            .gold_actions(QuestionType::DateComparison, &question)
            .is_none());
    }

    #[test]
    fn test_date_compare_question_attention() {
        // 0     1        2     3 4   5    6  7      8 9
        let q = tokens("which happened first , the war or the treaty ?");
        let (first, second) = gold_question_attentions_for_date_compare(&q).unwrap();
        assert_eq!(first.len(), q.len());
        assert_eq!(first[4], 0.5);
        assert_eq!(first[5], 0.5);
        assert_eq!(second[7], 0.5);
        assert_eq!(second[8], 0.5);
        assert_eq!(second[9], 0.0);
    }

    #[test]
    fn test_date_compare_question_attention_falls_back_to_cue() {
        let q = tokens("what happened first the war or the treaty ?");
        let (first, _) = gold_question_attentions_for_date_compare(&q).unwrap();
        assert!((first[3] - 0.5).abs() < 1e-6);
        assert_eq!(first[2], 0.0);
    }

    #[test]
    fn test_unmatched_question_shape_yields_none() {
        assert!(gold_question_attentions_for_date_compare(&tokens("who won the game ?")).is_none());
        assert!(gold_question_attentions_for_date_compare(&tokens("a or b or c ?")).is_none());
        assert!(gold_question_attentions_for_date_compare(&tokens("which , or y ?")).is_none());
    }

    #[test]
    fn test_gold_passage_attention_ignores_padding() {
        let plain  = gold_passage_attention(&[[1, 2]], 5).unwrap();
        let padded = gold_passage_attention(&[[1, 2], PADDED_SPAN, PADDED_SPAN], 5).unwrap();
        assert_eq!(plain, padded);
        assert_eq!(plain, vec![0.0, 0.5, 0.5, 0.0, 0.0]);
        assert!(gold_passage_attention(&[PADDED_SPAN], 5).is_none());
    }
}
