// ============================================================
// Layer 3d — Side-argument Router
// ============================================================
// Injects gold supervision into decoded programs after search.
//
// Each function reads one side-arg slot (see SideSlot). Walking a
// program left to right, the Nth occurrence of a function using a
// slot receives the Nth gold value listed for that slot:
//
//   actions:  find_PassageAttention   find_PassageAttention
//   gold q:   [attn_1]
//   result:   question_attention=attn_1   (left unset)
//
// Running out of gold values is not an error; programs that use a
// slot more often than the annotations cover keep their own values.

use burn::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use crate::language::side_args::{Grounding, SideArgs, SideSlot};
use crate::language::types::Function;

/// Per-instance gold values, one list per slot, in occurrence order.
#[derive(Debug, Clone)]
pub struct GoldSupervision<B: Backend> {
    pub question_attentions: Vec<Tensor<B, 1>>,
    pub passage_attentions:  Vec<Tensor<B, 1>>,
    pub date_groundings:     Vec<Grounding<B>>,
    pub number_groundings:   Vec<Grounding<B>>,
}

impl<B: Backend> Default for GoldSupervision<B> {
    fn default() -> Self {
        Self {
            question_attentions: Vec::new(),
            passage_attentions:  Vec::new(),
            date_groundings:     Vec::new(),
            number_groundings:   Vec::new(),
        }
    }
}

impl<B: Backend> GoldSupervision<B> {
    pub fn is_empty(&self) -> bool {
        self.question_attentions.is_empty()
            && self.passage_attentions.is_empty()
            && self.date_groundings.is_empty()
            && self.number_groundings.is_empty()
    }

    /// Write the `occurrence`-th gold value for `slot` into `side_args`.
    /// Returns false when no such value exists.
    fn inject(&self, slot: SideSlot, occurrence: usize, side_args: &mut SideArgs<B>) -> bool {
        match slot {
            SideSlot::QuestionAttention => self
                .question_attentions
                .get(occurrence)
                .map(|v| side_args.question_attention = Some(v.clone()))
                .is_some(),
            SideSlot::PassageAttention => self
                .passage_attentions
                .get(occurrence)
                .map(|v| side_args.passage_attention = Some(v.clone()))
                .is_some(),
            SideSlot::DateGroundings => self
                .date_groundings
                .get(occurrence)
                .map(|g| side_args.groundings = Some(g.clone()))
                .is_some(),
            SideSlot::NumberGroundings => self
                .number_groundings
                .get(occurrence)
                .map(|g| side_args.groundings = Some(g.clone()))
                .is_some(),
        }
    }
}

/// The function an action selects, if it selects one.
pub fn action_function(action: &str) -> Option<Function> {
    action.split_once(" -> ").and_then(|(_, rhs)| rhs.parse().ok())
}

/// Route gold values into the side-args aligned with `actions`.
/// Returns the number of slots filled.
pub fn route_side_args<B: Backend>(
    actions:   &[String],
    side_args: &mut [SideArgs<B>],
    gold:      &GoldSupervision<B>,
) -> usize {
    let mut occurrences: HashMap<SideSlot, usize> = HashMap::new();
    let mut filled = 0;

    for (action, args) in actions.iter().zip(side_args.iter_mut()) {
        let Some(slot) = action_function(action).and_then(SideSlot::for_function) else {
            continue;
        };
        let seen = occurrences.entry(slot).or_insert(0);
        if gold.inject(slot, *seen, args) {
            filled += 1;
        } else {
            debug!(?slot, occurrence = *seen, "No gold value for slot occurrence");
        }
        *seen += 1;
    }

    filled
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::language::grammar::DropGrammar;
    use crate::ml::util;

    type B = NdArray;

    fn program(lf: &str) -> Vec<String> {
        DropGrammar::new().logical_form_to_action_sequence(lf).unwrap()
    }

    #[test]
    fn test_single_gold_value_fills_first_occurrence_only() {
        let device  = Default::default();
        let actions = program("(year_difference find_PassageAttention find_PassageAttention)");
        let mut side_args = vec![SideArgs::<B>::default(); actions.len()];
        let gold = GoldSupervision {
            question_attentions: vec![util::vector::<B>(vec![1.0, 0.0], &device)],
            ..GoldSupervision::default()
        };

        let filled = route_side_args(&actions, &mut side_args, &gold);

        assert_eq!(filled, 1);
        assert!(side_args[2].question_attention.is_some());
        assert!(side_args[3].is_empty());
    }

    #[test]
    fn test_occurrences_receive_values_in_order() {
        let device  = Default::default();
        let actions = program("(find_passageSpanAnswer (compare_date_lesser_than find_PassageAttention find_PassageAttention))");
        let mut side_args = vec![SideArgs::<B>::default(); actions.len()];
        let gold = GoldSupervision {
            question_attentions: vec![
                util::vector::<B>(vec![1.0, 0.0], &device),
                util::vector::<B>(vec![0.0, 1.0], &device),
            ],
            passage_attentions: vec![util::vector::<B>(vec![0.5, 0.5, 0.0], &device)],
            date_groundings: vec![Grounding {
                first:  util::vector::<B>(vec![1.0, 0.0], &device),
                second: util::vector::<B>(vec![0.0, 1.0], &device),
            }],
            ..GoldSupervision::default()
        };

        assert_eq!(route_side_args(&actions, &mut side_args, &gold), 4);

        assert!(side_args[0].is_empty());
        assert!(side_args[1].passage_attention.is_some());
        assert!(side_args[2].groundings.is_some());
        let first  = util::to_vec(side_args[3].question_attention.clone().unwrap());
        let second = util::to_vec(side_args[4].question_attention.clone().unwrap());
        assert_eq!(first, vec![1.0, 0.0]);
        assert_eq!(second, vec![0.0, 1.0]);
    }

    #[test]
    fn test_number_groundings_do_not_feed_date_comparisons() {
        let device  = Default::default();
        let actions = program("(find_passageSpanAnswer (compare_date_greater_than find_PassageAttention find_PassageAttention))");
        let mut side_args = vec![SideArgs::<B>::default(); actions.len()];
        let gold = GoldSupervision {
            number_groundings: vec![Grounding {
                first:  util::vector::<B>(vec![1.0], &device),
                second: util::vector::<B>(vec![1.0], &device),
            }],
            ..GoldSupervision::default()
        };
        assert_eq!(route_side_args(&actions, &mut side_args, &gold), 0);
        assert!(side_args.iter().all(SideArgs::is_empty));
    }

    #[test]
    fn test_action_function_ignores_start_actions() {
        assert_eq!(action_function("@start@ -> YearDifference"), None);
        assert_eq!(
            action_function("PassageAttention -> compare_num_lesser_than"),
            Some(Function::CompareNumLesserThan)
        );
    }

    #[test]
    fn test_question_span_answer_receives_question_attention() {
        let device  = Default::default();
        let actions = program("find_questionSpanAnswer");
        let mut side_args = vec![SideArgs::<B>::default(); actions.len()];
        let gold = GoldSupervision {
            question_attentions: vec![util::vector::<B>(vec![0.0, 1.0, 0.0], &device)],
            ..GoldSupervision::default()
        };
        assert_eq!(route_side_args(&actions, &mut side_args, &gold), 1);
        assert!(side_args[1].question_attention.is_some());
    }
}
