// ============================================================
// Layer 5 — Lexical Cue Transition Function
// ============================================================
// A transition function with no learned parameters. Each instance
// gets a table of action logits built from cue words in its
// question:
//
//   "how many years …"          → @start@ -> YearDifference
//   "first" / "earlier" …       → compare_date_lesser_than
//   "later" / "last" …          → compare_date_greater_than
//   "fewer" / "most" …          → compare_num_*
//
// Date cues only count in choice questions ("… A or B ?").
//
// At each step the logits of the valid actions are log-softmaxed,
// so every state's successors form a proper distribution. Each
// comparison already in the history lowers the logit of another
// one, which keeps beams from filling up with deep nestings.

use burn::prelude::*;
use std::sync::Arc;

use crate::language::grammar::ProductionTable;
use crate::language::side_args::SideArgs;
use crate::language::types::{Function, NodeType};
use crate::ml::util;
use crate::search::error::SearchError;
use crate::search::state::SearchState;
use crate::search::transition::{ScoredAction, TransitionFunction};
use crate::supervision::gold::{DATE_GREATER_CUES, DATE_LESSER_CUES, NUMBER_LESSER_CUES};

const NUMBER_GREATER_CUES: [&str; 6] = ["more", "most", "larger", "longest", "higher", "highest"];
const YEAR_CUES: [&str; 2] = ["year", "years"];

const CUE_BONUS:       f32 = 2.0;
const LEAF_BONUS:      f32 = 1.0;
const NESTING_PENALTY: f32 = 3.0;

fn has_any(tokens: &[String], cues: &[&str]) -> bool {
    tokens.iter().any(|t| cues.contains(&t.as_str()))
}

fn is_comparison(function: Function) -> bool {
    matches!(
        function,
        Function::CompareDateLesserThan
            | Function::CompareDateGreaterThan
            | Function::CompareNumLesserThan
            | Function::CompareNumGreaterThan
    )
}

/// Logit of one action for a question, before nesting penalties.
fn cue_logit(lhs: NodeType, rhs: &str, tokens: &[String]) -> f32 {
    let is_choice = tokens.iter().any(|t| t == "or");
    let years     = has_any(tokens, &YEAR_CUES);
    let compares  = (is_choice && (has_any(tokens, &DATE_LESSER_CUES) || has_any(tokens, &DATE_GREATER_CUES)))
        || has_any(tokens, &NUMBER_LESSER_CUES)
        || has_any(tokens, &NUMBER_GREATER_CUES);

    if lhs == NodeType::Start {
        return match rhs.parse::<NodeType>() {
            Ok(NodeType::YearDifference) if years => CUE_BONUS + LEAF_BONUS,
            Ok(NodeType::PassageSpanAnswer) if compares => CUE_BONUS + LEAF_BONUS,
            Ok(NodeType::PassageSpanAnswer) => LEAF_BONUS,
            _ => 0.0,
        };
    }

    let Ok(function) = rhs.parse::<Function>() else {
        return 0.0;
    };
    let cued = match function {
        Function::FindPassageAttention   => return LEAF_BONUS,
        Function::CompareDateLesserThan  => is_choice && has_any(tokens, &DATE_LESSER_CUES),
        Function::CompareDateGreaterThan => is_choice && has_any(tokens, &DATE_GREATER_CUES),
        Function::CompareNumLesserThan   => has_any(tokens, &NUMBER_LESSER_CUES),
        Function::CompareNumGreaterThan  => has_any(tokens, &NUMBER_GREATER_CUES),
        Function::YearDifference         => years,
        Function::FindPassageSpanAnswer | Function::FindQuestionSpanAnswer => false,
    };
    if cued { CUE_BONUS } else { 0.0 }
}

pub struct LexicalCueTransition<B: Backend> {
    /// Per batch index, one logit per action id.
    logits:     Vec<Vec<f32>>,
    comparison: Vec<bool>,
    device:     B::Device,
}

impl<B: Backend> LexicalCueTransition<B> {
    /// `questions` are lowercased question tokens in batch order.
    pub fn new(table: &Arc<ProductionTable>, questions: &[Vec<String>], device: &B::Device) -> Self {
        let productions: Vec<_> = (0..table.len()).filter_map(|id| table.get(id)).collect();

        let logits = questions
            .iter()
            .map(|tokens| productions.iter().map(|p| cue_logit(p.lhs, &p.rhs, tokens)).collect())
            .collect();
        let comparison = productions
            .iter()
            .map(|p| p.rhs.parse::<Function>().map(is_comparison).unwrap_or(false))
            .collect();

        Self { logits, comparison, device: device.clone() }
    }
}

impl<B: Backend> TransitionFunction<B> for LexicalCueTransition<B> {
    type RnnState = ();

    fn score_actions(
        &self,
        state: &SearchState<B, ()>,
    ) -> Result<Vec<ScoredAction<B, ()>>, SearchError> {
        let valid = state.grammar_state.valid_actions();
        if valid.is_empty() {
            return Err(SearchError::NoValidActions { batch_index: state.batch_index });
        }

        let row = self.logits.get(state.batch_index);
        let nested = state
            .action_history
            .iter()
            .filter(|&&id| self.comparison.get(id).copied().unwrap_or(false))
            .count() as f32;

        let logits: Vec<f32> = valid
            .iter()
            .map(|&id| {
                let base = row.and_then(|r| r.get(id)).copied().unwrap_or(0.0);
                let is_cmp = self.comparison.get(id).copied().unwrap_or(false);
                if is_cmp { base - NESTING_PENALTY * nested } else { base }
            })
            .collect();

        let log_probs = util::log_softmax(util::vector::<B>(logits, &self.device));
        Ok(valid
            .iter()
            .enumerate()
            .map(|(i, &action_id)| ScoredAction {
                action_id,
                log_prob:  log_probs.clone().slice([i..i + 1]),
                rnn_state: (),
                side_args: SideArgs::default(),
            })
            .collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::language::grammar::DropGrammar;
    use crate::search::beam::{BeamSearch, BeamSearchConfig, SearchConstraint};
    use crate::search::grammar_state::GrammarStatelet;

    type B = NdArray;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn decode(question: &str) -> Vec<String> {
        let device  = Default::default();
        let grammar = DropGrammar::new();
        let table   = grammar.table();
        let scorer  = LexicalCueTransition::<B>::new(&table, &[tokens(question)], &device);
        let initial = vec![SearchState::initial(0, GrammarStatelet::new(table.clone()), (), &device)];
        let finished = BeamSearch::new(BeamSearchConfig::default())
            .search(initial, &scorer, &SearchConstraint::Unconstrained);
        let best = &finished[&0][0];
        best.action_history
            .iter()
            .map(|&id| table.get(id).map(|p| p.action()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_successors_form_a_distribution() {
        let device  = Default::default();
        let grammar = DropGrammar::new();
        let table   = grammar.table();
        let scorer  = LexicalCueTransition::<B>::new(&table, &[tokens("who won ?")], &device);
        let state   = SearchState::initial(0, GrammarStatelet::new(table.clone()), (), &device);
        let scored  = scorer.score_actions(&state).unwrap();
        let total: f32 = scored
            .into_iter()
            .map(|s| util::scalar_value(s.log_prob).exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_year_question_prefers_year_difference() {
        let actions = decode("how many years after the war was the treaty ?");
        assert_eq!(actions[0], "@start@ -> YearDifference");
        assert_eq!(actions[1], "YearDifference -> year_difference");
    }

    #[test]
    fn test_date_question_prefers_matching_comparison() {
        let actions = decode("which happened first , the war or the treaty ?");
        assert!(actions.contains(&"PassageAttention -> compare_date_lesser_than".to_string()));
        let actions = decode("which happened later , the war or the treaty ?");
        assert!(actions.contains(&"PassageAttention -> compare_date_greater_than".to_string()));
    }
}
