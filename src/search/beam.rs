// ============================================================
// Layer 3c — Beam Search
// ============================================================
// Step-synchronous beam search over grammar states.
//
// Each step:
//   1. every active state is scored by the transition function
//   2. successors are filtered by the constraint of this run
//        None       → no filter
//        FirstStep  → step 0 only: the instance's allowed start ids
//        Sequences  → the next id of any gold sequence whose prefix
//                     matches the state's history
//   3. candidates are grouped by batch index, stably sorted by
//      descending score and cut to beam_size
//   4. complete derivations move to the finished set; the rest
//      stay active
//
// Stable sorting keeps ties in discovery order, so runs are
// reproducible and finished order equals probability order.

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::search::error::SearchError;
use crate::search::state::SearchState;
use crate::search::transition::TransitionFunction;

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamSearchConfig {
    pub beam_size:                    usize,
    /// Successors kept per parent state per step.
    pub per_node_beam_size:           Option<usize>,
    pub max_decoding_steps:           usize,
    pub keep_final_unfinished_states: bool,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            beam_size:                    10,
            per_node_beam_size:           None,
            max_decoding_steps:           12,
            keep_final_unfinished_states: false,
        }
    }
}

// ─── Constraints ──────────────────────────────────────────────────────────────
/// Gold action-id sequences for one instance, padded to a common
/// length with a parallel validity mask.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowedSequences {
    pub sequences: Vec<Vec<usize>>,
    pub mask:      Vec<Vec<bool>>,
}

impl AllowedSequences {
    /// Pad ragged sequences with id 0 and build the mask.
    pub fn new(sequences: Vec<Vec<usize>>) -> Self {
        let width = sequences.iter().map(Vec::len).max().unwrap_or(0);
        let mut padded = Vec::with_capacity(sequences.len());
        let mut mask   = Vec::with_capacity(sequences.len());
        for mut sequence in sequences {
            let len = sequence.len();
            sequence.resize(width, 0);
            padded.push(sequence);
            mask.push((0..width).map(|i| i < len).collect());
        }
        Self { sequences: padded, mask }
    }

    fn length(&self, index: usize) -> usize {
        self.mask
            .get(index)
            .map_or(0, |m| m.iter().take_while(|valid| **valid).count())
    }

    /// Longest unpadded sequence.
    pub fn max_len(&self) -> usize {
        (0..self.sequences.len()).map(|i| self.length(i)).max().unwrap_or(0)
    }

    /// Sequence indices whose valid prefix equals `history`.
    fn compatible<'a>(&'a self, history: &'a [usize]) -> impl Iterator<Item = usize> + 'a {
        (0..self.sequences.len()).filter(move |&i| {
            self.length(i) >= history.len() && self.sequences[i][..history.len()] == *history
        })
    }

    /// Next ids allowed after `history`.
    pub fn next_actions(&self, history: &[usize]) -> BTreeSet<usize> {
        self.compatible(history)
            .filter(|&i| self.length(i) > history.len())
            .map(|i| self.sequences[i][history.len()])
            .collect()
    }

    /// True if `history` is exactly one full sequence.
    pub fn is_consumed_by(&self, history: &[usize]) -> bool {
        self.compatible(history).any(|i| self.length(i) == history.len())
    }
}

/// Which successors a search run may keep; indexed by batch index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchConstraint {
    #[default]
    Unconstrained,
    /// Allowed first actions per instance. Instances without an
    /// entry are unconstrained.
    FirstStep(Vec<BTreeSet<usize>>),
    /// Gold sequences per instance. Instances without an entry
    /// produce nothing.
    Sequences(Vec<AllowedSequences>),
}

impl SearchConstraint {
    fn allowed_actions(&self, batch_index: usize, history: &[usize]) -> Option<BTreeSet<usize>> {
        match self {
            SearchConstraint::Unconstrained => None,
            SearchConstraint::FirstStep(allowed) if history.is_empty() => {
                allowed.get(batch_index).cloned()
            }
            SearchConstraint::FirstStep(_) => None,
            SearchConstraint::Sequences(sequences) => Some(
                sequences
                    .get(batch_index)
                    .map(|s| s.next_actions(history))
                    .unwrap_or_default(),
            ),
        }
    }

    /// Whether a grammatically complete history is an acceptable result.
    fn accepts(&self, batch_index: usize, history: &[usize]) -> bool {
        match self {
            SearchConstraint::Sequences(sequences) => sequences
                .get(batch_index)
                .is_some_and(|s| s.is_consumed_by(history)),
            _ => true,
        }
    }
}

// ─── BeamSearch ───────────────────────────────────────────────────────────────
pub type FinishedStates<B, R> = BTreeMap<usize, Vec<SearchState<B, R>>>;

#[derive(Debug, Clone)]
pub struct BeamSearch {
    config: BeamSearchConfig,
}

impl BeamSearch {
    pub fn new(config: BeamSearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BeamSearchConfig {
        &self.config
    }

    /// Run the search. Returns, per batch index, finished states in
    /// descending score order, at most `beam_size` of them.
    pub fn search<B, T>(
        &self,
        initial_states: Vec<SearchState<B, T::RnnState>>,
        transition:     &T,
        constraint:     &SearchConstraint,
    ) -> FinishedStates<B, T::RnnState>
    where
        B: Backend,
        T: TransitionFunction<B>,
    {
        let steps = match constraint {
            SearchConstraint::Sequences(sequences) => {
                sequences.iter().map(AllowedSequences::max_len).max().unwrap_or(0)
            }
            _ => self.config.max_decoding_steps,
        };

        let mut active = initial_states;
        let mut finished: FinishedStates<B, T::RnnState> = BTreeMap::new();

        for step in 0..steps {
            if active.is_empty() {
                break;
            }

            // ── Step 1+2: expand and filter ─────────────────────────────────
            let mut candidates: BTreeMap<usize, Vec<SearchState<B, T::RnnState>>> = BTreeMap::new();
            for state in &active {
                match self.expand(state, transition, constraint) {
                    Ok(successors) => candidates.entry(state.batch_index).or_default().extend(successors),
                    Err(e) => warn!(step, "Dropping search state: {e}"),
                }
            }

            // ── Step 3+4: prune per instance, split finished/active ────────
            let mut next_active = Vec::new();
            for (batch_index, mut group) in candidates {
                sort_by_score(&mut group);
                group.truncate(self.config.beam_size);
                for state in group {
                    if !state.is_complete() {
                        next_active.push(state);
                    } else if constraint.accepts(batch_index, &state.action_history) {
                        finished.entry(batch_index).or_default().push(state);
                    } else {
                        debug!(batch_index, "Complete program matches no allowed sequence");
                    }
                }
            }

            debug!(step, active = next_active.len(), "Beam search step");
            active = next_active;
        }

        if self.config.keep_final_unfinished_states {
            for state in active {
                finished.entry(state.batch_index).or_default().push(state);
            }
        }

        for states in finished.values_mut() {
            sort_by_score(states);
            states.truncate(self.config.beam_size);
        }

        finished
    }

    fn expand<B, T>(
        &self,
        state:      &SearchState<B, T::RnnState>,
        transition: &T,
        constraint: &SearchConstraint,
    ) -> Result<Vec<SearchState<B, T::RnnState>>, SearchError>
    where
        B: Backend,
        T: TransitionFunction<B>,
    {
        if state.grammar_state.valid_actions().is_empty() {
            return Err(SearchError::NoValidActions { batch_index: state.batch_index });
        }

        let allowed = constraint.allowed_actions(state.batch_index, &state.action_history);
        if allowed.as_ref().is_some_and(BTreeSet::is_empty) {
            return Ok(Vec::new());
        }

        let mut successors = Vec::new();
        for scored in transition.score_actions(state)? {
            if allowed.as_ref().is_some_and(|a| !a.contains(&scored.action_id)) {
                continue;
            }
            match state.successor(scored) {
                Ok(next) => successors.push(next),
                Err(e) => warn!(batch_index = state.batch_index, "Skipping successor: {e}"),
            }
        }

        if let Some(k) = self.config.per_node_beam_size {
            sort_by_score(&mut successors);
            successors.truncate(k);
        }

        Ok(successors)
    }
}

/// Stable sort by descending score.
fn sort_by_score<B: Backend, R: Clone>(states: &mut [SearchState<B, R>]) {
    states.sort_by(|a, b| b.score_value.partial_cmp(&a.score_value).unwrap_or(Ordering::Equal));
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::language::grammar::{DropGrammar, Production, ProductionTable};
    use crate::language::side_args::SideArgs;
    use crate::language::types::NodeType;
    use crate::ml::util;
    use crate::search::grammar_state::GrammarStatelet;
    use crate::search::transition::ScoredAction;

    type B = NdArray;

    /// Fixed log-probability per action id; unlisted actions split
    /// the uniform share of the valid set.
    struct ScriptedTransition {
        log_probs: HashMap<usize, f32>,
    }

    impl ScriptedTransition {
        fn uniform() -> Self {
            Self { log_probs: HashMap::new() }
        }
    }

    impl TransitionFunction<B> for ScriptedTransition {
        type RnnState = ();

        fn score_actions(
            &self,
            state: &SearchState<B, ()>,
        ) -> Result<Vec<ScoredAction<B, ()>>, SearchError> {
            let device = Default::default();
            let valid  = state.grammar_state.valid_actions();
            let share  = -(valid.len() as f32).ln();
            Ok(valid
                .iter()
                .map(|&action_id| ScoredAction {
                    action_id,
                    log_prob:  util::scalar::<B>(*self.log_probs.get(&action_id).unwrap_or(&share), &device),
                    rnn_state: (),
                    side_args: SideArgs::default(),
                })
                .collect())
        }
    }

    fn initial(table: Arc<ProductionTable>, batch: usize) -> Vec<SearchState<B, ()>> {
        let device = Default::default();
        (0..batch)
            .map(|i| SearchState::initial(i, GrammarStatelet::new(Arc::clone(&table)), (), &device))
            .collect()
    }

    fn search(config: BeamSearchConfig) -> BeamSearch {
        BeamSearch::new(config)
    }

    fn ids(grammar: &DropGrammar, lf: &str) -> Vec<usize> {
        let table = grammar.table();
        grammar
            .logical_form_to_action_sequence(lf)
            .unwrap()
            .iter()
            .map(|a| table.id_of(a).unwrap())
            .collect()
    }

    #[test]
    fn test_two_one_step_programs_are_ordered_by_score() {
        let table = Arc::new(ProductionTable::new(vec![
            Production::new(NodeType::Start, "x", vec![]),
            Production::new(NodeType::Start, "y", vec![]),
        ]));
        let transition = ScriptedTransition { log_probs: HashMap::from([(0, -2.0), (1, -0.1)]) };
        let config = BeamSearchConfig { beam_size: 3, ..BeamSearchConfig::default() };

        let finished = search(config).search(initial(table, 1), &transition, &SearchConstraint::Unconstrained);
        let states = &finished[&0];
        let scores: Vec<f32> = states.iter().map(|s| s.score_value).collect();
        assert_eq!(scores, vec![-0.1, -2.0]);
        assert_eq!(states[0].action_history, vec![1]);
        assert_eq!(states[1].action_history, vec![0]);
    }

    #[test]
    fn test_finished_states_never_exceed_beam_size() {
        let grammar = DropGrammar::new();
        for beam_size in [2, 3, 5] {
            let config   = BeamSearchConfig { beam_size, ..BeamSearchConfig::default() };
            let finished = search(config).search(
                initial(grammar.table(), 3),
                &ScriptedTransition::uniform(),
                &SearchConstraint::Unconstrained,
            );
            assert_eq!(finished.len(), 3);
            assert!(finished.values().all(|states| states.len() <= beam_size));
        }
    }

    #[test]
    fn test_finished_states_are_in_descending_score_order() {
        let grammar  = DropGrammar::new();
        let config   = BeamSearchConfig { beam_size: 8, ..BeamSearchConfig::default() };
        let finished = search(config).search(
            initial(grammar.table(), 2),
            &ScriptedTransition::uniform(),
            &SearchConstraint::Unconstrained,
        );
        for states in finished.values() {
            assert!(states.windows(2).all(|w| w[0].score_value >= w[1].score_value));
            for state in states {
                assert!(state.is_complete());
                assert_eq!(state.action_history.len(), state.side_args.len());
            }
        }
    }

    #[test]
    fn test_scores_never_increase_along_a_derivation() {
        let grammar  = DropGrammar::new();
        let finished = search(BeamSearchConfig::default()).search(
            initial(grammar.table(), 1),
            &ScriptedTransition::uniform(),
            &SearchConstraint::Unconstrained,
        );
        assert!(finished[&0].iter().all(|s| s.score_value <= 0.0));
    }

    #[test]
    fn test_gold_sequence_of_two_actions() {
        let table = Arc::new(ProductionTable::new(vec![
            Production::new(NodeType::Start, "PassageSpanAnswer", vec![NodeType::PassageSpanAnswer]),
            Production::new(NodeType::PassageSpanAnswer, "find_passageSpanAnswer", vec![]),
            Production::new(NodeType::PassageSpanAnswer, "other", vec![]),
        ]));
        let gold: Vec<usize> = ["@start@ -> PassageSpanAnswer", "PassageSpanAnswer -> find_passageSpanAnswer"]
            .iter()
            .map(|a| table.id_of(a).unwrap())
            .collect();
        let constraint = SearchConstraint::Sequences(vec![AllowedSequences::new(vec![gold.clone()])]);

        let finished = search(BeamSearchConfig::default()).search(
            initial(table, 1),
            &ScriptedTransition::uniform(),
            &constraint,
        );
        assert_eq!(finished[&0].len(), 1);
        assert_eq!(finished[&0][0].action_history, gold);
    }

    #[test]
    fn test_constrained_search_recovers_every_gold_sequence() {
        let grammar = DropGrammar::new();
        let lesser  = ids(&grammar, "(find_passageSpanAnswer (compare_date_lesser_than find_PassageAttention find_PassageAttention))");
        let greater = ids(&grammar, "(find_passageSpanAnswer (compare_date_greater_than find_PassageAttention find_PassageAttention))");
        let short   = ids(&grammar, "(find_passageSpanAnswer find_PassageAttention)");
        let constraint = SearchConstraint::Sequences(vec![
            AllowedSequences::new(vec![lesser.clone(), greater.clone()]),
            AllowedSequences::new(vec![short.clone()]),
        ]);

        // a tiny step budget must not matter in constrained mode
        let config   = BeamSearchConfig { max_decoding_steps: 1, ..BeamSearchConfig::default() };
        let finished = search(config).search(initial(grammar.table(), 2), &ScriptedTransition::uniform(), &constraint);

        let histories: Vec<&Vec<usize>> = finished[&0].iter().map(|s| &s.action_history).collect();
        assert_eq!(histories.len(), 2);
        assert!(histories.contains(&&lesser));
        assert!(histories.contains(&&greater));
        assert_eq!(finished[&1][0].action_history, short);
    }

    #[test]
    fn test_first_step_filter() {
        let grammar = DropGrammar::new();
        let table   = grammar.table();
        let allowed = table.id_of("@start@ -> QuestionSpanAnswer").unwrap();
        let constraint = SearchConstraint::FirstStep(vec![BTreeSet::from([allowed])]);

        let finished = search(BeamSearchConfig::default()).search(
            initial(table, 1),
            &ScriptedTransition::uniform(),
            &constraint,
        );
        assert!(!finished[&0].is_empty());
        assert!(finished[&0].iter().all(|s| s.action_history[0] == allowed));
    }

    #[test]
    fn test_state_without_valid_actions_is_dropped() {
        // PassageAttention has no productions in this table
        let table = Arc::new(ProductionTable::new(vec![
            Production::new(NodeType::Start, "stuck", vec![NodeType::PassageAttention]),
            Production::new(NodeType::Start, "done", vec![]),
        ]));
        let finished = search(BeamSearchConfig::default()).search(
            initial(table.clone(), 1),
            &ScriptedTransition::uniform(),
            &SearchConstraint::Unconstrained,
        );
        let done = table.id_of("@start@ -> done").unwrap();
        assert_eq!(finished[&0].len(), 1);
        assert_eq!(finished[&0][0].action_history, vec![done]);
    }

    #[test]
    fn test_unfinished_states_are_kept_only_on_request() {
        let grammar = DropGrammar::new();
        let config  = BeamSearchConfig { max_decoding_steps: 1, ..BeamSearchConfig::default() };

        let dropped = search(config.clone()).search(
            initial(grammar.table(), 1),
            &ScriptedTransition::uniform(),
            &SearchConstraint::Unconstrained,
        );
        assert!(dropped.is_empty());

        let kept = search(BeamSearchConfig { keep_final_unfinished_states: true, ..config }).search(
            initial(grammar.table(), 1),
            &ScriptedTransition::uniform(),
            &SearchConstraint::Unconstrained,
        );
        assert_eq!(kept[&0].len(), NodeType::START_TYPES.len());
        assert!(kept[&0].iter().all(|s| !s.is_complete()));
    }

    #[test]
    fn test_per_node_beam_size_limits_fan_out() {
        let grammar = DropGrammar::new();
        let config  = BeamSearchConfig {
            per_node_beam_size: Some(1),
            keep_final_unfinished_states: true,
            max_decoding_steps: 1,
            ..BeamSearchConfig::default()
        };
        let finished = search(config).search(
            initial(grammar.table(), 1),
            &ScriptedTransition::uniform(),
            &SearchConstraint::Unconstrained,
        );
        assert_eq!(finished[&0].len(), 1);
    }
}
