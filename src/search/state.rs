// ============================================================
// Layer 3c — Search State
// ============================================================
// One candidate derivation for one batch element. States are
// values: expanding a state builds a successor and leaves the
// parent untouched.

use burn::prelude::*;

use crate::language::side_args::SideArgs;
use crate::ml::util;
use crate::search::error::SearchError;
use crate::search::grammar_state::GrammarStatelet;
use crate::search::transition::ScoredAction;

#[derive(Debug, Clone)]
pub struct SearchState<B: Backend, R: Clone> {
    pub batch_index:    usize,
    pub action_history: Vec<usize>,
    /// Cumulative log-probability, shape [1].
    pub score:          Tensor<B, 1>,
    /// Host copy of `score` used for ranking.
    pub score_value:    f32,
    pub rnn_state:      R,
    pub grammar_state:  GrammarStatelet,
    /// One entry per action in `action_history`.
    pub side_args:      Vec<SideArgs<B>>,
}

impl<B: Backend, R: Clone> SearchState<B, R> {
    pub fn initial(
        batch_index:   usize,
        grammar_state: GrammarStatelet,
        rnn_state:     R,
        device:        &B::Device,
    ) -> Self {
        Self {
            batch_index,
            action_history: Vec::new(),
            score: util::scalar(0.0, device),
            score_value: 0.0,
            rnn_state,
            grammar_state,
            side_args: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.grammar_state.is_complete()
    }

    pub fn successor(&self, scored: ScoredAction<B, R>) -> Result<Self, SearchError> {
        let grammar_state = self.grammar_state.take_action(scored.action_id)?;
        let score         = self.score.clone().add(scored.log_prob);
        let score_value   = util::scalar_value(score.clone().detach());

        let mut action_history = self.action_history.clone();
        action_history.push(scored.action_id);
        let mut side_args = self.side_args.clone();
        side_args.push(scored.side_args);

        Ok(Self {
            batch_index: self.batch_index,
            action_history,
            score,
            score_value,
            rnn_state: scored.rnn_state,
            grammar_state,
            side_args,
        })
    }
}
