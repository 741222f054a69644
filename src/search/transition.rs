// ============================================================
// Layer 3c — Transition Function
// ============================================================
// The scoring seam of the decoder. Given a state, a transition
// function returns one ScoredAction per valid next action, with
// log-probabilities normalised over those valid actions. The
// beam search applies constraints and pruning afterwards.

use burn::prelude::*;

use crate::language::side_args::SideArgs;
use crate::search::error::SearchError;
use crate::search::state::SearchState;

#[derive(Debug, Clone)]
pub struct ScoredAction<B: Backend, R> {
    pub action_id: usize,
    /// Incremental log-probability, shape [1].
    pub log_prob:  Tensor<B, 1>,
    pub rnn_state: R,
    /// Supervision to attach to this action occurrence.
    pub side_args: SideArgs<B>,
}

pub trait TransitionFunction<B: Backend> {
    /// Decoder state threaded from step to step.
    type RnnState: Clone;

    fn score_actions(
        &self,
        state: &SearchState<B, Self::RnnState>,
    ) -> Result<Vec<ScoredAction<B, Self::RnnState>>, SearchError>;
}
