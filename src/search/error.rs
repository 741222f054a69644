//! Error types for decoding.

use thiserror::Error;

/// Errors scoped to a single search state. The controller logs
/// them and drops the state; the rest of the batch carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The action is not valid from the current grammar state.
    #[error("Invalid action {action_id}: {reason}")]
    InvalidAction { action_id: usize, reason: String },

    /// An incomplete state with nothing left to expand.
    #[error("No valid actions for batch element {batch_index}")]
    NoValidActions { batch_index: usize },
}
