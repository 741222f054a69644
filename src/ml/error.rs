//! Error types for loss computation.

use thiserror::Error;

use crate::language::types::NodeType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LossError {
    /// The program's answer type has no gold representation for
    /// this instance, so its likelihood cannot be measured.
    #[error("No gold answer of type {answer_type} for this instance")]
    AmbiguousAnswerType { answer_type: NodeType },

    /// Gold answers of the right type exist, but none fits the
    /// denotation (every span out of range, every gap past the
    /// last bucket).
    #[error("No usable gold answer of type {answer_type} for this instance")]
    NoUsableGold { answer_type: NodeType },
}
