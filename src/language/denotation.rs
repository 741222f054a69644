// ============================================================
// Layer 3b — Denotations
// ============================================================
// The typed result of executing a complete program. Each variant
// corresponds to one start type of the grammar; loss computation
// and answer rendering match on it exhaustively.

use burn::prelude::*;

use crate::language::types::NodeType;

/// Year gaps 0..=20 are representable; anything else is invalid.
pub const MAX_YEAR_DIFFERENCE: usize = 20;
pub const YEAR_DIFFERENCE_BUCKETS: usize = MAX_YEAR_DIFFERENCE + 2;
pub const INVALID_YEAR_BUCKET: usize = YEAR_DIFFERENCE_BUCKETS - 1;

#[derive(Debug, Clone)]
pub enum DenotationValue<B: Backend> {
    /// Logits over passage tokens, shape [passage_len] each.
    PassageSpanAnswer { start_logits: Tensor<B, 1>, end_logits: Tensor<B, 1> },
    /// Logits over question tokens, shape [question_len] each.
    QuestionSpanAnswer { start_logits: Tensor<B, 1>, end_logits: Tensor<B, 1> },
    /// Probabilities over YEAR_DIFFERENCE_BUCKETS.
    YearDifference { distribution: Tensor<B, 1> },
}

#[derive(Debug, Clone)]
pub struct Denotation<B: Backend> {
    pub value: DenotationValue<B>,
    /// Auxiliary loss accumulated during execution, shape [1].
    pub loss:  Tensor<B, 1>,
}

impl<B: Backend> Denotation<B> {
    pub fn answer_type(&self) -> NodeType {
        match &self.value {
            DenotationValue::PassageSpanAnswer { .. }  => NodeType::PassageSpanAnswer,
            DenotationValue::QuestionSpanAnswer { .. } => NodeType::QuestionSpanAnswer,
            DenotationValue::YearDifference { .. }     => NodeType::YearDifference,
        }
    }
}
