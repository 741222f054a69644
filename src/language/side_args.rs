// ============================================================
// Layer 3b — Side Arguments
// ============================================================
// Every action in a decoded program carries one SideArgs record.
// The record is a fixed set of optional slots, and each function
// reads exactly one of them:
//
//   find_PassageAttention
//   find_questionSpanAnswer       → question_attention
//   find_passageSpanAnswer        → passage_attention
//   compare_date_* / year_difference
//   compare_num_*                 → groundings
//
// Slots are filled either by the transition function while
// decoding or by the supervision router after decoding.

use burn::prelude::*;

use crate::language::types::Function;

/// A pair of distributions over passage dates or numbers, one per
/// event mentioned in the question.
#[derive(Debug, Clone)]
pub struct Grounding<B: Backend> {
    pub first:  Tensor<B, 1>,
    pub second: Tensor<B, 1>,
}

#[derive(Debug, Clone)]
pub struct SideArgs<B: Backend> {
    pub question_attention: Option<Tensor<B, 1>>,
    pub passage_attention:  Option<Tensor<B, 1>>,
    pub groundings:         Option<Grounding<B>>,
}

impl<B: Backend> Default for SideArgs<B> {
    fn default() -> Self {
        Self { question_attention: None, passage_attention: None, groundings: None }
    }
}

impl<B: Backend> SideArgs<B> {
    pub fn is_empty(&self) -> bool {
        self.question_attention.is_none()
            && self.passage_attention.is_none()
            && self.groundings.is_none()
    }
}

/// Which supervision a function can consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideSlot {
    QuestionAttention,
    PassageAttention,
    DateGroundings,
    NumberGroundings,
}

impl SideSlot {
    /// Every function reads exactly one slot.
    pub fn for_function(function: Function) -> Option<SideSlot> {
        match function {
            Function::FindPassageAttention
            | Function::FindQuestionSpanAnswer => Some(SideSlot::QuestionAttention),
            Function::FindPassageSpanAnswer => Some(SideSlot::PassageAttention),
            Function::CompareDateLesserThan
            | Function::CompareDateGreaterThan
            | Function::YearDifference => Some(SideSlot::DateGroundings),
            Function::CompareNumLesserThan
            | Function::CompareNumGreaterThan => Some(SideSlot::NumberGroundings),
        }
    }
}
