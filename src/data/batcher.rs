// ============================================================
// Layer 4 — DROP Batcher
// ============================================================
// Implements Burn's Batcher trait to group instances for one
// forward pass.
//
// Unlike a token-id batcher there is nothing to stack here:
// questions and passages have different lengths, and the
// parser encodes each instance into its own language. The
// batcher keeps the instances in order, records the longest
// question and passage, and pads every gold list to the batch
// maximum:
//
//   passage_spans, question_spans → PADDED_SPAN rows
//   year_differences              → -1
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::instance::{DropInstance, PADDED_SPAN};

// ─── DropBatch ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct DropBatch {
    /// Instances in dataset order; batch index = position
    pub instances: Vec<DropInstance>,

    pub max_question_len: usize,
    pub max_passage_len:  usize,
}

// ─── DropBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug, Default)]
pub struct DropBatcher;

impl DropBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, DropInstance, DropBatch> for DropBatcher {
    fn batch(&self, mut items: Vec<DropInstance>, _device: &B::Device) -> DropBatch {
        let max_question_len = items.iter().map(|i| i.question_tokens.len()).max().unwrap_or(0);
        let max_passage_len  = items.iter().map(|i| i.passage_tokens.len()).max().unwrap_or(0);

        let passage_rows  = items.iter().map(|i| i.answer.passage_spans.len()).max().unwrap_or(0);
        let question_rows = items.iter().map(|i| i.answer.question_spans.len()).max().unwrap_or(0);
        let year_rows     = items.iter().map(|i| i.answer.year_differences.len()).max().unwrap_or(0);
        for item in &mut items {
            item.answer.passage_spans.resize(passage_rows, PADDED_SPAN);
            item.answer.question_spans.resize(question_rows, PADDED_SPAN);
            item.answer.year_differences.resize(year_rows, -1);
        }

        DropBatch { instances: items, max_question_len, max_passage_len }
    }
}
