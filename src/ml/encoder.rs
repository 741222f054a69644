// ============================================================
// Layer 5 — Hashing Encoder
// ============================================================
// Turns an instance into the tensors the executor consumes.
//
// Each token is embedded by a random vector drawn from a StdRng
// seeded with (encoder seed XOR hash of the lowercased token), so
// equal tokens always share an embedding and two runs with the
// same seed produce identical contexts. There are no trained
// weights: similarity between question and passage comes from
// lexical overlap alone.

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::instance::DropInstance;
use crate::language::executor::DropContext;
use crate::ml::util;

/// FNV-1a, stable across platforms and releases.
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dim:  usize,
    seed: u64,
}

impl HashingEncoder {
    pub fn new(dim: usize, seed: u64) -> Self {
        Self { dim: dim.max(1), seed }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn token_vector(&self, token: &str) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ fnv1a(&token.to_lowercase()));
        (0..self.dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }

    /// [len, dim] encoding plus mask. An empty sequence becomes one
    /// masked zero row so downstream shapes are never empty.
    fn encode_tokens<B: Backend>(&self, tokens: &[String], device: &B::Device) -> (Tensor<B, 2>, Vec<bool>) {
        if tokens.is_empty() {
            return (util::matrix(vec![0.0; self.dim], 1, self.dim, device), vec![false]);
        }
        let values: Vec<f32> = tokens.iter().flat_map(|t| self.token_vector(t)).collect();
        (util::matrix(values, tokens.len(), self.dim, device), vec![true; tokens.len()])
    }

    pub fn encode<B: Backend>(&self, instance: &DropInstance, device: &B::Device) -> DropContext<B> {
        let (question_encoding, question_mask) = self.encode_tokens(&instance.question_tokens, device);
        let (passage_encoding, passage_mask)   = self.encode_tokens(&instance.passage_tokens, device);

        DropContext {
            question_encoding,
            passage_encoding,
            question_mask,
            passage_mask,
            passage_dates:           instance.passage_date_values.clone(),
            passage_token_to_date:   instance.passage_token_to_date.clone(),
            passage_numbers:         instance.passage_number_values.clone(),
            passage_token_to_number: instance.passage_token_to_number.clone(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_token_vectors_are_deterministic_and_case_blind() {
        let encoder = HashingEncoder::new(8, 7);
        assert_eq!(encoder.token_vector("Treaty"), encoder.token_vector("treaty"));
        assert_ne!(encoder.token_vector("treaty"), encoder.token_vector("war"));
        assert_ne!(
            encoder.token_vector("treaty"),
            HashingEncoder::new(8, 8).token_vector("treaty")
        );
    }

    #[test]
    fn test_empty_sequence_encodes_to_masked_row() {
        let device  = Default::default();
        let encoder = HashingEncoder::new(4, 0);
        let (encoding, mask) = encoder.encode_tokens::<B>(&[], &device);
        assert_eq!(encoding.dims(), [1, 4]);
        assert_eq!(mask, vec![false]);
    }
}
