// ============================================================
// Layer 4 — Instance Sampler
// ============================================================
// Optionally shuffles instances and keeps the first `limit`.
//
// The shuffle uses a StdRng seeded from the caller's seed, so
// two runs with the same seed see the same instances in the
// same order. Without a seed the input order is kept.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub fn sample_instances<T>(mut items: Vec<T>, limit: Option<usize>, seed: Option<u64>) -> Vec<T> {
    let total = items.len();
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);
    }
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    tracing::debug!("Sampled {} of {} instances", items.len(), total);
    items
}
