// ============================================================
// Layer 5 — ML / Tensor Layer (Burn)
// ============================================================
// Everything that turns programs into numbers lives here: the
// tensor helpers, the stand-in encoder and transition function,
// the marginal-likelihood losses and answer rendering. The
// executor in `language` consumes tensors from this layer but
// never computes a loss.
//
// What's in this layer:
//
//   util.rs           — masking, log-space reductions, host copies
//
//   encoder.rs        — seeded hashing encoder producing the
//                       per-instance question/passage encodings
//
//   cue_transition.rs — lexical cue scorer implementing the search
//                       TransitionFunction
//
//   mml.rs            — denotation likelihoods, marginal and
//                       supervised MML, batch loss aggregation
//
//   answer.rs         — denotation → answer string
//
//   parser.rs         — the batch forward pass tying search,
//                       execution and losses together
//
// Reference: Burn Book §3 (Building Blocks)
//            Dasigi et al. (2019) Iterative Search for Weakly
//            Supervised Semantic Parsing

pub mod util;

/// Loss-side error taxonomy
pub mod error;

pub mod encoder;

pub mod cue_transition;

/// Marginal-likelihood losses
pub mod mml;

pub mod answer;

/// Batch forward pass: search, execute, score, predict
pub mod parser;
