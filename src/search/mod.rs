// ============================================================
// Layer 3c — Decoding
// ============================================================
// Grammar-constrained beam search over programs.
//
//   grammar_state.rs — nonterminal stack, valid actions
//   state.rs         — one scored candidate derivation
//   transition.rs    — the scoring trait the search calls into
//   beam.rs          — the search controller and its constraints
//   error.rs         — SearchError

pub mod beam;
pub mod error;
pub mod grammar_state;
pub mod state;
pub mod transition;
