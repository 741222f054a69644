// ============================================================
// Layer 3b — Program Language
// ============================================================
// The small typed language the parser searches over:
//
//   types.rs      — nonterminal types and the eight functions
//   grammar.rs    — productions, action ids, logical form ⇄ actions
//   vocab.rs      — action string ⇄ id bijection
//   side_args.rs  — per-action supervision slots
//   denotation.rs — typed execution results
//   executor.rs   — runs a program against an encoded instance
//   error.rs      — LanguageError

pub mod denotation;
pub mod error;
pub mod executor;
pub mod grammar;
pub mod side_args;
pub mod types;
pub mod vocab;
