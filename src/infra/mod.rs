// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong to any business
// layer:
//
//   config_store.rs — Run persistence
//                     Saves/loads ParserConfig and the ordered
//                     action vocabulary as JSON so a run can be
//                     reproduced with identical action ids.
//
//   metrics.rs      — Answer metrics and logging
//                     EM/F1 metric sink plus a CSV logger with
//                     one row per evaluated batch.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Parser config and action vocabulary persistence
pub mod config_store;

/// EM/F1 metric sink and CSV logger
pub mod metrics;
