// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer takes preprocessed DROP instances from disk to
// ordered batches for the parser.
//
// The pipeline flows in this order:
//
//   instance JSON
//       │
//       ▼
//   JsonInstanceLoader → parses instances, rebuilds offsets,
//       │                recovers answer spans (spans.rs)
//       ▼
//   sample_instances   → optional seeded shuffle + limit
//       │
//       ▼
//   DropDataset        → implements Burn's Dataset trait
//       │
//       ▼
//   DropBatcher        → groups instances into DropBatch
//       │
//       ▼
//   DataLoader         → feeds batches to the parser
//
// AnswerNormalizer sits beside the pipeline: the metric sink
// uses it to compare answer strings.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads instance JSON files
pub mod loader;

/// Recovers gold passage spans from answer texts
pub mod spans;

/// Seeded shuffle and limit
pub mod sampler;

/// Implements Burn's Dataset trait for DROP instances
pub mod dataset;

/// Implements Burn's Batcher trait
pub mod batcher;

/// Canonical answer strings for EM/F1
pub mod normalizer;
