// ============================================================
// Layer 3d — Supervision
// ============================================================
// Gold signals for training:
//
//   router.rs — injects gold values into decoded programs'
//               side-args by slot and occurrence order
//   gold.rs   — gold programs per question type and gold
//               attentions derived from question and answer

pub mod gold;
pub mod router;
