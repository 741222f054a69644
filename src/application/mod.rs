// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (evaluating a data file or inspecting the
// grammar).
//
// Rules for this layer:
//   - No tensor math or search code here
//   - No printing here (that's Layer 1)
//   - No direct file parsing (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The batch evaluation workflow and its configuration
pub mod evaluate_use_case;

// Grammar listing and logical-form parsing
pub mod program_use_case;
