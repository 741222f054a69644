// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing a DROP instance and the
// collaborator traits around it.
//
// Rules for this layer:
//   - NO Burn tensor types
//   - NO file I/O
//   - Only structs, enums and traits
//
// The program language, search and losses (which do need
// tensors) live in their own layers and build on these types.

// Passage dates with unknown-component sentinels
pub mod date;

// A reading-comprehension instance plus its gold annotations
pub mod instance;

// Collaborator abstractions (instance sources, metric sinks)
pub mod traits;
