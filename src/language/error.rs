//! Error types for the program language.

use thiserror::Error;

/// Errors raised while parsing, converting or executing programs.
///
/// All of these are scoped to a single program: callers drop the
/// offending candidate and carry on with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LanguageError {
    /// The action sequence does not reduce to one complete,
    /// well-typed derivation of a start type.
    #[error("Malformed program: {reason}")]
    MalformedProgram { reason: String },

    /// The logical form string could not be parsed or type-checked.
    #[error("Invalid logical form '{logical_form}': {reason}")]
    InvalidLogicalForm { logical_form: String, reason: String },

    /// An action string that is not in the grammar.
    #[error("Unknown action: '{action}'")]
    UnknownAction { action: String },

    /// A function name that is not in the grammar.
    #[error("Unknown function: '{name}'")]
    UnknownFunction { name: String },
}

impl LanguageError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedProgram { reason: reason.into() }
    }

    pub fn invalid_lf(logical_form: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLogicalForm {
            logical_form: logical_form.to_string(),
            reason:       reason.into(),
        }
    }
}
