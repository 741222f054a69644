// ============================================================
// Layer 2 — ProgramUseCase
// ============================================================
// Grammar inspection without any data:
//
//   productions()    → the ordered action vocabulary with ids
//   parse(lf)        → action sequence of a logical form, plus
//                      its canonical rendering
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{Context, Result};

use crate::language::grammar::DropGrammar;
use crate::language::types::NodeType;
use crate::language::vocab::ActionVocab;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedProgram {
    pub start_type:   NodeType,
    pub actions:      Vec<String>,
    pub action_ids:   Vec<usize>,
    /// Canonical form, rebuilt from `actions`
    pub logical_form: String,
}

pub struct ProgramUseCase {
    grammar: DropGrammar,
    vocab:   ActionVocab,
}

impl ProgramUseCase {
    pub fn new() -> Self {
        let grammar = DropGrammar::new();
        let vocab   = ActionVocab::from(grammar.all_possible_productions());
        Self { grammar, vocab }
    }

    pub fn productions(&self) -> Vec<(usize, String)> {
        self.vocab.actions().iter().cloned().enumerate().collect()
    }

    pub fn parse(&self, logical_form: &str) -> Result<ParsedProgram> {
        let program = self
            .grammar
            .parse_logical_form(logical_form)
            .with_context(|| format!("Cannot parse '{logical_form}'"))?;
        let actions      = program.to_action_sequence();
        let action_ids   = self.vocab.ids(&actions)?;
        let logical_form = self.grammar.action_sequence_to_logical_form(&actions)?;

        tracing::debug!("Parsed {} actions, start type {}", actions.len(), program.start_type);
        Ok(ParsedProgram { start_type: program.start_type, actions, action_ids, logical_form })
    }
}

impl Default for ProgramUseCase {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_productions_are_numbered_in_order() {
        let use_case    = ProgramUseCase::new();
        let productions = use_case.productions();
        assert_eq!(productions.len(), 11);
        assert!(productions.iter().enumerate().all(|(i, (id, _))| i == *id));
        assert!(productions.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn test_parse_normalises_whitespace() {
        let parsed = ProgramUseCase::new()
            .parse("( find_passageSpanAnswer   find_PassageAttention )")
            .unwrap();
        assert_eq!(parsed.logical_form, "(find_passageSpanAnswer find_PassageAttention)");
        assert_eq!(parsed.start_type, NodeType::PassageSpanAnswer);
        assert_eq!(parsed.actions[0], "@start@ -> PassageSpanAnswer");
        assert_eq!(parsed.action_ids.len(), 3);
    }

    #[test]
    fn test_ill_typed_form_is_an_error() {
        assert!(ProgramUseCase::new().parse("(year_difference find_PassageAttention)").is_err());
    }
}
