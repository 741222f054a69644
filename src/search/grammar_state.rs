// ============================================================
// Layer 3c — Grammar State
// ============================================================
// A partial derivation: the stack of nonterminals still to be
// expanded. The top of the stack decides which actions are valid.
//
//   [@start@]
//     └─ @start@ -> PassageSpanAnswer          → [PassageSpanAnswer]
//     └─ PassageSpanAnswer -> find_passage...  → [PassageAttention]
//     └─ PassageAttention -> find_Passage...   → []   (complete)
//
// Transitions return a new statelet and never touch the old one,
// so beam candidates can share a parent freely.

use std::sync::Arc;

use crate::language::grammar::ProductionTable;
use crate::language::types::NodeType;
use crate::search::error::SearchError;

#[derive(Debug, Clone)]
pub struct GrammarStatelet {
    table: Arc<ProductionTable>,
    /// Pending nonterminals; the last element is expanded next.
    stack: Vec<NodeType>,
}

impl GrammarStatelet {
    pub fn new(table: Arc<ProductionTable>) -> Self {
        Self { table, stack: vec![NodeType::Start] }
    }

    pub fn table(&self) -> &Arc<ProductionTable> {
        &self.table
    }

    pub fn stack(&self) -> &[NodeType] {
        &self.stack
    }

    /// Action ids that may be taken next; empty once complete.
    pub fn valid_actions(&self) -> &[usize] {
        match self.stack.last() {
            Some(&top) => self.table.actions_for(top),
            None => &[],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn take_action(&self, action_id: usize) -> Result<Self, SearchError> {
        if !self.valid_actions().contains(&action_id) {
            let expected = self
                .stack
                .last()
                .map_or_else(|| "nothing (derivation complete)".to_string(), |t| t.to_string());
            return Err(SearchError::InvalidAction {
                action_id,
                reason: format!("expected an expansion of {expected}"),
            });
        }
        let production = self.table.get(action_id).ok_or_else(|| SearchError::InvalidAction {
            action_id,
            reason: "no such production".to_string(),
        })?;

        let mut stack = self.stack.clone();
        stack.pop();
        // leftmost child ends up on top
        stack.extend(production.children.iter().rev().copied());

        Ok(Self { table: Arc::clone(&self.table), stack })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::grammar::DropGrammar;

    fn id(grammar: &DropGrammar, action: &str) -> usize {
        grammar.table().id_of(action).unwrap()
    }

    #[test]
    fn test_initial_state_offers_start_actions() {
        let grammar = DropGrammar::new();
        let state   = GrammarStatelet::new(grammar.table());
        assert_eq!(state.valid_actions().len(), NodeType::START_TYPES.len());
        assert!(!state.is_complete());
    }

    #[test]
    fn test_take_action_is_pure() {
        let grammar = DropGrammar::new();
        let state   = GrammarStatelet::new(grammar.table());
        let next    = state.take_action(id(&grammar, "@start@ -> YearDifference")).unwrap();
        assert_eq!(state.stack(), &[NodeType::Start]);
        assert_eq!(next.stack(), &[NodeType::YearDifference]);
    }

    #[test]
    fn test_full_derivation_completes() {
        let grammar = DropGrammar::new();
        let actions = grammar
            .logical_form_to_action_sequence("(year_difference find_PassageAttention find_PassageAttention)")
            .unwrap();
        let mut state = GrammarStatelet::new(grammar.table());
        for action in &actions {
            assert!(!state.is_complete());
            state = state.take_action(id(&grammar, action)).unwrap();
        }
        assert!(state.is_complete());
        assert!(state.valid_actions().is_empty());
    }

    #[test]
    fn test_invalid_action_is_rejected() {
        let grammar = DropGrammar::new();
        let state   = GrammarStatelet::new(grammar.table());
        let wrong   = id(&grammar, "PassageAttention -> find_PassageAttention");
        assert!(matches!(
            state.take_action(wrong),
            Err(SearchError::InvalidAction { .. })
        ));
    }
}
