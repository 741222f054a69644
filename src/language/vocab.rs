//! Bijection between action strings and action ids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::language::error::LanguageError;

/// Built once per batch from the first instance's productions and
/// read-only afterwards. Serialises as the ordered action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ActionVocab {
    actions: Vec<String>,
    index:   HashMap<String, usize>,
}

impl From<Vec<String>> for ActionVocab {
    fn from(actions: Vec<String>) -> Self {
        let index = actions
            .iter()
            .enumerate()
            .map(|(id, action)| (action.clone(), id))
            .collect();
        Self { actions, index }
    }
}

impl From<ActionVocab> for Vec<String> {
    fn from(vocab: ActionVocab) -> Self {
        vocab.actions
    }
}

impl ActionVocab {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn id(&self, action: &str) -> Result<usize, LanguageError> {
        self.index
            .get(action)
            .copied()
            .ok_or_else(|| LanguageError::UnknownAction { action: action.to_string() })
    }

    pub fn action(&self, id: usize) -> Option<&str> {
        self.actions.get(id).map(String::as_str)
    }

    pub fn ids<S: AsRef<str>>(&self, actions: &[S]) -> Result<Vec<usize>, LanguageError> {
        actions.iter().map(|a| self.id(a.as_ref())).collect()
    }

    pub fn strings(&self, ids: &[usize]) -> Result<Vec<String>, LanguageError> {
        ids.iter()
            .map(|&id| {
                self.action(id)
                    .map(str::to_string)
                    .ok_or_else(|| LanguageError::UnknownAction { action: format!("#{id}") })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::grammar::DropGrammar;

    #[test]
    fn test_vocab_is_a_bijection() {
        let vocab = ActionVocab::from(DropGrammar::new().all_possible_productions());
        for (id, action) in vocab.actions().iter().enumerate() {
            assert_eq!(vocab.id(action).unwrap(), id);
            assert_eq!(vocab.action(id), Some(action.as_str()));
        }
        assert!(vocab.id("Nope -> nothing").is_err());
    }

    #[test]
    fn test_vocab_serialises_as_ordered_list() {
        let vocab = ActionVocab::from(vec!["b".to_string(), "a".to_string()]);
        let json  = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["b","a"]"#);
        let back: ActionVocab = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
    }
}
