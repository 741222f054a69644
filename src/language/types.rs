// ============================================================
// Layer 3b — Program Language Types
// ============================================================
// The closed set of types and functions of the DROP program
// language. Every function has a fixed signature:
//
//   find_PassageAttention      ()                 → PassageAttention
//   find_passageSpanAnswer     (PassageAttention) → PassageSpanAnswer
//   find_questionSpanAnswer    ()                 → QuestionSpanAnswer
//   compare_date_lesser_than   (PA, PA)           → PassageAttention
//   compare_date_greater_than  (PA, PA)           → PassageAttention
//   compare_num_lesser_than    (PA, PA)           → PassageAttention
//   compare_num_greater_than   (PA, PA)           → PassageAttention
//   year_difference            (PA, PA)           → YearDifference
//
// Because both enums are closed, every consumer (grammar,
// executor, losses, answer rendering) matches exhaustively and
// the compiler flags any place a new type is not handled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::language::error::LanguageError;

/// Nonterminal types of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Start,
    PassageSpanAnswer,
    QuestionSpanAnswer,
    YearDifference,
    PassageAttention,
}

impl NodeType {
    /// Types a complete program may return.
    pub const START_TYPES: [NodeType; 3] = [
        NodeType::PassageSpanAnswer,
        NodeType::QuestionSpanAnswer,
        NodeType::YearDifference,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Start              => "@start@",
            NodeType::PassageSpanAnswer  => "PassageSpanAnswer",
            NodeType::QuestionSpanAnswer => "QuestionSpanAnswer",
            NodeType::YearDifference     => "YearDifference",
            NodeType::PassageAttention   => "PassageAttention",
        }
    }

    pub fn is_start_type(&self) -> bool {
        Self::START_TYPES.contains(self)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeType {
    type Err = LanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "@start@"            => Ok(NodeType::Start),
            "PassageSpanAnswer"  => Ok(NodeType::PassageSpanAnswer),
            "QuestionSpanAnswer" => Ok(NodeType::QuestionSpanAnswer),
            "YearDifference"     => Ok(NodeType::YearDifference),
            "PassageAttention"   => Ok(NodeType::PassageAttention),
            other => Err(LanguageError::malformed(format!("unknown type '{other}'"))),
        }
    }
}

/// The executable operations of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {
    FindPassageAttention,
    FindPassageSpanAnswer,
    FindQuestionSpanAnswer,
    CompareDateLesserThan,
    CompareDateGreaterThan,
    CompareNumLesserThan,
    CompareNumGreaterThan,
    YearDifference,
}

impl Function {
    pub const ALL: [Function; 8] = [
        Function::FindPassageAttention,
        Function::FindPassageSpanAnswer,
        Function::FindQuestionSpanAnswer,
        Function::CompareDateLesserThan,
        Function::CompareDateGreaterThan,
        Function::CompareNumLesserThan,
        Function::CompareNumGreaterThan,
        Function::YearDifference,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::FindPassageAttention   => "find_PassageAttention",
            Function::FindPassageSpanAnswer  => "find_passageSpanAnswer",
            Function::FindQuestionSpanAnswer => "find_questionSpanAnswer",
            Function::CompareDateLesserThan  => "compare_date_lesser_than",
            Function::CompareDateGreaterThan => "compare_date_greater_than",
            Function::CompareNumLesserThan   => "compare_num_lesser_than",
            Function::CompareNumGreaterThan  => "compare_num_greater_than",
            Function::YearDifference         => "year_difference",
        }
    }

    pub fn return_type(&self) -> NodeType {
        match self {
            Function::FindPassageSpanAnswer  => NodeType::PassageSpanAnswer,
            Function::FindQuestionSpanAnswer => NodeType::QuestionSpanAnswer,
            Function::YearDifference         => NodeType::YearDifference,
            Function::FindPassageAttention
            | Function::CompareDateLesserThan
            | Function::CompareDateGreaterThan
            | Function::CompareNumLesserThan
            | Function::CompareNumGreaterThan => NodeType::PassageAttention,
        }
    }

    pub fn argument_types(&self) -> &'static [NodeType] {
        const NONE: &[NodeType] = &[];
        const ONE_ATTENTION: &[NodeType] = &[NodeType::PassageAttention];
        const TWO_ATTENTIONS: &[NodeType] =
            &[NodeType::PassageAttention, NodeType::PassageAttention];

        match self {
            Function::FindPassageAttention | Function::FindQuestionSpanAnswer => NONE,
            Function::FindPassageSpanAnswer => ONE_ATTENTION,
            Function::CompareDateLesserThan
            | Function::CompareDateGreaterThan
            | Function::CompareNumLesserThan
            | Function::CompareNumGreaterThan
            | Function::YearDifference => TWO_ATTENTIONS,
        }
    }

    pub fn arity(&self) -> usize {
        self.argument_types().len()
    }

    /// The grammar action that selects this function.
    pub fn action(&self) -> String {
        format!("{} -> {}", self.return_type(), self.name())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Function {
    type Err = LanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Function::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| LanguageError::UnknownFunction { name: s.to_string() })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names_round_trip() {
        for f in Function::ALL {
            assert_eq!(f.name().parse::<Function>().unwrap(), f);
        }
    }

    #[test]
    fn test_node_type_names_round_trip() {
        for t in NodeType::START_TYPES {
            assert_eq!(t.name().parse::<NodeType>().unwrap(), t);
        }
        assert_eq!("@start@".parse::<NodeType>().unwrap(), NodeType::Start);
    }

    #[test]
    fn test_actions_render_return_type() {
        assert_eq!(
            Function::FindPassageSpanAnswer.action(),
            "PassageSpanAnswer -> find_passageSpanAnswer"
        );
        assert_eq!(Function::CompareNumGreaterThan.arity(), 2);
    }
}
