// ============================================================
// Layer 3 — DropInstance Domain Type
// ============================================================
// One reading-comprehension example as supplied by the
// preprocessing/reader stage:
//
//   - question and passage, both raw text and tokenised
//   - token → character offset tables (for rendering answers)
//   - dates and numbers detected in the passage, with a
//     token → entity alignment (-1 = token is not an entity)
//   - gold answer annotations in every representation we can
//     supervise against (passage spans, question spans, year gaps)
//   - optional auxiliary supervision (question type, event groundings)
//
// Spans are inclusive token index pairs. Rows equal to [-1, -1]
// are padding and never count as a valid answer.
//
// Reference: Rust Book §5 (Structs), serde derive documentation

use serde::{Deserialize, Serialize};

use crate::domain::date::Date;

/// Inclusive `[start, end]` token span; `[-1, -1]` is padding.
pub type TokenSpan = [i64; 2];

/// Padding row used in span lists.
pub const PADDED_SPAN: TokenSpan = [-1, -1];

/// Question categories for which a gold program can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    DateComparison,
    NumberComparison,
    YearDifference,
}

/// Every gold representation available for an instance's answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoldAnswer {
    /// Acceptable answer strings
    #[serde(default)]
    pub texts: Vec<String>,

    #[serde(default)]
    pub passage_spans: Vec<TokenSpan>,

    #[serde(default)]
    pub question_spans: Vec<TokenSpan>,

    /// Acceptable year gaps; -1 rows are padding
    #[serde(default)]
    pub year_differences: Vec<i64>,
}

impl GoldAnswer {
    pub fn valid_passage_spans(&self) -> impl Iterator<Item = &TokenSpan> {
        self.passage_spans.iter().filter(|s| is_valid_span(s))
    }

    pub fn has_passage_spans(&self) -> bool {
        self.valid_passage_spans().next().is_some()
    }

    pub fn has_question_spans(&self) -> bool {
        self.question_spans.iter().any(is_valid_span)
    }

    pub fn has_year_differences(&self) -> bool {
        self.year_differences.iter().any(|&d| d >= 0)
    }

    /// True if at least one representation can supervise a program.
    pub fn is_supervisable(&self) -> bool {
        self.has_passage_spans() || self.has_question_spans() || self.has_year_differences()
    }
}

pub fn is_valid_span(span: &TokenSpan) -> bool {
    span[0] >= 0 && span[1] >= span[0]
}

/// Probability vectors over passage entities (dates or numbers)
/// saying which entity each question event refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventGroundings {
    pub first:  Vec<f32>,
    pub second: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInstance {
    pub query_id: String,

    /// Original question text
    pub question: String,

    /// Original passage text
    pub passage: String,

    pub question_tokens: Vec<String>,
    pub passage_tokens:  Vec<String>,

    /// Per token `[char_start, char_end)` into `question`
    #[serde(default)]
    pub question_token_offsets: Vec<[usize; 2]>,

    /// Per token `[char_start, char_end)` into `passage`
    #[serde(default)]
    pub passage_token_offsets: Vec<[usize; 2]>,

    #[serde(default)]
    pub passage_date_values: Vec<Date>,

    /// Passage token index → index into `passage_date_values`, or -1
    #[serde(default)]
    pub passage_token_to_date: Vec<i64>,

    #[serde(default)]
    pub passage_number_values: Vec<f64>,

    /// Passage token index → index into `passage_number_values`, or -1
    #[serde(default)]
    pub passage_token_to_number: Vec<i64>,

    #[serde(default)]
    pub answer: GoldAnswer,

    #[serde(default)]
    pub question_type: Option<QuestionType>,

    #[serde(default)]
    pub strongly_supervised: bool,

    #[serde(default)]
    pub date_groundings: Option<EventGroundings>,

    #[serde(default)]
    pub number_groundings: Option<EventGroundings>,
}

impl DropInstance {
    /// Questions are lowercased once here so cue matching is case-blind.
    pub fn lowercase_question_tokens(&self) -> Vec<String> {
        self.question_tokens.iter().map(|t| t.to_lowercase()).collect()
    }
}
