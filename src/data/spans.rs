// ============================================================
// Layer 4 — Answer Span Finder
// ============================================================
// Recovers gold passage spans from answer texts for instances
// that only carry strings.
//
// Matching rules:
//   - tokens are lowercased and stripped of surrounding
//     punctuation on both sides
//   - a match starts at any passage position equal to the first
//     answer token
//   - articles (a / an / the) inside the passage may be skipped
//     while matching
//   - a span is kept only if every answer token was consumed
//
// Example:
//   passage: "the Treaty of the Paris ,"   answer: "treaty of paris"
//   → [1, 4]
//
// Reference: Rust Book §8 (Collections)

use std::collections::HashMap;

use crate::domain::instance::TokenSpan;

const IGNORED_TOKENS: [&str; 3] = ["a", "an", "the"];

fn is_stripped(c: char) -> bool {
    c.is_ascii_punctuation() || matches!(c, '‘' | '’' | '´' | '`')
}

fn normalise_token(token: &str) -> String {
    token.to_lowercase().trim_matches(is_stripped).to_string()
}

/// Inclusive token spans of `passage_tokens` matching any answer text.
pub fn find_valid_spans(passage_tokens: &[String], answer_texts: &[String]) -> Vec<TokenSpan> {
    let normalised: Vec<String> = passage_tokens.iter().map(|t| normalise_token(t)).collect();

    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, token) in normalised.iter().enumerate() {
        positions.entry(token.as_str()).or_default().push(i);
    }

    let mut spans = Vec::new();
    for text in answer_texts {
        let answer: Vec<String> = text
            .to_lowercase()
            .trim_matches(is_stripped)
            .split_whitespace()
            .map(normalise_token)
            .collect();
        let Some(starts) = answer.first().and_then(|first| positions.get(first.as_str())) else {
            continue;
        };

        for &start in starts {
            let mut end     = start;
            let mut matched = 1;
            while matched < answer.len() && end + 1 < normalised.len() {
                let next = &normalised[end + 1];
                if *next == answer[matched] {
                    matched += 1;
                    end     += 1;
                } else if IGNORED_TOKENS.contains(&next.as_str()) {
                    end += 1;
                } else {
                    break;
                }
            }
            if matched == answer.len() {
                spans.push([start as i64, end as i64]);
            }
        }
    }
    spans
}
