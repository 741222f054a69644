// ============================================================
// Layer 4 — Answer Normaliser
// ============================================================
// Puts predicted and gold answer strings into a canonical form
// before they are compared by the EM/F1 metric.
//
// Normalisation steps (applied in order):
//   1. Replace Unicode whitespace variants and control
//      characters with a plain space
//   2. Lowercase
//   3. Split on whitespace and hyphens
//   4. Numbers are re-rendered ("5.0" → "5"); other tokens lose
//      every punctuation character
//   5. Drop the articles a / an / the and empty tokens
//   6. Join with single spaces
//
// Reference: Rust Book §8 (Strings in Rust)
//            Rust Book §13 (Iterators)

const ARTICLES: [&str; 3] = ["a", "an", "the"];

pub struct AnswerNormalizer;

impl AnswerNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Whitespace and control-character cleanup only.
    pub fn clean(&self, text: &str) -> String {
        text.chars()
            .map(|c| match c {
                '\t' | '\r' | '\n' => ' ',
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect()
    }

    /// Canonical tokens of an answer string.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        self.clean(text)
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter_map(normalise_token)
            .filter(|t| !ARTICLES.contains(&t.as_str()))
            .collect()
    }
}

impl Default for AnswerNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn normalise_token(token: &str) -> Option<String> {
    if let Ok(value) = token.replace(',', "").parse::<f64>() {
        if value.is_finite() {
            return Some(render_number(value));
        }
    }
    let stripped: String = token.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    (!stripped.is_empty()).then_some(stripped)
}

fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
