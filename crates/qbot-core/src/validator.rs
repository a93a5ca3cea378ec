//! Admissibility checks for candidate questions.
//!
//! Pure functions over their inputs; no state and no I/O.

use thiserror::Error;

/// Phrases that mark a demand-forecasting or market-trend question
pub const FORBIDDEN_PHRASES: &[&str] = &[
    "expected demand",
    "market forecast",
    "market size",
    "market trend",
    "industry trend",
    "market growth",
    "demand forecast",
    "market prediction",
    "future of the market",
    "market outlook",
];

/// Why a candidate question was not admitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("empty reply")]
    Empty,

    #[error("reply cut off at the token limit")]
    Truncated,

    #[error("contains forbidden phrase \"{0}\"")]
    Forbidden(&'static str),

    #[error("duplicates question {number} (similarity {score})")]
    Duplicate { number: usize, score: u8 },
}

impl Rejection {
    /// Stable short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Empty => "empty",
            Rejection::Truncated => "truncated",
            Rejection::Forbidden(_) => "forbidden",
            Rejection::Duplicate { .. } => "duplicate",
        }
    }
}

/// The first denylisted phrase found in `text`, ignoring case
pub fn forbidden_phrase(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    FORBIDDEN_PHRASES
        .iter()
        .copied()
        .find(|phrase| lowered.contains(phrase))
}

pub fn is_forbidden(text: &str) -> bool {
    forbidden_phrase(text).is_some()
}

/// Fuzzy similarity on a 0-100 scale.
///
/// Both strings are lowercased and trimmed, then the shorter is slid across
/// the longer one character at a time. Each equal-length window is scored
/// with normalized Levenshtein similarity and the best window wins, so a
/// question contained in a longer one still scores high. Empty input scores 0.
pub fn similarity(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let (short, long) = if a_len <= b_len { (&a, &b) } else { (&b, &a) };
    let short_len = a_len.min(b_len);
    let long_chars: Vec<char> = long.chars().collect();

    let mut best = 0.0_f64;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        let score = strsim::normalized_levenshtein(short, &window);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }

    (best * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Highest-scoring prior question and its score, if any prior exists.
/// Ties go to the earliest question.
pub fn closest_match<S: AsRef<str>>(text: &str, prior: &[S]) -> Option<(usize, u8)> {
    prior
        .iter()
        .enumerate()
        .map(|(i, question)| (i, similarity(text, question.as_ref())))
        .fold(None, |best, (i, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((i, score)),
        })
}

/// True when any prior question scores at or above `threshold`
pub fn is_duplicate<S: AsRef<str>>(text: &str, prior: &[S], threshold: u8) -> bool {
    prior
        .iter()
        .any(|question| similarity(text, question.as_ref()) >= threshold)
}

/// Run every check against a candidate question
pub fn check<S: AsRef<str>>(candidate: &str, prior: &[S], threshold: u8) -> Result<(), Rejection> {
    if candidate.trim().is_empty() {
        return Err(Rejection::Empty);
    }
    if let Some(phrase) = forbidden_phrase(candidate) {
        return Err(Rejection::Forbidden(phrase));
    }
    match closest_match(candidate, prior) {
        Some((index, score)) if score >= threshold => Err(Rejection::Duplicate {
            number: index + 1,
            score,
        }),
        _ => Ok(()),
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
