//! crates/baby_english_core/src/evaluator.rs
//!
//! Checks a learner's message against a vocabulary and scores it.
//!
//! Matching is exact and word-by-word: text is lowercased, split on whitespace
//! and stripped of punctuation. Multi-word vocabulary entries such as
//! "thank you" can therefore never match.

use crate::error::{CoreError, CoreResult};
use crate::vocabulary::Vocabulary;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Points awarded per distinct matched word.
pub const POINTS_PER_MATCH: u32 = 5;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.,!?;:'"()]"#).expect("punctuation pattern is valid"));

/// Lowercases `text`, splits it on whitespace and removes punctuation.
/// Tokens left empty are dropped.
pub fn normalize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|token| PUNCTUATION.replace_all(token, "").into_owned())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Rejects messages with nothing to evaluate.
pub fn validate_message(text: &str) -> CoreResult<&str> {
    if text.trim().is_empty() {
        return Err(CoreError::InvalidInput("message must not be empty".to_string()));
    }
    Ok(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Normalized tokens, in message order.
    pub tokens: Vec<String>,
    /// Tokens that are in the vocabulary.
    pub matched: BTreeSet<String>,
    /// True when every token is in the vocabulary.
    pub all_words_allowed: bool,
}

impl Evaluation {
    pub fn points(&self) -> u32 {
        self.matched.len() as u32 * POINTS_PER_MATCH
    }

    pub fn success(&self) -> bool {
        !self.matched.is_empty()
    }

    /// Distinct tokens outside the vocabulary, in order of first appearance.
    pub fn rejected_words(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.tokens
            .iter()
            .filter(|t| !self.matched.contains(*t))
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

pub fn evaluate(text: &str, permitted: &Vocabulary) -> Evaluation {
    let tokens = normalize(text);
    let matched: BTreeSet<String> = tokens
        .iter()
        .filter(|t| permitted.contains(*t))
        .cloned()
        .collect();
    let all_words_allowed = tokens.iter().all(|t| permitted.contains(t));

    Evaluation {
        tokens,
        matched,
        all_words_allowed,
    }
}

/// How messages with words outside the vocabulary are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationPolicy {
    /// Reject the whole message instead of scoring only the matches.
    pub strict_mode: bool,
}

impl EvaluationPolicy {
    pub fn enforce(&self, evaluation: &Evaluation) -> CoreResult<()> {
        if self.strict_mode && !evaluation.all_words_allowed {
            return Err(CoreError::ForbiddenVocabulary {
                rejected: evaluation.rejected_words(),
            });
        }
        Ok(())
    }
}
