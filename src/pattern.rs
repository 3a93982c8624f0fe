//! Package id patterns with `*` wildcards.
//!
//! `*` matches zero or more characters; every other character is literal.
//! Matching is case-insensitive, like package ids themselves.

use crate::model::fold_id;

/// A pattern split on `*` into literal segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    raw: String,
    parts: Vec<String>,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Self {
        let trimmed = pattern.trim();
        Self {
            raw: trimmed.to_string(),
            parts: fold_id(trimmed).split('*').map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_wildcard(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = fold_id(text);

        if self.parts.len() == 1 {
            return self.parts[0] == text;
        }

        let first = &self.parts[0];
        let last = &self.parts[self.parts.len() - 1];

        if text.len() < first.len() + last.len() {
            return false;
        }
        if !text.starts_with(first.as_str()) || !text.ends_with(last.as_str()) {
            return false;
        }

        let mut remaining = &text[first.len()..text.len() - last.len()];
        for part in &self.parts[1..self.parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match remaining.find(part.as_str()) {
                Some(pos) => remaining = &remaining[pos + part.len()..],
                None => return false,
            }
        }

        true
    }
}

/// A list of compiled patterns; a text matches the set if any pattern matches.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<WildcardPattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.as_ref())
                .filter(|p| !p.trim().is_empty())
                .map(WildcardPattern::new)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text))
    }
}
