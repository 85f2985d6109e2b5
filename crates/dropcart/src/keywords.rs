//! Monitor input classification and positive/negative keyword matching.

use url::Url;

/// What a monitor input refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDescriptor {
    /// A raw variant identifier (expected numeric, checked by the resolver).
    Identifier(String),
    /// A direct product page URL.
    Url(Url),
    /// A comma separated `+term,-term` expression.
    Keywords(String),
}

impl ItemDescriptor {
    pub fn is_keywords(&self) -> bool {
        matches!(self, ItemDescriptor::Keywords(_))
    }
}

/// Classify a monitor input.
pub fn classify(input: &str) -> ItemDescriptor {
    let trimmed = input.trim();
    if trimmed.starts_with('+') || trimmed.starts_with('-') {
        return ItemDescriptor::Keywords(trimmed.to_string());
    }

    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => ItemDescriptor::Url(url),
        _ => ItemDescriptor::Identifier(trimmed.to_string()),
    }
}

/// Evaluate a keyword expression against a candidate string.
///
/// Every `+term` must occur in the candidate and no `-term` may occur.
/// Terms without a sign are ignored.
pub fn is_keyword_match(candidate: &str, expression: &str) -> bool {
    if candidate.is_empty() || expression.is_empty() {
        return false;
    }

    let candidate = candidate.to_lowercase();
    let expression: String = expression
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    for term in expression.split(',') {
        if let Some(positive) = term.strip_prefix('+') {
            if !candidate.contains(positive) {
                return false;
            }
        } else if let Some(negative) = term.strip_prefix('-') {
            if !negative.is_empty() && candidate.contains(negative) {
                return false;
            }
        }
    }

    true
}
