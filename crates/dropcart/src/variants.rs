//! Variant selection by size and availability.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use regex::Regex;

use crate::error::{DropcartError, DropcartResult};
use crate::keywords::is_keyword_match;
use crate::types::{Product, Variant};

fn numeric_size() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("numeric size regex is valid"))
}

/// Whether a variant label satisfies a requested size.
///
/// Labels containing digits compare their leading number ("8.5 US" is
/// "8.5"); other labels must be equal, so "L" never matches "XL".
pub fn size_matches(label: &str, size: &str) -> bool {
    let label = label.trim();
    let size = size.trim();
    if label.chars().any(|c| c.is_ascii_digit()) {
        let number = numeric_size().find(label).map(|m| m.as_str());
        let wanted = numeric_size().find(size).map(|m| m.as_str()).unwrap_or(size);
        return number == Some(wanted);
    }
    label == size
}

/// Pick the variant to buy.
///
/// Available variants are preferred; the final choice among the eligible
/// set is uniformly random.
pub fn select_variant<'a>(
    variants: &'a [Variant],
    sizes: &[String],
) -> DropcartResult<&'a Variant> {
    let matched: Vec<&Variant> = if sizes.is_empty() {
        variants.iter().collect()
    } else {
        variants
            .iter()
            .filter(|v| sizes.iter().any(|s| size_matches(v.label(), s)))
            .collect()
    };

    let available: Vec<&Variant> = matched.iter().copied().filter(|v| v.available).collect();
    let eligible = if available.is_empty() { matched } else { available };

    eligible
        .choose(&mut rand::thread_rng())
        .copied()
        .ok_or(DropcartError::NoVariant)
}

/// Find the first product matching any keyword expression.
///
/// Titles are scanned first; handles only when no title matched.
pub fn find_product<'a>(products: &'a [Product], expressions: &[String]) -> Option<&'a Product> {
    let matches = |field: &str| expressions.iter().any(|e| is_keyword_match(field, e));

    products
        .iter()
        .find(|p| matches(&p.title))
        .or_else(|| products.iter().find(|p| matches(&p.handle)))
}
