use crate::models::{Watchlist, WatchlistSet};

/// Corporate suffix tokens ignored when comparing names.
const SUFFIX_TOKENS: &[&str] = &["ltd", "limited", "pvt", "private", "inc", "corp", "llp"];

/// Tokens longer than this many characters count as significant.
const SIGNIFICANT_TOKEN_MIN: usize = 3;

/// Decides whether two company names denote the same entity.
pub trait NameMatcher: Send + Sync {
    fn normalize(&self, name: &str) -> String;

    /// Compare two raw (un-normalized) names.
    fn matches(&self, a: &str, b: &str) -> bool;
}

/// Equality, prefix or substring in either direction after normalization.
///
/// Accepts false positives on short names (e.g. a short name that is a
/// substring of an unrelated longer one) in exchange for recall.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveMatcher;

impl NameMatcher for PermissiveMatcher {
    fn normalize(&self, name: &str) -> String {
        normalize_company(name)
    }

    fn matches(&self, a: &str, b: &str) -> bool {
        normalized_match(&normalize_company(a), &normalize_company(b))
    }
}

/// Lower-case, drop trailing periods and corporate suffixes, collapse whitespace.
pub fn normalize_company(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| !token.is_empty() && !SUFFIX_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match predicate over already-normalized names. Empty names never match.
pub fn normalized_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.starts_with(b) || b.starts_with(a) || a.contains(b) || b.contains(a)
}

/// Tokens of a normalized name long enough to identify it in free text.
pub fn significant_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > SIGNIFICANT_TOKEN_MIN)
        .collect()
}

/// Keyword used for calendar text search: first significant token, else the first word.
pub fn search_keyword(normalized: &str) -> Option<&str> {
    significant_tokens(normalized)
        .into_iter()
        .next()
        .or_else(|| normalized.split_whitespace().next())
}

pub fn is_member(matcher: &dyn NameMatcher, watchlist: &Watchlist, company: &str) -> bool {
    watchlist
        .companies
        .iter()
        .any(|member| matcher.matches(company, member))
}

/// First watchlist in priority order with a member matching `company`.
pub fn matching_watchlist<'a>(
    matcher: &dyn NameMatcher,
    watchlists: &'a WatchlistSet,
    company: &str,
) -> Option<&'a Watchlist> {
    watchlists
        .iter()
        .find(|list| is_member(matcher, list, company))
}
