//! Small text helpers shared by the matching tiers.

use regex::Regex;
use std::sync::LazyLock;

/// Packaging words that carry no identity information.
const STOP_WORDS: [&str; 9] = [
    "MG",
    "COMPRIMIDOS",
    "CAPSULAS",
    "JARABE",
    "CM",
    "AL",
    "X",
    "CAJA",
    "FRASCO",
];

static STOP_WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b(?:{})\b", STOP_WORDS.join("|"))).unwrap());

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Z0-9\s]").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Uppercase, drop packaging stop words and punctuation, collapse spaces.
pub fn normalize_text(text: &str) -> String {
    let upper = text.to_uppercase();
    let without_stops = STOP_WORD_PATTERN.replace_all(&upper, "");
    let alnum = NON_ALNUM.replace_all(&without_stops, "");
    WHITESPACE.replace_all(alnum.trim(), " ").into_owned()
}

/// Coarse search key: the title up to its first whitespace.
///
/// Returns `None` for blank titles.
pub fn search_fragment(title: &str) -> Option<&str> {
    title.split_whitespace().next()
}

/// Split a comma-joined barcode field into trimmed, non-empty, unique tokens.
///
/// Order of first appearance is kept.
pub fn parse_barcodes(raw: Option<&str>) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in raw.unwrap_or_default().split(',').map(str::trim) {
        if !token.is_empty() && !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}
