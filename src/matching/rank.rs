//! Similarity ranking of free-text search hits.

use strsim::jaro_winkler;

use crate::models::{RankedCandidate, RegulatoryRecord};
use crate::parser::normalize_text;

/// Score each record against the title and order best-first.
///
/// The score is the better Jaro-Winkler similarity of the normalized title
/// against the normalized product name or active component. Equal scores
/// are ordered by registration number.
pub fn rank_candidates(title: &str, records: Vec<RegulatoryRecord>) -> Vec<RankedCandidate> {
    let needle = normalize_text(title);

    let mut ranked: Vec<RankedCandidate> = records
        .into_iter()
        .map(|record| {
            let score = score(&needle, &record);
            RankedCandidate { record, score }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record.registration_number.cmp(&b.record.registration_number))
    });
    ranked
}

fn score(needle: &str, record: &RegulatoryRecord) -> f64 {
    if needle.is_empty() {
        return 0.0;
    }
    let name = similarity(needle, &record.product_name);
    let component = record
        .active_component
        .as_deref()
        .map(|c| similarity(needle, c))
        .unwrap_or(0.0);

    // Four decimals keep the stored evidence readable
    (name.max(component) * 10_000.0).round() / 10_000.0
}

fn similarity(needle: &str, field: &str) -> f64 {
    let field = normalize_text(field);
    if field.is_empty() {
        0.0
    } else {
        jaro_winkler(needle, &field)
    }
}
