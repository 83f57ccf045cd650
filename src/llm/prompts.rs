//! Prompt text for the classification call.

use crate::models::{MatchInput, RankedCandidate};
use crate::parser::ParsedTitle;

/// Longest slice of any single input field placed into a prompt.
const MAX_FIELD_CHARS: usize = 200;

/// System message for chat-style providers.
pub const SYSTEM_PROMPT: &str = "You reconcile pharmacy inventory rows against an official \
drug registry. You answer with a single JSON object and nothing else: no prose, no markdown \
fences.";

const CLASSIFICATION_TEMPLATE: &str = r#"A pharmacy imported a product row with messy data. Decide whether it is one of the registry candidates below.

Imported row:
- Title: {title}
- Cleaned name: {clean_name}
- Dose: {dose}
- Pack size: {quantity}
- Laboratory: {lab}
- Branch: {branch}

Registry candidates:
{candidates}

Respond with ONLY this JSON object:
{"match_found": true or false, "registration_number": "<registration number of the matching candidate, or null>", "suggested_name": "<standardized product name>", "confidence": <number between 0 and 1>, "reason": "<one short sentence>"}"#;

/// Cut a field to [`MAX_FIELD_CHARS`] characters.
fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_FIELD_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => clip(v),
        _ => "unknown",
    }
}

/// Build the classification request for one row.
pub fn classification_prompt(
    input: &MatchInput,
    parsed: &ParsedTitle,
    candidates: &[RankedCandidate],
) -> String {
    let candidate_lines = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. [{}] {} | active component: {} | holder: {} | similarity: {:.2}",
                i + 1,
                c.record.registration_number,
                c.record.product_name,
                or_unknown(c.record.active_component.as_deref()),
                or_unknown(c.record.holder_name.as_deref()),
                c.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let lab = input
        .lab
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .or(parsed.known_lab());
    let dose = parsed.dose.as_ref().map(|d| d.to_string());
    let quantity = parsed.quantity.as_ref().map(|q| q.to_string());

    CLASSIFICATION_TEMPLATE
        .replace("{title}", clip(input.title.trim()))
        .replace("{clean_name}", or_unknown(Some(parsed.clean_name.as_str())))
        .replace("{dose}", or_unknown(dose.as_deref()))
        .replace("{quantity}", or_unknown(quantity.as_deref()))
        .replace("{lab}", or_unknown(lab))
        .replace("{branch}", or_unknown(input.branch.as_deref()))
        .replace("{candidates}", &candidate_lines)
}
