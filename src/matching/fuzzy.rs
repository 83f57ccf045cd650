//! Fuzzy tier: free-text candidates disambiguated by the classifier.

use tracing::{debug, warn};

use super::rank::rank_candidates;
use super::verdict::parse_verdict;
use crate::llm::{classification_prompt, Classifier};
use crate::models::{MatchInput, MatchResult, SkipReason};
use crate::parser::{parse_title, search_fragment};
use crate::repository::{RegistryLookup, Result, FREE_TEXT_LIMIT};

/// Builds a bounded candidate set and asks the classifier to pick.
///
/// Classifier problems never escape this type: a failed or unreadable call
/// turns into an unresolved result for the row. Registry read failures do
/// escape, since they are storage failures.
pub struct FuzzyClassifierAdapter<'a> {
    registry: &'a dyn RegistryLookup,
    classifier: Option<&'a dyn Classifier>,
}

impl<'a> FuzzyClassifierAdapter<'a> {
    pub fn new(registry: &'a dyn RegistryLookup, classifier: Option<&'a dyn Classifier>) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    pub async fn resolve(&self, input: &MatchInput) -> Result<MatchResult> {
        let Some(fragment) = search_fragment(&input.title) else {
            debug!("Empty title, skipping classifier");
            return Ok(MatchResult::ai_skipped(SkipReason::EmptyTitle, None));
        };

        let found = self.registry.search_registry(fragment, FREE_TEXT_LIMIT).await?;
        if found.is_empty() {
            debug!("No registry candidates for '{}', skipping classifier", fragment);
            return Ok(MatchResult::ai_skipped(
                SkipReason::NoCandidates,
                Some(fragment.to_string()),
            ));
        }

        let candidates = rank_candidates(&input.title, found);

        let Some(classifier) = self.classifier else {
            debug!(
                "{} candidate(s) for '{}' but no classifier configured",
                candidates.len(),
                fragment
            );
            return Ok(MatchResult::unresolved(format!(
                "{} registry candidate(s) found; classifier not configured",
                candidates.len()
            )));
        };

        let parsed = parse_title(&input.title);
        let prompt = classification_prompt(input, &parsed, &candidates);

        let reply = match classifier.classify(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Classifier call failed for '{}': {}", input.title, e);
                return Ok(MatchResult::unresolved(format!("classifier call failed: {}", e)));
            }
        };

        match parse_verdict(&reply) {
            Ok((verdict, response)) => {
                debug!(
                    "Classifier verdict for '{}': match_found={} confidence={:.2}",
                    input.title, verdict.match_found, verdict.confidence
                );
                Ok(MatchResult::ai_suggestion(
                    classifier.source(),
                    verdict,
                    response,
                    candidates,
                ))
            }
            Err(e) => {
                warn!("Unusable classifier reply for '{}': {}", input.title, e);
                Ok(MatchResult::unresolved(format!("classifier reply rejected: {}", e)))
            }
        }
    }
}
