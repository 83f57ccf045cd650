//! Runs the matching tiers for one row.

use tracing::debug;

use super::deterministic::DeterministicMatcher;
use super::fuzzy::FuzzyClassifierAdapter;
use crate::llm::Classifier;
use crate::models::{MatchInput, MatchResult};
use crate::repository::{RegistryLookup, Result};

/// Registry, then barcode, then fuzzy. The first tier to decide wins.
pub struct MatchOrchestrator<'a> {
    deterministic: DeterministicMatcher<'a>,
    fuzzy: FuzzyClassifierAdapter<'a>,
}

impl<'a> MatchOrchestrator<'a> {
    /// `classifier` may be `None`; the deterministic tiers still work.
    pub fn new(registry: &'a dyn RegistryLookup, classifier: Option<&'a dyn Classifier>) -> Self {
        Self {
            deterministic: DeterministicMatcher::new(registry),
            fuzzy: FuzzyClassifierAdapter::new(registry, classifier),
        }
    }

    /// Produce exactly one result for the row.
    ///
    /// Errors are storage failures only.
    pub async fn resolve(&self, input: &MatchInput) -> Result<MatchResult> {
        if let Some(result) = self.deterministic.resolve(input).await? {
            return Ok(result);
        }

        let result = self.fuzzy.resolve(input).await?;
        debug!(
            "Fuzzy tier for '{}': {}",
            input.title,
            result.tier.map(|t| t.as_str()).unwrap_or("UNRESOLVED")
        );
        Ok(result)
    }
}
