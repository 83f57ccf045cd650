//! Exact-match tiers: regulatory code, then barcode.

use tracing::debug;

use crate::models::{MatchInput, MatchResult};
use crate::parser::parse_barcodes;
use crate::repository::{RegistryLookup, Result};

/// Resolves rows that carry an unambiguous identifier.
pub struct DeterministicMatcher<'a> {
    registry: &'a dyn RegistryLookup,
}

impl<'a> DeterministicMatcher<'a> {
    pub fn new(registry: &'a dyn RegistryLookup) -> Self {
        Self { registry }
    }

    /// Run tier A, then tier B. `None` means neither identified the row.
    pub async fn resolve(&self, input: &MatchInput) -> Result<Option<MatchResult>> {
        if let Some(result) = self.match_registry(input).await? {
            return Ok(Some(result));
        }
        self.match_barcode(input).await
    }

    /// Tier A: look the regulatory code up in the official registry.
    ///
    /// A hit proves the product exists but does not pick a catalog entry,
    /// so the row still goes to review.
    pub async fn match_registry(&self, input: &MatchInput) -> Result<Option<MatchResult>> {
        let code = match input.regulatory_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code,
            _ => return Ok(None),
        };

        let record = self.registry.find_by_registration(code).await?;
        if let Some(ref record) = record {
            debug!("Registry hit for code {}: {}", code, record.product_name);
        }
        Ok(record.map(MatchResult::registry))
    }

    /// Tier B: look the row's barcodes up in the catalog.
    ///
    /// Several products may share the barcodes; the lowest id wins and the
    /// others are kept as alternatives.
    pub async fn match_barcode(&self, input: &MatchInput) -> Result<Option<MatchResult>> {
        let barcodes = parse_barcodes(input.barcodes.as_deref());
        if barcodes.is_empty() {
            return Ok(None);
        }

        let mut products = self.registry.find_by_barcodes(&barcodes).await?;
        if products.is_empty() {
            return Ok(None);
        }
        products.sort_by(|a, b| a.id.cmp(&b.id));

        let mut products = products.into_iter();
        let Some(winner) = products.next() else {
            return Ok(None);
        };
        let alternatives: Vec<String> = products
            .map(|p| p.id)
            .filter(|id| *id != winner.id)
            .collect();

        debug!(
            "Barcode match {} ({} alternative(s))",
            winner.id,
            alternatives.len()
        );
        Ok(Some(MatchResult::barcode(winner, barcodes, alternatives)))
    }
}
