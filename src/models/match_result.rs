//! Match decisions produced by the tiered strategy.

use serde::{Deserialize, Serialize};

use super::{CatalogProduct, RegulatoryRecord, RowStatus};

/// Input to the orchestrator, built from an import row's raw fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchInput {
    pub title: String,
    pub sku: Option<String>,
    pub branch: Option<String>,
    pub lab: Option<String>,
    pub regulatory_code: Option<String>,
    /// Comma-joined candidate barcodes.
    pub barcodes: Option<String>,
}

/// Which strategy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTier {
    Registry,
    Barcode,
    AiSuggestion,
    AiSkipped,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "REGISTRY",
            Self::Barcode => "BARCODE",
            Self::AiSuggestion => "AI_SUGGESTION",
            Self::AiSkipped => "AI_SKIPPED",
        }
    }
}

/// Why the classifier was not consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The free-text search found nothing to give the classifier as context.
    NoCandidates,
    /// The row has no title to derive a search fragment from.
    EmptyTitle,
}

/// Structured answer from the classification service.
///
/// Every field has a fallback; see `matching::parse_verdict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub match_found: bool,
    pub registration_number: Option<String>,
    pub suggested_name: String,
    pub confidence: f64,
    pub reason: String,
}

/// A free-text search hit with its similarity to the normalized title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub record: RegulatoryRecord,
    pub score: f64,
}

/// Audit payload stored in `match_suggestion`, one variant per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchEvidence {
    Registry {
        record: RegulatoryRecord,
    },
    Barcode {
        product: CatalogProduct,
        /// Parsed barcode tokens that were looked up.
        barcodes: Vec<String>,
        /// Ids of other products that matched and lost the tie-break.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        alternatives: Vec<String>,
    },
    AiSuggestion {
        /// Provider and model that answered, e.g. `openai:llama-3.1-8b-instant`.
        source: String,
        verdict: ClassifierVerdict,
        /// Raw response object as returned by the classifier.
        response: serde_json::Value,
        candidates: Vec<RankedCandidate>,
    },
    AiSkipped {
        reason: SkipReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fragment: Option<String>,
    },
    /// No tier reached a decision; the row goes to a human.
    Unresolved {
        reason: String,
    },
}

impl MatchEvidence {
    pub fn tier(&self) -> Option<MatchTier> {
        match self {
            Self::Registry { .. } => Some(MatchTier::Registry),
            Self::Barcode { .. } => Some(MatchTier::Barcode),
            Self::AiSuggestion { .. } => Some(MatchTier::AiSuggestion),
            Self::AiSkipped { .. } => Some(MatchTier::AiSkipped),
            Self::Unresolved { .. } => None,
        }
    }
}

/// Outcome of matching one row, folded into the row on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub tier: Option<MatchTier>,
    pub target_product_id: Option<String>,
    pub confidence: f64,
    pub status: RowStatus,
    pub evidence: MatchEvidence,
}

impl MatchResult {
    /// Registry hit: the product exists officially but no catalog entry is implied.
    pub fn registry(record: RegulatoryRecord) -> Self {
        Self::from_evidence(
            MatchEvidence::Registry { record },
            None,
            1.0,
            RowStatus::NeedsReview,
        )
    }

    pub fn barcode(
        product: CatalogProduct,
        barcodes: Vec<String>,
        alternatives: Vec<String>,
    ) -> Self {
        let target = Some(product.id.clone());
        let evidence = MatchEvidence::Barcode {
            product,
            barcodes,
            alternatives,
        };
        Self::from_evidence(evidence, target, 1.0, RowStatus::Matched)
    }

    /// AI answers are suggestions only and always need a human.
    pub fn ai_suggestion(
        source: String,
        verdict: ClassifierVerdict,
        response: serde_json::Value,
        candidates: Vec<RankedCandidate>,
    ) -> Self {
        let confidence = verdict.confidence;
        let evidence = MatchEvidence::AiSuggestion {
            source,
            verdict,
            response,
            candidates,
        };
        Self::from_evidence(evidence, None, confidence, RowStatus::NeedsReview)
    }

    pub fn ai_skipped(reason: SkipReason, fragment: Option<String>) -> Self {
        Self::from_evidence(
            MatchEvidence::AiSkipped { reason, fragment },
            None,
            0.0,
            RowStatus::NeedsReview,
        )
    }

    /// Fail-closed default when nothing decided.
    pub fn unresolved(reason: impl Into<String>) -> Self {
        Self::from_evidence(
            MatchEvidence::Unresolved {
                reason: reason.into(),
            },
            None,
            0.0,
            RowStatus::NeedsReview,
        )
    }

    fn from_evidence(
        evidence: MatchEvidence,
        target_product_id: Option<String>,
        confidence: f64,
        status: RowStatus,
    ) -> Self {
        Self {
            tier: evidence.tier(),
            target_product_id,
            confidence,
            status,
            evidence,
        }
    }
}
