//! Import rows awaiting reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MatchInput;

/// Lifecycle state of an import row.
///
/// `Processing` is never stored: a claimed row keeps `Pending` and carries a
/// lease instead. It exists so callers can report leased rows distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Pending,
    Processing,
    Matched,
    NeedsReview,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Matched => "MATCHED",
            Self::NeedsReview => "NEEDS_REVIEW",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "MATCHED" => Some(Self::Matched),
            "NEEDS_REVIEW" => Some(Self::NeedsReview),
            _ => None,
        }
    }

    /// Terminal rows are never selected again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched | Self::NeedsReview)
    }
}

/// One dirty row harvested from a spreadsheet or external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub id: String,
    pub raw_title: String,
    pub raw_sku: Option<String>,
    pub raw_branch: Option<String>,
    pub raw_lab: Option<String>,
    pub raw_regulatory_code: Option<String>,
    pub raw_barcodes: Option<String>,
    pub status: RowStatus,
    pub target_product_id: Option<String>,
    pub confidence_score: Option<f64>,
    /// Stored JSON of the [`super::MatchEvidence`] that decided the row.
    pub match_suggestion: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ImportRow {
    /// Create a fresh pending row with only a title.
    pub fn new(id: impl Into<String>, raw_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_title: raw_title.into(),
            raw_sku: None,
            raw_branch: None,
            raw_lab: None,
            raw_regulatory_code: None,
            raw_barcodes: None,
            status: RowStatus::Pending,
            target_product_id: None,
            confidence_score: None,
            match_suggestion: None,
            processed_at: None,
        }
    }

    /// Build the orchestrator input from the raw fields.
    pub fn to_match_input(&self) -> MatchInput {
        MatchInput {
            title: self.raw_title.clone(),
            sku: self.raw_sku.clone(),
            branch: self.raw_branch.clone(),
            lab: self.raw_lab.clone(),
            regulatory_code: self.raw_regulatory_code.clone(),
            barcodes: self.raw_barcodes.clone(),
        }
    }
}
