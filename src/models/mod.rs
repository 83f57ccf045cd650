//! Data models for the reconciliation pipeline.

mod import_row;
mod match_result;
mod registry;

pub use import_row::{ImportRow, RowStatus};
pub use match_result::{
    ClassifierVerdict, MatchEvidence, MatchInput, MatchResult, MatchTier, RankedCandidate,
    SkipReason,
};
pub use registry::{CatalogProduct, RegulatoryRecord};
