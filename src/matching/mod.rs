//! Tiered matching of import rows.
//!
//! Tiers run in a fixed order and the first decision wins:
//! registry code, barcode, then the fuzzy classifier tier.

mod deterministic;
mod fuzzy;
mod orchestrator;
mod rank;
mod verdict;

pub use deterministic::DeterministicMatcher;
pub use fuzzy::FuzzyClassifierAdapter;
pub use orchestrator::MatchOrchestrator;
pub use rank::rank_candidates;
pub use verdict::{parse_verdict, DEFAULT_CONFIDENCE};
