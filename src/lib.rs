//! rxreconcile - inventory import reconciliation for pharmacy catalogs.
//!
//! Dirty import rows are resolved against the official drug registry and the
//! local product catalog in tiers: registration number, barcode, then a
//! fuzzy tier backed by an external classifier. Anything uncertain is left
//! for human review.

pub mod cli;
pub mod config;
pub mod llm;
pub mod matching;
pub mod models;
pub mod parser;
pub mod rate_limit;
pub mod repository;
pub mod worker;

pub use matching::MatchOrchestrator;
pub use worker::{BatchSummary, ImportWorker, WorkerError};
