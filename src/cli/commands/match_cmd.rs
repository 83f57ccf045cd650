//! Dry-run matching command.

use super::helpers::{build_classifier, open_database};
use crate::config::{Config, Settings};
use crate::llm::Classifier;
use crate::matching::MatchOrchestrator;
use crate::models::MatchInput;

/// Resolve one ad-hoc row and print the result. Nothing is persisted.
pub async fn cmd_match(
    settings: &Settings,
    config: &Config,
    input: &MatchInput,
) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let registry = ctx.registry();

    let client = build_classifier(&config.llm);
    let classifier = client.as_ref().map(|c| c as &dyn Classifier);

    let result = MatchOrchestrator::new(registry.as_ref(), classifier)
        .resolve(input)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
