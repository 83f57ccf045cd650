//! Batch processing command.

use console::style;

use super::helpers::{build_classifier, open_database};
use crate::config::{Config, Settings};
use crate::llm::Classifier;
use crate::matching::MatchOrchestrator;
use crate::worker::ImportWorker;

/// Process one batch of pending rows.
pub async fn cmd_process(settings: &Settings, config: &Config, json: bool) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let registry = ctx.registry();
    let queue = ctx.queue();

    let client = build_classifier(&config.llm);
    let classifier = client.as_ref().map(|c| c as &dyn Classifier);

    let orchestrator = MatchOrchestrator::new(registry.as_ref(), classifier);
    let worker = ImportWorker::new(queue.as_ref(), orchestrator, settings.worker_id.clone())
        .with_lease(settings.claim_lease);

    let summary = worker.process_import_batch(settings.batch_size).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match summary.message {
        Some(ref message) => println!("{} {}", style("-").dim(), message),
        None => println!(
            "{} Processed {} row(s) as {}",
            style("✓").green(),
            summary.processed,
            worker.worker_id()
        ),
    }

    Ok(())
}
