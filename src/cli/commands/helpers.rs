//! Shared helper functions for CLI commands.

use console::style;

use crate::config::Settings;
use crate::llm::{LlmClient, LlmConfig};
use crate::repository::DbContext;

/// Open the configured database.
pub async fn open_database(settings: &Settings) -> anyhow::Result<DbContext> {
    tracing::debug!("Opening database {}", settings.display_database_url());
    let ctx = DbContext::connect(&settings.database_url(), settings.no_tls).await?;
    Ok(ctx)
}

/// Build the classifier client, or explain why the fuzzy tier runs without one.
///
/// Never fails: deterministic tiers stay usable without a classifier. Notices
/// go to stderr so JSON output on stdout stays parseable.
pub fn build_classifier(config: &LlmConfig) -> Option<LlmClient> {
    if !config.enabled {
        eprintln!(
            "{} Classifier disabled; fuzzy matches will go straight to review",
            style("!").yellow()
        );
        return None;
    }

    match LlmClient::new(config.clone()) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!("Classifier unavailable: {}", e);
            eprintln!("{} Classifier unavailable: {}", style("!").yellow(), e);
            None
        }
    }
}
