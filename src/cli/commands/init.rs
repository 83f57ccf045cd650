//! Initialize command.

use console::style;

use super::helpers::open_database;
use crate::config::Settings;

/// Create the schema in the configured database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    ctx.init_schema().await?;

    println!(
        "{} Initialized {} database at {}",
        style("✓").green(),
        ctx.backend_name(),
        settings.display_database_url()
    );

    Ok(())
}
