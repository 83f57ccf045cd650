//! Queue status command.

use console::style;

use super::helpers::open_database;
use crate::config::Settings;

/// Show row counts per status.
pub async fn cmd_status(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let counts = ctx.queue().status_counts().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("\n{}", style("Import Queue").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Database:", settings.display_database_url());
    println!(
        "{:<20} {} ({} leased)",
        "Pending:",
        style(counts.pending).cyan(),
        counts.leased
    );
    println!("{:<20} {}", "Matched:", style(counts.matched).green());
    println!("{:<20} {}", "Needs review:", style(counts.needs_review).yellow());
    println!("{:<20} {}", "Total:", counts.total());

    Ok(())
}
