//! Classifier health check.

use console::style;

use crate::config::Config;
use crate::llm::{LlmClient, LlmProvider};

/// Report classifier configuration and reachability.
pub async fn cmd_llm_check(config: &Config) -> anyhow::Result<()> {
    let llm = &config.llm;

    println!("\n{}", style("Classifier").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Enabled:", llm.enabled);
    println!("{:<20} {}", "Provider:", llm.provider.as_str());
    println!("{:<20} {}", "Endpoint:", llm.endpoint);
    println!("{:<20} {}", "Model:", llm.model);
    if llm.provider == LlmProvider::OpenAI {
        let key = if llm.api_key.is_some() {
            style("set").green()
        } else {
            style("missing").red()
        };
        println!("{:<20} {}", "API key:", key);
    }

    if !llm.enabled {
        println!("\n{} Classifier is disabled (LLM_ENABLED=false)", style("!").yellow());
        return Ok(());
    }

    let client = LlmClient::new(llm.clone())?;
    match client.list_models().await {
        Ok(models) => {
            println!(
                "\n{} Reachable, {} model(s) available",
                style("✓").green(),
                models.len()
            );
            if !models.iter().any(|m| m == &llm.model) {
                println!(
                    "{} Configured model '{}' was not listed by the provider",
                    style("!").yellow(),
                    llm.model
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("\n{} {}", style("✗").red(), e);
            anyhow::bail!("classifier check failed")
        }
    }
}
