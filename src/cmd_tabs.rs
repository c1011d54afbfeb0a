//! `tabs` subcommand.

use std::path::Path;

use whiskpilot_cdp::CdpClient;

/// Print every target the debugging endpoint reports. Tabs a run would
/// attach to are marked with `*`.
pub(crate) async fn list_tabs(
    config_path: &Path,
    endpoint: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = crate::cmd_config::load_config(config_path)?;
    let endpoint = endpoint.unwrap_or(config.browser.endpoint);
    let filter = &config.browser.target_url_contains;

    let client = CdpClient::connect(&endpoint).await?;
    let pages = client.list_pages().await?;

    if pages.is_empty() {
        println!("No targets at {}", endpoint);
        return Ok(());
    }

    println!("{:<2}{:<34} {:<16} {}", "", "ID", "TYPE", "URL");
    println!("{}", "-".repeat(80));
    for page in &pages {
        let marker = if page.matches(filter) { "*" } else { "" };
        println!("{:<2}{:<34} {:<16} {}", marker, page.id, page.page_type, page.url);
    }
    Ok(())
}
