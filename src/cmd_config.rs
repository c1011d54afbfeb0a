//! `check-config` subcommand.

use std::path::Path;

use tracing::info;
use whiskpilot_config::{Config, ConfigError, ConfigLoader, ConfigValidator};

/// Load `path`, falling back to built-in defaults when it does not exist.
pub(crate) fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        info!("{} not found, using built-in defaults", path.display());
    }
    ConfigLoader::load_or_default(path)
}

/// Load and validate the configuration, printing every finding.
pub(crate) fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        println!("{} not found, checking built-in defaults", path.display());
    }
    let config = ConfigLoader::load_or_default(path)?;
    let result = ConfigValidator::validate(&config);

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        return Err(format!("{} configuration error(s)", result.errors.len()).into());
    }

    let prompts = ConfigLoader::resolve_prompts(&config.automation)?;
    println!(
        "Configuration OK: {} prompt(s), {} image(s) per prompt, {}s delay",
        prompts.len(),
        config.automation.images_per_prompt,
        config.automation.delay_seconds
    );
    if config.download.auto_download {
        println!(
            "Images will be saved under {}",
            ConfigLoader::expand_path(&config.download.directory)
        );
    }
    Ok(())
}
