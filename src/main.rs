//! whiskpilot - prompt automation for the Whisk image generator
//!
//! Main entry point for the whiskpilot CLI.

use std::path::PathBuf;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod cmd_config;
mod cmd_run;
mod cmd_tabs;

use cli::{Cli, Commands};

/// Get the whiskpilot home directory (~/.whiskpilot).
fn whiskpilot_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".whiskpilot"))
        .unwrap_or_else(|| PathBuf::from(".whiskpilot"))
}

/// Initialize tracing with console and file output.
///
/// Log files are written to ~/.whiskpilot/logs/ with daily rotation.
fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = whiskpilot_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("whiskpilot")
        .filename_suffix("log")
        .max_log_files(14)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keeps the background writer alive until exit.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            prompts_file,
            delay,
            images_per_prompt,
            randomize,
            endpoint,
        } => {
            let overrides = cmd_run::RunOverrides {
                prompts_file,
                delay,
                images_per_prompt,
                randomize,
                endpoint,
            };
            cmd_run::run(&cli.config, overrides).await
        }
        Commands::CheckConfig => cmd_config::check_config(&cli.config),
        Commands::Tabs { endpoint } => cmd_tabs::list_tabs(&cli.config, endpoint).await,
    }
}
