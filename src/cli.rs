//! CLI definitions for whiskpilot.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// whiskpilot CLI.
#[derive(Parser)]
#[command(name = "whiskpilot")]
#[command(about = "Submit a list of prompts to Whisk and collect the generated images")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/whiskpilot.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the prompt sequence against an open Whisk tab
    Run {
        /// Read prompts from this file (one per line), replacing configured ones
        #[arg(long)]
        prompts_file: Option<PathBuf>,

        /// Seconds to wait between prompts
        #[arg(long)]
        delay: Option<u64>,

        /// Images expected for each prompt
        #[arg(long)]
        images_per_prompt: Option<u32>,

        /// Pick a random aspect ratio for every prompt
        #[arg(long)]
        randomize: bool,

        /// Chrome remote debugging endpoint
        #[arg(long, env = "WHISKPILOT_ENDPOINT")]
        endpoint: Option<String>,
    },

    /// Validate the configuration file
    CheckConfig,

    /// List browser tabs reachable over the debugging endpoint
    Tabs {
        /// Chrome remote debugging endpoint
        #[arg(long, env = "WHISKPILOT_ENDPOINT")]
        endpoint: Option<String>,
    },
}
