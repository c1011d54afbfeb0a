//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub automation: AutomationSettings,

    #[serde(default)]
    pub download: DownloadSettings,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub selectors: SelectorSettings,

    #[serde(default)]
    pub timing: TimingSettings,
}

// ============================================================================
// Automation
// ============================================================================

/// What to submit and how to pace it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSettings {
    /// Newline-delimited prompt list.
    #[serde(default)]
    pub prompts: String,

    /// Optional file with one prompt per line, appended after `prompts`.
    #[serde(default)]
    pub prompts_file: Option<PathBuf>,

    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,

    #[serde(default = "default_images_per_prompt")]
    pub images_per_prompt: u32,

    #[serde(default)]
    pub randomize: bool,

    /// Candidate aspect-ratio labels drawn from when `randomize` is on.
    #[serde(default = "default_aspect_ratios")]
    pub aspect_ratios: Vec<String>,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            prompts: String::new(),
            prompts_file: None,
            delay_seconds: default_delay_seconds(),
            images_per_prompt: default_images_per_prompt(),
            randomize: false,
            aspect_ratios: default_aspect_ratios(),
        }
    }
}

fn default_delay_seconds() -> u64 {
    20
}

fn default_images_per_prompt() -> u32 {
    2
}

fn default_aspect_ratios() -> Vec<String> {
    ["1:1", "9:16", "16:9", "4:3", "3:4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Split newline-delimited prompt text, dropping blank lines.
pub fn parse_prompts(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Download
// ============================================================================

/// Where detected images are saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default)]
    pub auto_download: bool,

    #[serde(default = "default_download_directory")]
    pub directory: String,

    #[serde(default)]
    pub subfolder: String,

    /// Also write the prompt to a `.txt` next to each image.
    #[serde(default)]
    pub save_prompt_txt: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            auto_download: false,
            directory: default_download_directory(),
            subfolder: String::new(),
            save_prompt_txt: false,
        }
    }
}

fn default_download_directory() -> String {
    dirs::download_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "~/Downloads".to_string())
}

// ============================================================================
// Browser
// ============================================================================

/// Chrome remote-debugging connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Substring identifying the tab to drive.
    #[serde(default = "default_target_url")]
    pub target_url_contains: String,

    #[serde(default = "default_attach_attempts")]
    pub attach_attempts: u32,

    #[serde(default = "default_attach_backoff_ms")]
    pub attach_backoff_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            target_url_contains: default_target_url(),
            attach_attempts: default_attach_attempts(),
            attach_backoff_ms: default_attach_backoff_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9222".to_string()
}

fn default_target_url() -> String {
    "labs.google".to_string()
}

fn default_attach_attempts() -> u32 {
    3
}

fn default_attach_backoff_ms() -> u64 {
    1000
}

// ============================================================================
// Selectors
// ============================================================================

/// Fixed DOM contract of the target page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSettings {
    #[serde(default = "default_prompt_input")]
    pub prompt_input: String,

    #[serde(default = "default_submit_button")]
    pub submit_button: String,

    /// Selector for every clickable button, searched by text.
    #[serde(default = "default_button")]
    pub button: String,

    /// Text contained in the button that opens the aspect-ratio menu.
    #[serde(default = "default_ratio_menu_marker")]
    pub ratio_menu_marker: String,

    /// Selector that appears once the ratio menu has rendered.
    #[serde(default = "default_ratio_menu_ready")]
    pub ratio_menu_ready: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            prompt_input: default_prompt_input(),
            submit_button: default_submit_button(),
            button: default_button(),
            ratio_menu_marker: default_ratio_menu_marker(),
            ratio_menu_ready: default_ratio_menu_ready(),
        }
    }
}

fn default_prompt_input() -> String {
    r#"textarea[placeholder*="Descreva sua ideia"]"#.to_string()
}

fn default_submit_button() -> String {
    r#"button[aria-label="Enviar comando"]"#.to_string()
}

fn default_button() -> String {
    "button".to_string()
}

fn default_ratio_menu_marker() -> String {
    "aspect_ratio".to_string()
}

fn default_ratio_menu_ready() -> String {
    "button span".to_string()
}

// ============================================================================
// Timing
// ============================================================================

/// Fixed waits around the host page's asynchronous UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default = "default_locate_timeout_ms")]
    pub locate_timeout_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_menu_open_ms")]
    pub menu_open_ms: u64,

    #[serde(default = "default_menu_option_ms")]
    pub menu_option_ms: u64,

    #[serde(default = "default_status_ms")]
    pub status_ms: u64,

    #[serde(default = "default_staleness_seconds")]
    pub staleness_seconds: u64,

    #[serde(default = "default_download_debounce_ms")]
    pub download_debounce_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            locate_timeout_ms: default_locate_timeout_ms(),
            settle_ms: default_settle_ms(),
            menu_open_ms: default_menu_open_ms(),
            menu_option_ms: default_menu_option_ms(),
            status_ms: default_status_ms(),
            staleness_seconds: default_staleness_seconds(),
            download_debounce_ms: default_download_debounce_ms(),
        }
    }
}

fn default_locate_timeout_ms() -> u64 {
    10_000
}

fn default_settle_ms() -> u64 {
    500
}

fn default_menu_open_ms() -> u64 {
    500
}

fn default_menu_option_ms() -> u64 {
    250
}

fn default_status_ms() -> u64 {
    500
}

fn default_staleness_seconds() -> u64 {
    30
}

fn default_download_debounce_ms() -> u64 {
    500
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
