//! Runtime views of the selector and timing settings.

use std::time::Duration;

use whiskpilot_config::{SelectorSettings, TimingSettings};

/// DOM contract of the target page.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub prompt_input: String,
    pub submit_button: String,
    pub button: String,
    pub ratio_menu_marker: String,
    pub ratio_menu_ready: String,
}

impl From<&SelectorSettings> for Selectors {
    fn from(settings: &SelectorSettings) -> Self {
        Self {
            prompt_input: settings.prompt_input.clone(),
            submit_button: settings.submit_button.clone(),
            button: settings.button.clone(),
            ratio_menu_marker: settings.ratio_menu_marker.clone(),
            ratio_menu_ready: settings.ratio_menu_ready.clone(),
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self::from(&SelectorSettings::default())
    }
}

/// Fixed waits and windows used while driving the page.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Upper bound for a single locator observation window.
    pub locate_timeout: Duration,
    /// Pause after filling the prompt so the page enables its submit control.
    pub settle: Duration,
    /// Pause after opening the aspect-ratio menu.
    pub menu_open: Duration,
    /// Pause after picking an option and after closing the menu.
    pub menu_option: Duration,
    /// Pause between the progress status and touching the DOM.
    pub status: Duration,
    /// How long to wait for an image after a submission.
    pub staleness: Duration,
    /// Delay between attributing an image and requesting its download.
    pub download_debounce: Duration,
}

impl From<&TimingSettings> for Timings {
    fn from(settings: &TimingSettings) -> Self {
        Self {
            locate_timeout: Duration::from_millis(settings.locate_timeout_ms),
            settle: Duration::from_millis(settings.settle_ms),
            menu_open: Duration::from_millis(settings.menu_open_ms),
            menu_option: Duration::from_millis(settings.menu_option_ms),
            status: Duration::from_millis(settings.status_ms),
            staleness: Duration::from_secs(settings.staleness_seconds),
            download_debounce: Duration::from_millis(settings.download_debounce_ms),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from(&TimingSettings::default())
    }
}
